//! Password Safe V3 container codec
//!
//! Stream layout:
//!
//! ```text
//! "PWS3" | salt (32) | iter (u32 LE) | SHA256(P') (32) | wrapped K (32)
//! | wrapped L (32) | IV (16) | TwoFish-CBC ciphertext | "PWS3-EOFPWS3-EOF"
//! | HMAC-SHA256 (32)
//! ```
//!
//! Within the plaintext body every field is a `length (u32 LE) | type (u8)
//! | value | random pad` block sized by `encoded_block_len`, which always
//! pads up to the *next* 16-byte boundary; a block never ends exactly on
//! one. The HMAC covers only the value bytes of each field, in stream
//! order, never lengths, types, or padding. Other implementations of the
//! format share both quirks, so the MAC verifies only if this codec
//! reproduces them exactly.

use byteorder::{ByteOrder, LittleEndian};
use cipher::block_padding::NoPadding;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::io::Write;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::collection::HeaderCollection;
use crate::entry::EntryCollection;
use crate::error::{CryptoError, Error, FormatError, Result};
use crate::field::FieldType;
use crate::keys::{
    stretch_passphrase, unwrap_key, verifier, wrap_key, KeyMaterial, CIPHER_BLOCK, KEY_SIZE,
};

type HmacSha256 = Hmac<Sha256>;
type TwofishCbcEnc = cbc::Encryptor<twofish::Twofish>;
type TwofishCbcDec = cbc::Decryptor<twofish::Twofish>;

const TAG: &[u8; 4] = b"PWS3";
// "PWS3" and "-EOF" as little-endian words; four of them close the body.
const TAG_WORD: u32 = 0x3353_5750;
const EOF_WORD: u32 = 0x464F_452D;

const SALT_SIZE: usize = 32;
const SALT_OFFSET: usize = 4;
const ITER_OFFSET: usize = SALT_OFFSET + SALT_SIZE;
const VERIFIER_OFFSET: usize = ITER_OFFSET + 4;
const WRAPPED_K_OFFSET: usize = VERIFIER_OFFSET + 32;
const WRAPPED_L_OFFSET: usize = WRAPPED_K_OFFSET + KEY_SIZE;
const IV_OFFSET: usize = WRAPPED_L_OFFSET + KEY_SIZE;
const BODY_OFFSET: usize = IV_OFFSET + CIPHER_BLOCK;

/// Tag words plus HMAC after the ciphertext.
const TRAILER_LEN: usize = 16 + 32;

/// Smallest stream that can carry the fixed layout.
const MIN_STREAM_LEN: usize = BODY_OFFSET + TRAILER_LEN;

/// Group terminator type code shared by both field spaces.
const END_OF_ENTRY: u8 = 0xFF;

/// Total encoded size of a field block carrying `value_len` payload bytes.
///
/// The type byte counts as a fifth length byte, and the block is padded up
/// to the next boundary even when the data would fit exactly.
fn encoded_block_len(value_len: usize) -> usize {
    ((value_len + 5) / CIPHER_BLOCK + 1) * CIPHER_BLOCK
}

/// One decoded field: its raw tag and value bytes.
pub(crate) struct RawField {
    pub(crate) type_code: u8,
    value: Zeroizing<Vec<u8>>,
}

impl RawField {
    /// Move the value out, leaving an empty buffer behind.
    pub(crate) fn take_value(&mut self) -> Vec<u8> {
        std::mem::take(&mut *self.value)
    }
}

/// The decoded payload of a container: raw header fields and record groups.
pub(crate) struct ParsedContainer {
    pub(crate) iterations: u32,
    pub(crate) headers: Vec<RawField>,
    pub(crate) entries: Vec<Vec<RawField>>,
}

/// Decrypt and authenticate a container.
///
/// Structural problems inside the decrypted body are deferred until after
/// the HMAC comparison: a corrupted ciphertext byte garbles whole plaintext
/// blocks, so a length field may turn to garbage before the walk finishes.
/// Reporting the MAC mismatch first keeps the failure mode of tampering
/// stable regardless of which byte was hit.
pub(crate) fn parse(data: &[u8], passphrase: &[u8]) -> Result<ParsedContainer> {
    if data.len() < MIN_STREAM_LEN {
        return Err(FormatError::UnrecognizedFormat.into());
    }
    if data[..4] != TAG[..] {
        return Err(FormatError::UnrecognizedFormat.into());
    }

    let trailer = data.len() - TRAILER_LEN;
    let tag_words = [
        LittleEndian::read_u32(&data[trailer..]),
        LittleEndian::read_u32(&data[trailer + 4..]),
        LittleEndian::read_u32(&data[trailer + 8..]),
        LittleEndian::read_u32(&data[trailer + 12..]),
    ];
    if tag_words != [TAG_WORD, EOF_WORD, TAG_WORD, EOF_WORD] {
        return Err(FormatError::UnrecognizedFormat.into());
    }

    let salt = &data[SALT_OFFSET..ITER_OFFSET];
    let iterations = LittleEndian::read_u32(&data[ITER_OFFSET..VERIFIER_OFFSET]);

    let stretched = stretch_passphrase(passphrase, salt, iterations);
    let expected = &data[VERIFIER_OFFSET..WRAPPED_K_OFFSET];
    if !bool::from(verifier(&stretched).ct_eq(expected)) {
        return Err(CryptoError::PasswordMismatch.into());
    }

    let key_k = unwrap_key(&stretched, &data[WRAPPED_K_OFFSET..WRAPPED_L_OFFSET])?;
    let key_l = unwrap_key(&stretched, &data[WRAPPED_L_OFFSET..IV_OFFSET])?;
    let iv = &data[IV_OFFSET..BODY_OFFSET];

    let body = &data[BODY_OFFSET..trailer];
    if body.len() % CIPHER_BLOCK != 0 {
        return Err(FormatError::UnrecognizedFormat.into());
    }

    let mut plain = Zeroizing::new(body.to_vec());
    TwofishCbcDec::new_from_slices(key_k.as_bytes(), iv)
        .map_err(|_| FormatError::UnrecognizedFormat)?
        .decrypt_padded_mut::<NoPadding>(plain.as_mut_slice())
        .map_err(|_| FormatError::UnrecognizedFormat)?;

    let mut mac = HmacSha256::new_from_slice(key_l.as_bytes())
        .map_err(|_| Error::InvalidArgument("HMAC key rejected"))?;

    let mut headers = Vec::new();
    let mut entries = Vec::new();
    let mut current: Vec<RawField> = Vec::new();
    let mut in_headers = true;
    let mut structure_error = None;
    let mut pos = 0;

    while pos < plain.len() {
        if plain.len() - pos < CIPHER_BLOCK {
            structure_error = Some(FormatError::UnrecognizedFormat);
            break;
        }
        let value_len = LittleEndian::read_u32(&plain[pos..pos + 4]) as usize;
        let type_code = plain[pos + 4];
        if value_len > plain.len() - pos {
            structure_error = Some(FormatError::UnrecognizedFormat);
            break;
        }
        let block_len = encoded_block_len(value_len);
        if block_len > plain.len() - pos {
            structure_error = Some(FormatError::UnrecognizedFormat);
            break;
        }

        let value = &plain[pos + 5..pos + 5 + value_len];
        mac.update(value);
        pos += block_len;

        if type_code == END_OF_ENTRY {
            if in_headers {
                in_headers = false;
            } else {
                entries.push(std::mem::take(&mut current));
            }
            continue;
        }

        let field = RawField {
            type_code,
            value: Zeroizing::new(value.to_vec()),
        };
        if in_headers {
            headers.push(field);
        } else {
            current.push(field);
        }
    }
    if structure_error.is_none() && !current.is_empty() {
        // A final record group without its terminator is still usable.
        entries.push(current);
    }

    mac.verify_slice(&data[data.len() - 32..])
        .map_err(|_| CryptoError::AuthenticationMismatch)?;

    if let Some(error) = structure_error {
        return Err(error.into());
    }

    match headers.first() {
        Some(first) if first.type_code == 0x00 && first.value.len() == 2 => {
            if LittleEndian::read_u16(&first.value) < 0x0300 {
                return Err(FormatError::UnsupportedVersion.into());
            }
        }
        _ => return Err(FormatError::UnsupportedVersion.into()),
    }

    Ok(ParsedContainer {
        iterations,
        headers,
        entries,
    })
}

/// Encrypt and emit a container with fresh salt, keys, IV, and padding.
pub(crate) fn write<W: Write>(
    writer: &mut W,
    passphrase: &[u8],
    iterations: u32,
    headers: &HeaderCollection,
    entries: &EntryCollection,
) -> Result<()> {
    let mut rng = rand::thread_rng();

    let mut salt = [0u8; SALT_SIZE];
    rng.fill_bytes(&mut salt);
    let stretched = stretch_passphrase(passphrase, &salt, iterations);

    let key_k = KeyMaterial::random();
    let key_l = KeyMaterial::random();
    let mut iv = [0u8; CIPHER_BLOCK];
    rng.fill_bytes(&mut iv);

    let mut mac = HmacSha256::new_from_slice(key_l.as_bytes())
        .map_err(|_| Error::InvalidArgument("HMAC key rejected"))?;

    let mut body = Zeroizing::new(Vec::new());
    for field in headers.iter() {
        emit_field(&mut body, &mut mac, field.field_type().code(), field.bytes());
    }
    emit_field(&mut body, &mut mac, END_OF_ENTRY, &[]);
    for entry in entries.iter() {
        for record in entry.records().iter() {
            emit_field(&mut body, &mut mac, record.field_type().code(), record.bytes());
        }
        emit_field(&mut body, &mut mac, END_OF_ENTRY, &[]);
    }

    let body_len = body.len();
    TwofishCbcEnc::new_from_slices(key_k.as_bytes(), &iv)
        .map_err(|_| Error::InvalidArgument("cipher key rejected"))?
        .encrypt_padded_mut::<NoPadding>(body.as_mut_slice(), body_len)
        .map_err(|_| Error::InvalidArgument("body is not block aligned"))?;

    let mut iter_bytes = [0u8; 4];
    LittleEndian::write_u32(&mut iter_bytes, iterations);

    let mut trailer = [0u8; 16];
    LittleEndian::write_u32(&mut trailer[0..4], TAG_WORD);
    LittleEndian::write_u32(&mut trailer[4..8], EOF_WORD);
    LittleEndian::write_u32(&mut trailer[8..12], TAG_WORD);
    LittleEndian::write_u32(&mut trailer[12..16], EOF_WORD);

    writer.write_all(TAG)?;
    writer.write_all(&salt)?;
    writer.write_all(&iter_bytes)?;
    writer.write_all(&verifier(&stretched))?;
    writer.write_all(&wrap_key(&stretched, &key_k)?)?;
    writer.write_all(&wrap_key(&stretched, &key_l)?)?;
    writer.write_all(&iv)?;
    writer.write_all(&body)?;
    writer.write_all(&trailer)?;
    writer.write_all(mac.finalize().into_bytes().as_slice())?;
    Ok(())
}

/// Append one `length | type | value | pad` block and feed the value bytes
/// to the body MAC.
fn emit_field(body: &mut Vec<u8>, mac: &mut HmacSha256, type_code: u8, value: &[u8]) {
    let block_len = encoded_block_len(value.len());

    let mut header = [0u8; 5];
    LittleEndian::write_u32(&mut header[..4], value.len() as u32);
    header[4] = type_code;

    let mut padding = vec![0u8; block_len - 5 - value.len()];
    rand::thread_rng().fill_bytes(&mut padding);

    body.extend_from_slice(&header);
    body.extend_from_slice(value);
    body.extend_from_slice(&padding);
    mac.update(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_length_always_pads_past_the_boundary() {
        assert_eq!(encoded_block_len(0), 16);
        assert_eq!(encoded_block_len(1), 16);
        assert_eq!(encoded_block_len(10), 16);
        // 11 value bytes plus the 5-byte header fill a block exactly, so
        // the block spills into the next one.
        assert_eq!(encoded_block_len(11), 32);
        assert_eq!(encoded_block_len(12), 32);
        assert_eq!(encoded_block_len(26), 32);
        assert_eq!(encoded_block_len(27), 48);
    }

    #[test]
    fn emitted_block_is_well_formed() {
        let mut mac = HmacSha256::new_from_slice(&[0u8; 32]).unwrap();
        let mut body = Vec::new();
        emit_field(&mut body, &mut mac, 0x03, b"gmail");

        assert_eq!(body.len(), 16);
        assert_eq!(LittleEndian::read_u32(&body[..4]), 5);
        assert_eq!(body[4], 0x03);
        assert_eq!(&body[5..10], b"gmail");
    }

    #[test]
    fn layout_offsets_are_contiguous() {
        assert_eq!(ITER_OFFSET, 36);
        assert_eq!(VERIFIER_OFFSET, 40);
        assert_eq!(WRAPPED_K_OFFSET, 72);
        assert_eq!(WRAPPED_L_OFFSET, 104);
        assert_eq!(IV_OFFSET, 136);
        assert_eq!(BODY_OFFSET, 152);
        assert_eq!(MIN_STREAM_LEN, 200);
    }
}
