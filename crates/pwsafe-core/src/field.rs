//! Typed fields over raw byte payloads
//!
//! A field stores the canonical on-disk bytes for one tagged value. Typed
//! views decode on read and re-encode on write; the raw bytes are what the
//! container codec serializes, so a payload that is never touched through a
//! typed view round-trips bit-exact.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::document::DocHandle;
use crate::error::{Error, FormatError, Result};

/// Common surface of the header and record type-code spaces.
pub trait FieldType: Copy + Eq + std::fmt::Debug {
    /// Decode an 8-bit tag. Unrecognized codes are preserved, not rejected.
    fn from_code(code: u8) -> Self;

    /// The 8-bit tag written to the container.
    fn code(self) -> u8;

    /// Whether more than one field of this type may appear in a collection.
    fn is_repeatable(self) -> bool;

    /// Whether the type is the 0xFF group terminator.
    fn is_end(self) -> bool {
        self.code() == 0xFF
    }

    /// Whether a collection must always hold exactly one field of this type.
    fn is_required(self) -> bool {
        false
    }
}

/// Header field type codes of the Password Safe V3 format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderType {
    Version,
    Uuid,
    NonDefaultPreferences,
    TreeDisplayStatus,
    TimestampOfLastSave,
    WhoPerformedLastSave,
    WhatPerformedLastSave,
    LastSavedByUser,
    LastSavedOnHost,
    DatabaseName,
    DatabaseDescription,
    DatabaseFilters,
    RecentlyUsedEntries,
    NamedPasswordPolicies,
    EmptyGroups,
    Yubico,
    EndOfEntry,
    /// A code this library does not know; preserved verbatim.
    Unknown(u8),
}

impl FieldType for HeaderType {
    fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::Version,
            0x01 => Self::Uuid,
            0x02 => Self::NonDefaultPreferences,
            0x03 => Self::TreeDisplayStatus,
            0x04 => Self::TimestampOfLastSave,
            0x05 => Self::WhoPerformedLastSave,
            0x06 => Self::WhatPerformedLastSave,
            0x07 => Self::LastSavedByUser,
            0x08 => Self::LastSavedOnHost,
            0x09 => Self::DatabaseName,
            0x0A => Self::DatabaseDescription,
            0x0B => Self::DatabaseFilters,
            0x0F => Self::RecentlyUsedEntries,
            0x10 => Self::NamedPasswordPolicies,
            0x11 => Self::EmptyGroups,
            0x12 => Self::Yubico,
            0xFF => Self::EndOfEntry,
            other => Self::Unknown(other),
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Version => 0x00,
            Self::Uuid => 0x01,
            Self::NonDefaultPreferences => 0x02,
            Self::TreeDisplayStatus => 0x03,
            Self::TimestampOfLastSave => 0x04,
            Self::WhoPerformedLastSave => 0x05,
            Self::WhatPerformedLastSave => 0x06,
            Self::LastSavedByUser => 0x07,
            Self::LastSavedOnHost => 0x08,
            Self::DatabaseName => 0x09,
            Self::DatabaseDescription => 0x0A,
            Self::DatabaseFilters => 0x0B,
            Self::RecentlyUsedEntries => 0x0F,
            Self::NamedPasswordPolicies => 0x10,
            Self::EmptyGroups => 0x11,
            Self::Yubico => 0x12,
            Self::EndOfEntry => 0xFF,
            Self::Unknown(code) => code,
        }
    }

    fn is_repeatable(self) -> bool {
        matches!(self, Self::EmptyGroups | Self::Unknown(_))
    }

    fn is_required(self) -> bool {
        matches!(self, Self::Version)
    }
}

/// Record field type codes of the Password Safe V3 format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Uuid,
    Group,
    Title,
    UserName,
    Notes,
    Password,
    CreationTime,
    PasswordModificationTime,
    LastAccessTime,
    PasswordExpiryTime,
    LastModificationTime,
    Url,
    Autotype,
    PasswordHistory,
    PasswordPolicy,
    PasswordExpiryInterval,
    RunCommand,
    DoubleClickAction,
    EmailAddress,
    ProtectedEntry,
    OwnSymbolsForPassword,
    ShiftDoubleClickAction,
    PasswordPolicyName,
    EntryKeyboardShortcut,
    TwoFactorKey,
    CreditCardNumber,
    CreditCardExpiration,
    CreditCardVerificationValue,
    CreditCardPin,
    EndOfEntry,
    /// A code this library does not know; preserved verbatim.
    Unknown(u8),
}

impl FieldType for RecordType {
    fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::Uuid,
            0x02 => Self::Group,
            0x03 => Self::Title,
            0x04 => Self::UserName,
            0x05 => Self::Notes,
            0x06 => Self::Password,
            0x07 => Self::CreationTime,
            0x08 => Self::PasswordModificationTime,
            0x09 => Self::LastAccessTime,
            0x0A => Self::PasswordExpiryTime,
            0x0C => Self::LastModificationTime,
            0x0D => Self::Url,
            0x0E => Self::Autotype,
            0x0F => Self::PasswordHistory,
            0x10 => Self::PasswordPolicy,
            0x11 => Self::PasswordExpiryInterval,
            0x12 => Self::RunCommand,
            0x13 => Self::DoubleClickAction,
            0x14 => Self::EmailAddress,
            0x15 => Self::ProtectedEntry,
            0x16 => Self::OwnSymbolsForPassword,
            0x17 => Self::ShiftDoubleClickAction,
            0x18 => Self::PasswordPolicyName,
            0x19 => Self::EntryKeyboardShortcut,
            0x1B => Self::TwoFactorKey,
            0x1C => Self::CreditCardNumber,
            0x1D => Self::CreditCardExpiration,
            0x1E => Self::CreditCardVerificationValue,
            0x1F => Self::CreditCardPin,
            0xFF => Self::EndOfEntry,
            other => Self::Unknown(other),
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::Uuid => 0x01,
            Self::Group => 0x02,
            Self::Title => 0x03,
            Self::UserName => 0x04,
            Self::Notes => 0x05,
            Self::Password => 0x06,
            Self::CreationTime => 0x07,
            Self::PasswordModificationTime => 0x08,
            Self::LastAccessTime => 0x09,
            Self::PasswordExpiryTime => 0x0A,
            Self::LastModificationTime => 0x0C,
            Self::Url => 0x0D,
            Self::Autotype => 0x0E,
            Self::PasswordHistory => 0x0F,
            Self::PasswordPolicy => 0x10,
            Self::PasswordExpiryInterval => 0x11,
            Self::RunCommand => 0x12,
            Self::DoubleClickAction => 0x13,
            Self::EmailAddress => 0x14,
            Self::ProtectedEntry => 0x15,
            Self::OwnSymbolsForPassword => 0x16,
            Self::ShiftDoubleClickAction => 0x17,
            Self::PasswordPolicyName => 0x18,
            Self::EntryKeyboardShortcut => 0x19,
            Self::TwoFactorKey => 0x1B,
            Self::CreditCardNumber => 0x1C,
            Self::CreditCardExpiration => 0x1D,
            Self::CreditCardVerificationValue => 0x1E,
            Self::CreditCardPin => 0x1F,
            Self::EndOfEntry => 0xFF,
            Self::Unknown(code) => code,
        }
    }

    fn is_repeatable(self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

/// One tagged value of a header or record group.
pub struct Field<K: FieldType> {
    field_type: K,
    raw: Vec<u8>,
    state: Option<DocHandle>,
}

/// A header field.
pub type Header = Field<HeaderType>;

/// An entry record field.
pub type Record = Field<RecordType>;

impl<K: FieldType> Field<K> {
    /// Create a field with an empty payload.
    pub fn new(field_type: K) -> Self {
        Self::with_raw(field_type, Vec::new())
    }

    /// Create a field over canonical payload bytes.
    pub fn with_raw(field_type: K, raw: Vec<u8>) -> Self {
        Self {
            field_type,
            raw,
            state: None,
        }
    }

    pub fn field_type(&self) -> K {
        self.field_type
    }

    pub(crate) fn attach(&mut self, state: Option<DocHandle>) {
        self.state = state;
    }

    /// Read-only and change-tracking gate shared by every typed write.
    fn begin_write(&self) -> Result<()> {
        if let Some(state) = &self.state {
            if state.is_read_only() {
                return Err(Error::ReadOnly);
            }
            state.mark_changed();
        }
        Ok(())
    }

    fn replace_raw(&mut self, raw: Vec<u8>) -> Result<()> {
        self.begin_write()?;
        self.raw.zeroize();
        self.raw = raw;
        Ok(())
    }

    /// The canonical payload bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn set_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.replace_raw(value.to_vec())
    }

    /// UTF-8 view. Invalid sequences read as replacement characters.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }

    pub fn set_text(&mut self, value: &str) -> Result<()> {
        self.replace_raw(value.as_bytes().to_vec())
    }

    /// Little-endian u32 Unix-seconds view, UTC. A stored zero reads as the
    /// epoch minimum.
    pub fn time(&self) -> Result<DateTime<Utc>> {
        if self.raw.len() != 4 {
            return Err(FormatError::BadFieldWidth.into());
        }
        let seconds = LittleEndian::read_u32(&self.raw);
        Ok(Utc
            .timestamp_opt(i64::from(seconds), 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }

    pub fn set_time(&mut self, value: DateTime<Utc>) -> Result<()> {
        let seconds = value.timestamp().clamp(0, i64::from(u32::MAX)) as u32;
        let mut raw = vec![0u8; 4];
        LittleEndian::write_u32(&mut raw, seconds);
        self.replace_raw(raw)
    }

    /// 16 raw bytes, stored without any endianness shuffling.
    pub fn uuid(&self) -> Result<Uuid> {
        let bytes: [u8; 16] = self
            .raw
            .as_slice()
            .try_into()
            .map_err(|_| FormatError::BadFieldWidth)?;
        Ok(Uuid::from_bytes(bytes))
    }

    pub fn set_uuid(&mut self, value: Uuid) -> Result<()> {
        self.replace_raw(value.as_bytes().to_vec())
    }

    /// Little-endian u16 view, used for the format version header.
    pub fn version(&self) -> Result<u16> {
        if self.raw.len() != 2 {
            return Err(FormatError::BadFieldWidth.into());
        }
        Ok(LittleEndian::read_u16(&self.raw))
    }

    pub fn set_version(&mut self, value: u16) -> Result<()> {
        let mut raw = vec![0u8; 2];
        LittleEndian::write_u16(&mut raw, value);
        self.replace_raw(raw)
    }

    /// Little-endian u32 view.
    pub fn uint32(&self) -> Result<u32> {
        if self.raw.len() != 4 {
            return Err(FormatError::BadFieldWidth.into());
        }
        Ok(LittleEndian::read_u32(&self.raw))
    }

    pub fn set_uint32(&mut self, value: u32) -> Result<()> {
        let mut raw = vec![0u8; 4];
        LittleEndian::write_u32(&mut raw, value);
        self.replace_raw(raw)
    }
}

impl<K: FieldType> Drop for Field<K> {
    fn drop(&mut self) {
        // Payloads may hold passwords.
        self.raw.zeroize();
    }
}

// A clone is detached: it does not inherit the owning document.
impl<K: FieldType> Clone for Field<K> {
    fn clone(&self) -> Self {
        Self {
            field_type: self.field_type,
            raw: self.raw.clone(),
            state: None,
        }
    }
}

impl<K: FieldType> std::fmt::Debug for Field<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("field_type", &self.field_type)
            .field("len", &self.raw.len())
            .finish()
    }
}
