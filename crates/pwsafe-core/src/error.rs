//! Error types for pwsafe-core

use thiserror::Error;

/// Result type alias for pwsafe-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while working with a Password Safe document
#[derive(Error, Debug)]
pub enum Error {
    /// A required argument was missing or invalid
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Mutation was attempted against a read-only document
    #[error("document is read-only")]
    ReadOnly,

    /// A remove-only accessor was given a value other than `None`
    #[error("only None may be assigned through this accessor")]
    OnlyNoneSupported,

    /// The byte stream does not follow the psafe3 layout
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A cryptographic check failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// IO error from the underlying reader or writer
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Structural problems with the container or a field payload
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Missing magic tags, impossible lengths, or a malformed field block
    #[error("not a recognizable Password Safe V3 stream")]
    UnrecognizedFormat,

    /// The stream predates the V3 format or its first header is not a version
    #[error("unsupported file format version")]
    UnsupportedVersion,

    /// A typed read found a payload of the wrong width
    #[error("field payload has the wrong width for the requested view")]
    BadFieldWidth,
}

/// Failed cryptographic verification
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// The passphrase hash does not match the stored verifier
    #[error("passphrase does not match")]
    PasswordMismatch,

    /// The body HMAC does not match; the file is corrupted or tampered with
    #[error("authentication mismatch: file corrupted or tampered with")]
    AuthenticationMismatch,
}
