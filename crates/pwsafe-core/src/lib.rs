//! pwsafe-core - Password Safe V3 database library
//!
//! This crate reads, mutates, and writes Password Safe V3 (`.psafe3`)
//! files: TwoFish-encrypted, HMAC-authenticated containers of tag-delimited
//! password records. It provides the typed field model over the raw
//! payloads, the document/entry object graph with change tracking, and the
//! autotype keystroke tokenizer.
//!
//! ```no_run
//! use pwsafe_core::{Document, Entry};
//!
//! let mut doc = Document::new("hunter2");
//! let mut entry = Entry::with_title("gmail");
//! entry.set_user_name("a@b").unwrap();
//! entry.set_password("p!").unwrap();
//! doc.entries_mut().add(entry).unwrap();
//!
//! let mut file = std::fs::File::create("vault.psafe3").unwrap();
//! doc.save(&mut file).unwrap();
//! ```

mod autotype;
mod collection;
mod document;
mod entry;
mod error;
mod field;
mod keys;
mod pws3;
mod secret;

pub use autotype::{tokenize, tokenize_entry, AutotypeToken};
pub use collection::{FieldCollection, HeaderCollection, RecordCollection};
pub use document::{Document, DEFAULT_VERSION};
pub use entry::{Entry, EntryCollection};
pub use error::{CryptoError, Error, FormatError, Result};
pub use field::{Field, FieldType, Header, HeaderType, Record, RecordType};
pub use keys::MIN_ITERATIONS;

// Re-export types that appear in the public API
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
