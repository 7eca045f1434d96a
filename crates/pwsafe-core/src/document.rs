//! Document: the top-level aggregate of headers and entries
//!
//! A document owns its header and entry collections. Children signal
//! mutations upward through a shared state handle holding only flags, so
//! there is no reference cycle between parents and children.

use std::cell::Cell;
use std::io::{Read, Write};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collection::HeaderCollection;
use crate::entry::{Entry, EntryCollection};
use crate::error::{Error, Result};
use crate::field::{Field, FieldType, HeaderType, RecordType};
use crate::keys::MIN_ITERATIONS;
use crate::pws3;
use crate::secret::PassphraseGuard;

/// File format version written by new documents.
pub const DEFAULT_VERSION: u16 = 0x030D;

/// Flags shared between a document and its collections.
#[derive(Debug)]
pub(crate) struct DocState {
    read_only: Cell<bool>,
    has_changed: Cell<bool>,
    track_access: Cell<bool>,
    track_modify: Cell<bool>,
}

pub(crate) type DocHandle = Rc<DocState>;

impl DocState {
    fn new() -> DocHandle {
        Rc::new(Self {
            read_only: Cell::new(false),
            has_changed: Cell::new(false),
            track_access: Cell::new(true),
            track_modify: Cell::new(true),
        })
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only.get()
    }

    pub(crate) fn is_track_access(&self) -> bool {
        self.track_access.get()
    }

    pub(crate) fn is_track_modify(&self) -> bool {
        self.track_modify.get()
    }

    pub(crate) fn mark_changed(&self) {
        self.has_changed.set(true);
    }
}

/// A Password Safe V3 document.
pub struct Document {
    state: DocHandle,
    headers: HeaderCollection,
    entries: EntryCollection,
    passphrase: Option<PassphraseGuard>,
    iterations: u32,
}

impl Document {
    /// Create an empty, ready-to-save document.
    ///
    /// Headers are seeded with the format version and a fresh document UUID.
    pub fn new(passphrase: &str) -> Self {
        Self::new_with_bytes(passphrase.as_bytes())
    }

    /// Create a document from raw passphrase bytes.
    pub fn new_with_bytes(passphrase: &[u8]) -> Self {
        let state = DocState::new();

        let mut headers = HeaderCollection::new(Some(state.clone()));
        headers.push_unchecked(Field::with_raw(
            HeaderType::Version,
            DEFAULT_VERSION.to_le_bytes().to_vec(),
        ));
        headers.push_unchecked(Field::with_raw(
            HeaderType::Uuid,
            Uuid::new_v4().as_bytes().to_vec(),
        ));

        let entries = EntryCollection::new(state.clone());

        Self {
            state,
            headers,
            entries,
            passphrase: Some(PassphraseGuard::new(passphrase)),
            iterations: MIN_ITERATIONS,
        }
    }

    /// Read and decrypt a document from a byte stream.
    ///
    /// The passphrase is retained, obfuscated, for subsequent saves.
    pub fn load<R: Read>(reader: &mut R, passphrase: &str) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data, passphrase)
    }

    /// Decrypt a document from an in-memory buffer.
    pub fn from_bytes(data: &[u8], passphrase: &str) -> Result<Self> {
        let mut parsed = pws3::parse(data, passphrase.as_bytes())?;

        let state = DocState::new();

        let mut headers = HeaderCollection::new(Some(state.clone()));
        for field in &mut parsed.headers {
            let header_type = HeaderType::from_code(field.type_code);
            if let HeaderType::Unknown(code) = header_type {
                warn!(code, "unrecognized header field type");
            }
            headers.push_unchecked(Field::with_raw(header_type, field.take_value()));
        }

        let mut entries = EntryCollection::new(state.clone());
        for group in &mut parsed.entries {
            let records = group
                .drain(..)
                .map(|mut field| {
                    let record_type = RecordType::from_code(field.type_code);
                    if let RecordType::Unknown(code) = record_type {
                        warn!(code, "unrecognized record field type");
                    }
                    Field::with_raw(record_type, field.take_value())
                })
                .collect();
            entries.push_unchecked(Entry::from_records(records));
        }

        debug!(
            headers = headers.len(),
            entries = entries.len(),
            iterations = parsed.iterations,
            "loaded document"
        );

        Ok(Self {
            state,
            headers,
            entries,
            passphrase: Some(PassphraseGuard::new(passphrase.as_bytes())),
            // Preserved verbatim; clamping happens when saving.
            iterations: parsed.iterations,
        })
    }

    /// Encrypt and write the document, reusing the captured passphrase.
    ///
    /// The change flag clears only after the writer has accepted every byte.
    pub fn save<W: Write>(&mut self, writer: &mut W) -> Result<()> {
        let passphrase = self
            .passphrase
            .as_ref()
            .ok_or(Error::InvalidArgument("no passphrase is set"))?
            .reveal();

        if !self.read_only() && self.track_modify() {
            self.stamp_last_save()?;
        }

        let iterations = self.iterations.max(MIN_ITERATIONS);
        pws3::write(writer, &passphrase, iterations, &self.headers, &self.entries)?;
        self.state.has_changed.set(false);

        debug!(entries = self.entries.len(), iterations, "saved document");
        Ok(())
    }

    /// Save under a new passphrase, which also becomes the stored one.
    pub fn save_with_passphrase<W: Write>(
        &mut self,
        writer: &mut W,
        passphrase: &str,
    ) -> Result<()> {
        self.passphrase = Some(PassphraseGuard::new(passphrase.as_bytes()));
        self.save(writer)
    }

    /// Replace the stored passphrase without saving.
    pub fn change_passphrase(&mut self, passphrase: &str) -> Result<()> {
        if self.read_only() {
            return Err(Error::ReadOnly);
        }
        self.passphrase = Some(PassphraseGuard::new(passphrase.as_bytes()));
        self.state.mark_changed();
        Ok(())
    }

    /// Zeroize and drop the stored passphrase. Saving afterwards requires
    /// supplying a passphrase again.
    pub fn forget_passphrase(&mut self) {
        self.passphrase = None;
    }

    fn stamp_last_save(&mut self) -> Result<()> {
        self.headers
            .set_time(HeaderType::TimestampOfLastSave, Utc::now())?;
        self.headers.set_text(
            HeaderType::WhatPerformedLastSave,
            &format!(
                "{} V{}.{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION_MAJOR"),
                env!("CARGO_PKG_VERSION_MINOR")
            ),
        )?;
        self.headers
            .set_text(HeaderType::LastSavedByUser, &env_or("USER", "USERNAME"))?;
        self.headers
            .set_text(HeaderType::LastSavedOnHost, &env_or("HOSTNAME", "COMPUTERNAME"))?;
        Ok(())
    }

    pub fn headers(&self) -> &HeaderCollection {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderCollection {
        &mut self.headers
    }

    pub fn entries(&self) -> &EntryCollection {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut EntryCollection {
        &mut self.entries
    }

    pub fn read_only(&self) -> bool {
        self.state.is_read_only()
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.state.read_only.set(read_only);
    }

    /// Whether entry access is stamped into `LastAccessTime`.
    pub fn track_access(&self) -> bool {
        self.state.is_track_access()
    }

    pub fn set_track_access(&mut self, track: bool) {
        self.state.track_access.set(track);
    }

    /// Whether mutations stamp modification times and saves stamp the
    /// last-save headers.
    pub fn track_modify(&self) -> bool {
        self.state.is_track_modify()
    }

    pub fn set_track_modify(&mut self, track: bool) {
        self.state.track_modify.set(track);
    }

    pub fn has_changed(&self) -> bool {
        self.state.has_changed.get()
    }

    /// The key stretch iteration count. Values below the format minimum are
    /// kept here but clamped to 2048 when saving.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn set_iterations(&mut self, iterations: u32) -> Result<()> {
        if self.read_only() {
            return Err(Error::ReadOnly);
        }
        self.iterations = iterations;
        self.state.mark_changed();
        Ok(())
    }

    pub fn version(&self) -> u16 {
        self.headers
            .get(HeaderType::Version)
            .and_then(|f| f.version().ok())
            .unwrap_or(DEFAULT_VERSION)
    }

    pub fn uuid(&self) -> Uuid {
        self.headers
            .uuid(HeaderType::Uuid)
            .unwrap_or_else(Uuid::nil)
    }

    pub fn name(&self) -> String {
        self.headers
            .text(HeaderType::DatabaseName)
            .unwrap_or_default()
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.headers.set_text(HeaderType::DatabaseName, name)
    }

    pub fn description(&self) -> String {
        self.headers
            .text(HeaderType::DatabaseDescription)
            .unwrap_or_default()
    }

    pub fn set_description(&mut self, description: &str) -> Result<()> {
        self.headers
            .set_text(HeaderType::DatabaseDescription, description)
    }

    pub fn last_save_time(&self) -> DateTime<Utc> {
        self.headers
            .time(HeaderType::TimestampOfLastSave)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn last_save_application(&self) -> String {
        self.headers
            .text(HeaderType::WhatPerformedLastSave)
            .unwrap_or_default()
    }

    pub fn last_save_user(&self) -> String {
        self.headers
            .text(HeaderType::LastSavedByUser)
            .unwrap_or_default()
    }

    pub fn last_save_host(&self) -> String {
        self.headers
            .text(HeaderType::LastSavedOnHost)
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("uuid", &self.uuid())
            .field("entries", &self.entries.len())
            .field("read_only", &self.read_only())
            .field("has_changed", &self.has_changed())
            .finish()
    }
}

fn env_or(primary: &str, fallback: &str) -> String {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_is_seeded() {
        let doc = Document::new("hunter2");
        assert_eq!(doc.version(), 0x030D);
        assert_ne!(doc.uuid(), Uuid::nil());
        assert!(doc.entries().is_empty());
        assert!(!doc.has_changed());
        assert_eq!(doc.iterations(), MIN_ITERATIONS);
        assert!(doc.track_access());
        assert!(doc.track_modify());
    }

    #[test]
    fn header_writes_mark_the_document_changed() {
        let mut doc = Document::new("pw");
        doc.set_name("personal").unwrap();
        assert!(doc.has_changed());
        assert_eq!(doc.name(), "personal");
    }

    #[test]
    fn entry_mutations_mark_the_document_changed() {
        let mut doc = Document::new("pw");
        doc.entries_mut().add(Entry::with_title("mail")).unwrap();
        assert!(doc.has_changed());

        let entry = doc.entries_mut().entry_mut("mail").unwrap();
        entry.set_password("p!").unwrap();
        assert_eq!(doc.entries().entry("mail").unwrap().password(), "p!");
    }

    #[test]
    fn read_only_blocks_mutation() {
        let mut doc = Document::new("pw");
        doc.set_read_only(true);

        assert!(matches!(
            doc.entries_mut().add(Entry::new()),
            Err(Error::ReadOnly)
        ));
        assert!(matches!(doc.set_name("x"), Err(Error::ReadOnly)));
        assert!(matches!(doc.set_iterations(4096), Err(Error::ReadOnly)));
        assert!(matches!(doc.change_passphrase("new"), Err(Error::ReadOnly)));

        doc.set_read_only(false);
        assert!(doc.set_name("x").is_ok());
    }

    #[test]
    fn attached_writes_stamp_modification_times() {
        let mut doc = Document::new("pw");
        doc.entries_mut().add(Entry::with_title("svc")).unwrap();

        let entry = doc.entries_mut().entry_mut("svc").unwrap();
        entry.set_password("p").unwrap();
        assert!(entry
            .records()
            .contains(RecordType::PasswordModificationTime));
        assert!(entry.records().contains(RecordType::LastModificationTime));
    }

    #[test]
    fn track_modify_off_skips_stamping() {
        let mut doc = Document::new("pw");
        doc.set_track_modify(false);
        doc.entries_mut().add(Entry::with_title("svc")).unwrap();

        let entry = doc.entries_mut().entry_mut("svc").unwrap();
        entry.set_password("p").unwrap();
        assert!(!entry.records().contains(RecordType::LastModificationTime));
    }

    #[test]
    fn touch_respects_track_access() {
        let mut doc = Document::new("pw");
        doc.entries_mut().add(Entry::with_title("svc")).unwrap();

        doc.set_track_access(false);
        let entry = doc.entries_mut().entry_mut("svc").unwrap();
        entry.touch().unwrap();
        assert!(!entry.records().contains(RecordType::LastAccessTime));

        doc.set_track_access(true);
        let entry = doc.entries_mut().entry_mut("svc").unwrap();
        entry.touch().unwrap();
        assert!(entry.records().contains(RecordType::LastAccessTime));
    }

    #[test]
    fn entry_or_create_appends_once() {
        let mut doc = Document::new("pw");
        doc.entries_mut().entry_or_create("bank").unwrap();
        doc.entries_mut().entry_or_create("Bank").unwrap();
        assert_eq!(doc.entries().len(), 1);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut doc = Document::new("pw");
        let mut entry = Entry::with_title("GitHub");
        entry.set_group("Work").unwrap();
        doc.entries_mut().add(entry).unwrap();

        assert!(doc.entries().contains("github"));
        assert!(doc.entries().contains_in_group("work", "GITHUB"));
        assert!(!doc.entries().contains_in_group("home", "github"));
    }

    #[test]
    fn set_entry_accepts_only_none() {
        let mut doc = Document::new("pw");
        doc.entries_mut().add(Entry::with_title("a")).unwrap();

        assert!(matches!(
            doc.entries_mut().set_entry("a", Some(Entry::new())),
            Err(Error::OnlyNoneSupported)
        ));
        doc.entries_mut().set_entry("a", None).unwrap();
        assert!(doc.entries().is_empty());
    }

    #[test]
    fn remove_record_does_not_create_the_entry() {
        let mut doc = Document::new("pw");
        doc.entries_mut()
            .remove_record("ghost", RecordType::Notes)
            .unwrap();
        assert!(doc.entries().is_empty());
    }

    #[test]
    fn sort_orders_by_group_then_title() {
        let mut doc = Document::new("pw");
        let mut b = Entry::with_title("beta");
        b.set_group("z").unwrap();
        let mut a = Entry::with_title("Alpha");
        a.set_group("z").unwrap();
        let c = Entry::with_title("solo");
        doc.entries_mut().add_range([b, a, c]).unwrap();

        doc.entries_mut().sort().unwrap();
        let order: Vec<String> = doc.entries().iter().map(Entry::title).collect();
        assert_eq!(order, vec!["solo", "Alpha", "beta"]);
    }

    #[test]
    fn forget_passphrase_blocks_saving() {
        let mut doc = Document::new("pw");
        doc.forget_passphrase();
        let mut out = Vec::new();
        assert!(matches!(
            doc.save(&mut out),
            Err(Error::InvalidArgument(_))
        ));
    }
}
