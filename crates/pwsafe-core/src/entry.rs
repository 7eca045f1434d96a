//! Entries and the entry collection

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::collection::RecordCollection;
use crate::document::DocHandle;
use crate::error::{Error, Result};
use crate::field::{Field, Record, RecordType};

/// One password entry: an ordered group of typed records.
///
/// Every entry carries a `Uuid` record from the moment it exists; default
/// construction also creates empty `Title` and `Password` records. The
/// convenience accessors are thin views over the records by type and return
/// an empty string or the epoch when the record is absent.
#[derive(Debug, Clone)]
pub struct Entry {
    records: RecordCollection,
}

impl Entry {
    /// Create an empty entry with fresh identity.
    pub fn new() -> Self {
        Self::with_title("")
    }

    /// Create an entry with the given title.
    pub fn with_title(title: &str) -> Self {
        let mut records = RecordCollection::new(None);
        records.push_unchecked(Field::with_raw(
            RecordType::Uuid,
            Uuid::new_v4().as_bytes().to_vec(),
        ));
        records.push_unchecked(Field::with_raw(
            RecordType::Title,
            title.as_bytes().to_vec(),
        ));
        records.push_unchecked(Field::with_raw(RecordType::Password, Vec::new()));
        Self { records }
    }

    /// Build an entry from parsed records, generating identity if the
    /// stream carried none.
    pub(crate) fn from_records(fields: Vec<Record>) -> Self {
        let mut records = RecordCollection::new(None);
        for field in fields {
            records.push_unchecked(field);
        }
        if !records.contains(RecordType::Uuid) {
            records.push_unchecked(Field::with_raw(
                RecordType::Uuid,
                Uuid::new_v4().as_bytes().to_vec(),
            ));
        }
        Self { records }
    }

    pub fn records(&self) -> &RecordCollection {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut RecordCollection {
        &mut self.records
    }

    pub(crate) fn attach(&mut self, state: Option<DocHandle>) {
        self.records.attach(state);
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.records.doc_state().is_some()
    }

    fn text_record(&self, record_type: RecordType) -> String {
        self.records.text(record_type).unwrap_or_default()
    }

    fn time_record(&self, record_type: RecordType) -> DateTime<Utc> {
        self.records
            .time(record_type)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    fn set_text_record(&mut self, record_type: RecordType, value: &str) -> Result<()> {
        self.records.set_text(record_type, value)?;
        self.stamp_modified(record_type)
    }

    fn set_time_record(&mut self, record_type: RecordType, value: DateTime<Utc>) -> Result<()> {
        self.records.set_time(record_type, value)?;
        self.stamp_modified(record_type)
    }

    /// Stamp modification times after a tracked write.
    fn stamp_modified(&mut self, written: RecordType) -> Result<()> {
        let tracked = self
            .records
            .doc_state()
            .is_some_and(|state| state.is_track_modify());
        let stamp_target = matches!(
            written,
            RecordType::LastModificationTime
                | RecordType::PasswordModificationTime
                | RecordType::LastAccessTime
        );
        if !tracked || stamp_target {
            return Ok(());
        }
        let now = Utc::now();
        self.records
            .set_time(RecordType::LastModificationTime, now)?;
        if written == RecordType::Password {
            self.records
                .set_time(RecordType::PasswordModificationTime, now)?;
        }
        Ok(())
    }

    /// Stamp the access time, when the owning document tracks access and is
    /// writable. Detached entries are left untouched.
    pub fn touch(&mut self) -> Result<()> {
        let allowed = self
            .records
            .doc_state()
            .is_some_and(|state| state.is_track_access() && !state.is_read_only());
        if !allowed {
            return Ok(());
        }
        self.records.set_time(RecordType::LastAccessTime, Utc::now())
    }

    pub fn uuid(&self) -> Uuid {
        self.records.uuid(RecordType::Uuid).unwrap_or_else(Uuid::nil)
    }

    pub fn set_uuid(&mut self, value: Uuid) -> Result<()> {
        self.records.set_uuid(RecordType::Uuid, value)
    }

    pub fn group(&self) -> String {
        self.text_record(RecordType::Group)
    }

    pub fn set_group(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::Group, value)
    }

    pub fn title(&self) -> String {
        self.text_record(RecordType::Title)
    }

    pub fn set_title(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::Title, value)
    }

    pub fn user_name(&self) -> String {
        self.text_record(RecordType::UserName)
    }

    pub fn set_user_name(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::UserName, value)
    }

    pub fn password(&self) -> String {
        self.text_record(RecordType::Password)
    }

    pub fn set_password(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::Password, value)
    }

    pub fn notes(&self) -> String {
        self.text_record(RecordType::Notes)
    }

    pub fn set_notes(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::Notes, value)
    }

    pub fn url(&self) -> String {
        self.text_record(RecordType::Url)
    }

    pub fn set_url(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::Url, value)
    }

    pub fn email(&self) -> String {
        self.text_record(RecordType::EmailAddress)
    }

    pub fn set_email(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::EmailAddress, value)
    }

    pub fn autotype(&self) -> String {
        self.text_record(RecordType::Autotype)
    }

    pub fn set_autotype(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::Autotype, value)
    }

    pub fn two_factor_key(&self) -> Vec<u8> {
        self.records
            .get(RecordType::TwoFactorKey)
            .map(|f| f.bytes().to_vec())
            .unwrap_or_default()
    }

    pub fn set_two_factor_key(&mut self, value: &[u8]) -> Result<()> {
        self.records.field_mut(RecordType::TwoFactorKey)?.set_bytes(value)?;
        self.stamp_modified(RecordType::TwoFactorKey)
    }

    pub fn credit_card_number(&self) -> String {
        self.text_record(RecordType::CreditCardNumber)
    }

    pub fn set_credit_card_number(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::CreditCardNumber, value)
    }

    pub fn credit_card_expiration(&self) -> String {
        self.text_record(RecordType::CreditCardExpiration)
    }

    pub fn set_credit_card_expiration(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::CreditCardExpiration, value)
    }

    pub fn credit_card_verification_value(&self) -> String {
        self.text_record(RecordType::CreditCardVerificationValue)
    }

    pub fn set_credit_card_verification_value(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::CreditCardVerificationValue, value)
    }

    pub fn credit_card_pin(&self) -> String {
        self.text_record(RecordType::CreditCardPin)
    }

    pub fn set_credit_card_pin(&mut self, value: &str) -> Result<()> {
        self.set_text_record(RecordType::CreditCardPin, value)
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.time_record(RecordType::CreationTime)
    }

    pub fn set_creation_time(&mut self, value: DateTime<Utc>) -> Result<()> {
        self.set_time_record(RecordType::CreationTime, value)
    }

    pub fn password_modification_time(&self) -> DateTime<Utc> {
        self.time_record(RecordType::PasswordModificationTime)
    }

    pub fn set_password_modification_time(&mut self, value: DateTime<Utc>) -> Result<()> {
        self.set_time_record(RecordType::PasswordModificationTime, value)
    }

    pub fn last_access_time(&self) -> DateTime<Utc> {
        self.time_record(RecordType::LastAccessTime)
    }

    pub fn set_last_access_time(&mut self, value: DateTime<Utc>) -> Result<()> {
        self.set_time_record(RecordType::LastAccessTime, value)
    }

    pub fn password_expiry_time(&self) -> DateTime<Utc> {
        self.time_record(RecordType::PasswordExpiryTime)
    }

    pub fn set_password_expiry_time(&mut self, value: DateTime<Utc>) -> Result<()> {
        self.set_time_record(RecordType::PasswordExpiryTime, value)
    }

    pub fn last_modification_time(&self) -> DateTime<Utc> {
        self.time_record(RecordType::LastModificationTime)
    }

    pub fn set_last_modification_time(&mut self, value: DateTime<Utc>) -> Result<()> {
        self.set_time_record(RecordType::LastModificationTime, value)
    }

    /// Tokenize this entry's autotype script bound to its own fields.
    ///
    /// An entry without an autotype record uses the default sequence.
    pub fn autotype_tokens(&self) -> Vec<crate::autotype::AutotypeToken> {
        crate::autotype::tokenize_entry(&self.autotype(), self)
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

/// Case-insensitive comparison used for title and group lookups.
///
/// Uses invariant Unicode lowercasing rather than the process locale, so
/// lookups behave the same on every platform.
fn eq_ci(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// The ordered entries of a document.
#[derive(Debug)]
pub struct EntryCollection {
    entries: Vec<Entry>,
    state: DocHandle,
}

impl EntryCollection {
    pub(crate) fn new(state: DocHandle) -> Self {
        Self {
            entries: Vec::new(),
            state,
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.state.is_read_only() {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    fn position_by_title(&self, title: &str) -> Option<usize> {
        self.entries.iter().position(|e| eq_ci(&e.title(), title))
    }

    fn position_by_group_title(&self, group: &str, title: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| eq_ci(&e.group(), group) && eq_ci(&e.title(), title))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entry> {
        self.entries.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.entries.get_mut(index)
    }

    /// Add an entry to the end of the collection, taking ownership.
    pub fn add(&mut self, mut entry: Entry) -> Result<()> {
        self.ensure_writable()?;
        if entry.is_attached() {
            return Err(Error::InvalidArgument(
                "entry already belongs to a document",
            ));
        }
        entry.attach(Some(self.state.clone()));
        self.entries.push(entry);
        self.state.mark_changed();
        Ok(())
    }

    /// Add several entries. Fails before mutating if any is already owned.
    pub fn add_range<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = Entry>,
    {
        self.ensure_writable()?;
        let entries: Vec<Entry> = entries.into_iter().collect();
        if entries.iter().any(Entry::is_attached) {
            return Err(Error::InvalidArgument(
                "entry already belongs to a document",
            ));
        }
        for mut entry in entries {
            entry.attach(Some(self.state.clone()));
            self.entries.push(entry);
        }
        self.state.mark_changed();
        Ok(())
    }

    pub fn insert(&mut self, index: usize, mut entry: Entry) -> Result<()> {
        self.ensure_writable()?;
        if index > self.entries.len() {
            return Err(Error::InvalidArgument("index out of range"));
        }
        if entry.is_attached() {
            return Err(Error::InvalidArgument(
                "entry already belongs to a document",
            ));
        }
        entry.attach(Some(self.state.clone()));
        self.entries.insert(index, entry);
        self.state.mark_changed();
        Ok(())
    }

    /// Remove and return the entry at a position, detaching it.
    pub fn remove_at(&mut self, index: usize) -> Result<Entry> {
        self.ensure_writable()?;
        if index >= self.entries.len() {
            return Err(Error::InvalidArgument("index out of range"));
        }
        let mut entry = self.entries.remove(index);
        entry.attach(None);
        self.state.mark_changed();
        Ok(entry)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.ensure_writable()?;
        if !self.entries.is_empty() {
            self.entries.clear();
            self.state.mark_changed();
        }
        Ok(())
    }

    /// Load path: append without ownership checks or change marking.
    pub(crate) fn push_unchecked(&mut self, mut entry: Entry) {
        entry.attach(Some(self.state.clone()));
        self.entries.push(entry);
    }

    pub fn contains(&self, title: &str) -> bool {
        self.position_by_title(title).is_some()
    }

    pub fn contains_in_group(&self, group: &str, title: &str) -> bool {
        self.position_by_group_title(group, title).is_some()
    }

    /// First entry with the given title, compared case-insensitively.
    pub fn entry(&self, title: &str) -> Option<&Entry> {
        self.position_by_title(title).map(|i| &self.entries[i])
    }

    pub fn entry_mut(&mut self, title: &str) -> Option<&mut Entry> {
        match self.position_by_title(title) {
            Some(index) => Some(&mut self.entries[index]),
            None => None,
        }
    }

    pub fn entry_in_group(&self, group: &str, title: &str) -> Option<&Entry> {
        self.position_by_group_title(group, title)
            .map(|i| &self.entries[i])
    }

    pub fn entry_in_group_mut(&mut self, group: &str, title: &str) -> Option<&mut Entry> {
        match self.position_by_group_title(group, title) {
            Some(index) => Some(&mut self.entries[index]),
            None => None,
        }
    }

    /// First entry with the given title, created and appended when absent.
    pub fn entry_or_create(&mut self, title: &str) -> Result<&mut Entry> {
        if let Some(index) = self.position_by_title(title) {
            return Ok(&mut self.entries[index]);
        }
        self.ensure_writable()?;
        let mut entry = Entry::with_title(title);
        entry.attach(Some(self.state.clone()));
        self.entries.push(entry);
        self.state.mark_changed();
        Ok(self.entries.last_mut().expect("entry was just pushed"))
    }

    pub fn entry_or_create_in_group(&mut self, group: &str, title: &str) -> Result<&mut Entry> {
        if let Some(index) = self.position_by_group_title(group, title) {
            return Ok(&mut self.entries[index]);
        }
        self.ensure_writable()?;
        let mut entry = Entry::with_title(title);
        entry.records_mut().set_text(RecordType::Group, group)?;
        entry.attach(Some(self.state.clone()));
        self.entries.push(entry);
        self.state.mark_changed();
        Ok(self.entries.last_mut().expect("entry was just pushed"))
    }

    /// Remove the first entry with the given title. Returns whether one was
    /// removed.
    pub fn remove(&mut self, title: &str) -> Result<bool> {
        self.ensure_writable()?;
        match self.position_by_title(title) {
            Some(index) => {
                self.entries.remove(index);
                self.state.mark_changed();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_in_group(&mut self, group: &str, title: &str) -> Result<bool> {
        self.ensure_writable()?;
        match self.position_by_group_title(group, title) {
            Some(index) => {
                self.entries.remove(index);
                self.state.mark_changed();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Compatibility shim for the original indexer assignment: only the
    /// `None` sentinel is accepted, and it removes the matched entry.
    pub fn set_entry(&mut self, title: &str, value: Option<Entry>) -> Result<()> {
        match value {
            Some(_) => Err(Error::OnlyNoneSupported),
            None => {
                self.remove(title)?;
                Ok(())
            }
        }
    }

    pub fn set_entry_in_group(
        &mut self,
        group: &str,
        title: &str,
        value: Option<Entry>,
    ) -> Result<()> {
        match value {
            Some(_) => Err(Error::OnlyNoneSupported),
            None => {
                self.remove_in_group(group, title)?;
                Ok(())
            }
        }
    }

    /// Remove one record of the named entry. The entry is not created when
    /// absent.
    pub fn remove_record(&mut self, title: &str, record_type: RecordType) -> Result<()> {
        self.ensure_writable()?;
        if let Some(index) = self.position_by_title(title) {
            self.entries[index].records_mut().remove(record_type)?;
        }
        Ok(())
    }

    pub fn remove_record_in_group(
        &mut self,
        group: &str,
        title: &str,
        record_type: RecordType,
    ) -> Result<()> {
        self.ensure_writable()?;
        if let Some(index) = self.position_by_group_title(group, title) {
            self.entries[index].records_mut().remove(record_type)?;
        }
        Ok(())
    }

    /// Stable sort by (group, title), compared case-insensitively.
    pub fn sort(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.entries
            .sort_by_key(|e| (e.group().to_lowercase(), e.title().to_lowercase()));
        self.state.mark_changed();
        Ok(())
    }
}
