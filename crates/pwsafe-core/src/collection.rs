//! Ordered field collections for headers and entry records

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::document::DocHandle;
use crate::error::{Error, Result};
use crate::field::{Field, FieldType, HeaderType, RecordType};

/// An ordered set of fields, unique per non-repeatable type.
///
/// Enumeration follows insertion order; lookups by type return the first
/// match. Mutations honor the owning document's read-only flag and mark it
/// changed.
pub struct FieldCollection<K: FieldType> {
    fields: Vec<Field<K>>,
    state: Option<DocHandle>,
}

/// The header group of a document.
pub type HeaderCollection = FieldCollection<HeaderType>;

/// The record group of one entry.
pub type RecordCollection = FieldCollection<RecordType>;

impl<K: FieldType> FieldCollection<K> {
    pub(crate) fn new(state: Option<DocHandle>) -> Self {
        Self {
            fields: Vec::new(),
            state,
        }
    }

    pub(crate) fn attach(&mut self, state: Option<DocHandle>) {
        for field in &mut self.fields {
            field.attach(state.clone());
        }
        self.state = state;
    }

    pub(crate) fn doc_state(&self) -> Option<&DocHandle> {
        self.state.as_ref()
    }

    fn ensure_writable(&self) -> Result<()> {
        if let Some(state) = &self.state {
            if state.is_read_only() {
                return Err(Error::ReadOnly);
            }
        }
        Ok(())
    }

    fn mark_changed(&self) {
        if let Some(state) = &self.state {
            state.mark_changed();
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field_type: K) -> bool {
        self.fields.iter().any(|f| f.field_type() == field_type)
    }

    /// First field of the given type, if present.
    pub fn get(&self, field_type: K) -> Option<&Field<K>> {
        self.fields.iter().find(|f| f.field_type() == field_type)
    }

    /// First field of the given type, creating an empty one when absent.
    ///
    /// The required version field is never auto-created; asking for it when
    /// it is missing is an error.
    pub fn field_mut(&mut self, field_type: K) -> Result<&mut Field<K>> {
        let position = self
            .fields
            .iter()
            .position(|f| f.field_type() == field_type);
        match position {
            Some(index) => Ok(&mut self.fields[index]),
            None if field_type.is_required() => {
                Err(Error::InvalidArgument("required field is missing"))
            }
            None => {
                self.ensure_writable()?;
                let mut field = Field::new(field_type);
                field.attach(self.state.clone());
                self.fields.push(field);
                self.mark_changed();
                Ok(self.fields.last_mut().expect("field was just pushed"))
            }
        }
    }

    /// Append a caller-built field. Duplicate non-repeatable types and the
    /// group terminator are rejected.
    pub fn push(&mut self, mut field: Field<K>) -> Result<()> {
        self.ensure_writable()?;
        let field_type = field.field_type();
        if field_type.is_end() {
            return Err(Error::InvalidArgument(
                "the group terminator is not a storable field",
            ));
        }
        if !field_type.is_repeatable() && self.contains(field_type) {
            return Err(Error::InvalidArgument("duplicate field type"));
        }
        field.attach(self.state.clone());
        self.fields.push(field);
        self.mark_changed();
        Ok(())
    }

    /// Parser path: append without validation or change marking.
    pub(crate) fn push_unchecked(&mut self, mut field: Field<K>) {
        field.attach(self.state.clone());
        self.fields.push(field);
    }

    /// Remove every field of the given type. Returns whether any was removed.
    pub fn remove(&mut self, field_type: K) -> Result<bool> {
        self.ensure_writable()?;
        if field_type.is_required() {
            return Err(Error::InvalidArgument("required field cannot be removed"));
        }
        let before = self.fields.len();
        self.fields.retain(|f| f.field_type() != field_type);
        let removed = self.fields.len() != before;
        if removed {
            self.mark_changed();
        }
        Ok(removed)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field<K>> {
        self.fields.iter()
    }

    // Typed passthroughs used by the entry and document accessors.

    pub fn text(&self, field_type: K) -> Option<String> {
        self.get(field_type).map(Field::text)
    }

    pub fn set_text(&mut self, field_type: K, value: &str) -> Result<()> {
        self.field_mut(field_type)?.set_text(value)
    }

    pub fn time(&self, field_type: K) -> Option<DateTime<Utc>> {
        self.get(field_type).and_then(|f| f.time().ok())
    }

    pub fn set_time(&mut self, field_type: K, value: DateTime<Utc>) -> Result<()> {
        self.field_mut(field_type)?.set_time(value)
    }

    pub fn uuid(&self, field_type: K) -> Option<Uuid> {
        self.get(field_type).and_then(|f| f.uuid().ok())
    }

    pub fn set_uuid(&mut self, field_type: K, value: Uuid) -> Result<()> {
        self.field_mut(field_type)?.set_uuid(value)
    }
}

// A clone is detached from any owning document.
impl<K: FieldType> Clone for FieldCollection<K> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            state: None,
        }
    }
}

impl<K: FieldType> std::fmt::Debug for FieldCollection<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.fields.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_first_match_in_insertion_order() {
        let mut headers = HeaderCollection::new(None);
        headers.push_unchecked(Field::with_raw(HeaderType::Version, vec![0x0D, 0x03]));
        headers.push_unchecked(Field::with_raw(HeaderType::DatabaseName, b"one".to_vec()));

        let types: Vec<_> = headers.iter().map(|f| f.field_type()).collect();
        assert_eq!(types, vec![HeaderType::Version, HeaderType::DatabaseName]);
        assert_eq!(headers.text(HeaderType::DatabaseName).unwrap(), "one");
    }

    #[test]
    fn set_text_auto_creates_missing_field() {
        let mut headers = HeaderCollection::new(None);
        assert!(!headers.contains(HeaderType::DatabaseName));
        headers.set_text(HeaderType::DatabaseName, "vault").unwrap();
        assert_eq!(headers.text(HeaderType::DatabaseName).unwrap(), "vault");
    }

    #[test]
    fn version_is_never_auto_created() {
        let mut headers = HeaderCollection::new(None);
        assert!(matches!(
            headers.field_mut(HeaderType::Version),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn version_cannot_be_removed() {
        let mut headers = HeaderCollection::new(None);
        headers.push_unchecked(Field::with_raw(HeaderType::Version, vec![0x0D, 0x03]));
        assert!(matches!(
            headers.remove(HeaderType::Version),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn duplicate_unique_type_is_rejected() {
        let mut headers = HeaderCollection::new(None);
        headers.push(Field::new(HeaderType::DatabaseName)).unwrap();
        assert!(matches!(
            headers.push(Field::new(HeaderType::DatabaseName)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn repeatable_type_may_repeat() {
        let mut headers = HeaderCollection::new(None);
        headers.push(Field::new(HeaderType::EmptyGroups)).unwrap();
        headers.push(Field::new(HeaderType::EmptyGroups)).unwrap();
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn terminator_is_not_storable() {
        let mut records = RecordCollection::new(None);
        assert!(records.push(Field::new(RecordType::EndOfEntry)).is_err());
    }

    #[test]
    fn remove_drops_every_match() {
        let mut headers = HeaderCollection::new(None);
        headers.push(Field::new(HeaderType::EmptyGroups)).unwrap();
        headers.push(Field::new(HeaderType::EmptyGroups)).unwrap();
        assert!(headers.remove(HeaderType::EmptyGroups).unwrap());
        assert!(headers.is_empty());
        assert!(!headers.remove(HeaderType::EmptyGroups).unwrap());
    }
}
