//! The key/value contract the host ledger exposes to a transaction.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Separator between the parts of a composite key.
pub const MIN_UNICODE_RUNE: char = '\u{0}';

/// Upper bound used to close a prefix range scan.
pub const MAX_UNICODE_RUNE: char = '\u{10FFFF}';

/// A raw key/value pair returned by a range scan.
pub type StateEntry = (String, Vec<u8>);

/// Operations a transaction may perform against the host ledger.
///
/// Reads observe committed state only: a value written with
/// [`put_state`](LedgerStub::put_state) becomes visible to `get_state` and to
/// range scans once the transaction commits. Read-your-writes is layered on
/// top by [`crate::store::LedgerDb`].
pub trait LedgerStub {
    fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    fn del_state(&mut self, key: &str) -> Result<()>;

    /// Every committed entry whose key starts with the composite key built
    /// from `object_type` and `attributes`, in key order.
    fn get_state_by_partial_composite_key(
        &self,
        object_type: &str,
        attributes: &[String],
    ) -> Result<Vec<StateEntry>>;

    /// Paginated variant of
    /// [`get_state_by_partial_composite_key`](LedgerStub::get_state_by_partial_composite_key).
    ///
    /// `bookmark` is the ledger-native cursor returned by the previous call
    /// (empty for the first page). The returned bookmark is empty when no
    /// entries remain.
    fn get_state_by_partial_composite_key_with_pagination(
        &self,
        object_type: &str,
        attributes: &[String],
        page_size: u32,
        bookmark: &str,
    ) -> Result<(Vec<StateEntry>, String)>;

    /// Identity of the organisation that submitted the transaction.
    fn get_creator(&self) -> String;

    fn get_tx_id(&self) -> String;

    fn get_tx_timestamp(&self) -> DateTime<Utc>;

    /// Set the transaction's event. Only the last call within a transaction
    /// is kept.
    fn set_event(&mut self, name: &str, payload: Vec<u8>) -> Result<()>;
}

/// Build the composite key `\0objectType\0attr1\0attr2\0...`.
pub fn create_composite_key(object_type: &str, attributes: &[String]) -> Result<String> {
    validate_composite_key_attribute(object_type)?;
    let mut key = String::with_capacity(
        2 + object_type.len() + attributes.iter().map(|a| a.len() + 1).sum::<usize>(),
    );
    key.push(MIN_UNICODE_RUNE);
    key.push_str(object_type);
    key.push(MIN_UNICODE_RUNE);
    for attribute in attributes {
        validate_composite_key_attribute(attribute)?;
        key.push_str(attribute);
        key.push(MIN_UNICODE_RUNE);
    }
    Ok(key)
}

/// Split a composite key back into its object type and attributes.
pub fn split_composite_key(key: &str) -> Result<(String, Vec<String>)> {
    let body = key
        .strip_prefix(MIN_UNICODE_RUNE)
        .ok_or_else(|| Error::Internal(format!("not a composite key: {:?}", key)))?;
    let mut parts: Vec<String> = body
        .split(MIN_UNICODE_RUNE)
        .map(|part| part.to_string())
        .collect();
    // Trailing separator leaves an empty last component.
    if parts.last().map(|p| p.is_empty()).unwrap_or(false) {
        parts.pop();
    }
    if parts.is_empty() {
        return Err(Error::Internal(format!("empty composite key: {:?}", key)));
    }
    let object_type = parts.remove(0);
    Ok((object_type, parts))
}

fn validate_composite_key_attribute(attribute: &str) -> Result<()> {
    if attribute.contains(MIN_UNICODE_RUNE) || attribute.contains(MAX_UNICODE_RUNE) {
        return Err(Error::BadRequest(format!(
            "composite key attribute {:?} contains a reserved code point",
            attribute
        )));
    }
    Ok(())
}
