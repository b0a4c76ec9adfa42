// Master-Data Resolver
//
// Maps a human-entered label, for one of the four fixed dimensions, to a
// stable identifier, creating the row on first use. Two users registering a
// brand-new label in the same instant must both end up referencing one shared
// row: the insert races against the table's uniqueness constraint, so a
// DuplicateKey answer sends us back to the lookup exactly once.

use crate::entities::Dimension;
use crate::error::CardError;
use crate::store::{CardStore, StoreError};

/// Resolve a label to its master id, inserting the row if it does not exist.
///
/// A label that is blank after trimming never reaches the store; it returns
/// `Ok(None)` ("no selection") and the caller decides whether that is
/// acceptable for the dimension.
pub fn resolve(
    store: &dyn CardStore,
    dimension: Dimension,
    label: &str,
) -> Result<Option<i64>, CardError> {
    let label = label.trim();
    if label.is_empty() {
        return Ok(None);
    }

    // Fast path: the label already exists.
    if let Some(record) = find(store, dimension, label)? {
        return Ok(Some(record.id));
    }

    match store.insert_master(dimension, label) {
        Ok(record) => Ok(Some(record.id)),
        Err(StoreError::DuplicateKey) => {
            // A concurrent submitter created the same label between our
            // lookup and our insert. Their row is the shared one.
            match find(store, dimension, label)? {
                Some(record) => Ok(Some(record.id)),
                None => Err(CardError::MasterDataConflict {
                    dimension,
                    label: label.to_string(),
                }),
            }
        }
        Err(e) => Err(CardError::MasterDataUnavailable {
            dimension,
            detail: e.to_string(),
        }),
    }
}

fn find(
    store: &dyn CardStore,
    dimension: Dimension,
    label: &str,
) -> Result<Option<crate::entities::MasterRecord>, CardError> {
    store
        .find_master(dimension, label)
        .map_err(|e| CardError::MasterDataUnavailable {
            dimension,
            detail: e.to_string(),
        })
}

// ============================================================================
// TESTS
// ============================================================================
