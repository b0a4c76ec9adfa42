// Record Composer
//
// Turns a submitted form into a persisted card row: validate everything up
// front, resolve the four dimension labels to master ids, attach the image
// if a file came with the form, then write the composite record in one
// statement. Master rows created along the way are kept even when a later
// step fails; they are reusable lookup rows, not partial card state.

use crate::entities::{CardForm, Dimension};
use crate::error::{CardError, FieldError};
use crate::resolver;
use crate::storage::{self, ObjectStore, UploadFile};
use crate::store::{CardStore, CardWrite, StoreError};

// ============================================================================
// VALIDATION
// ============================================================================

/// Check a submitted form, collecting every violation. Required fields are
/// the four dimension labels; contact fields are optional but format-checked
/// when non-blank.
pub fn validate_form(form: &CardForm) -> Vec<FieldError> {
    let mut errors = Vec::new();

    for dim in Dimension::ALL {
        if form.label(dim).trim().is_empty() {
            errors.push(FieldError::new(dim.field(), "required"));
        }
    }

    if !form.email.trim().is_empty() && !is_valid_email(&form.email) {
        errors.push(FieldError::new("email", "not a valid email address"));
    }

    let phone_fields = [
        ("phone", &form.phone),
        ("mobile", &form.mobile),
        ("fax", &form.fax),
    ];
    for (field, value) in phone_fields {
        if !value.trim().is_empty() && !is_valid_phone(value) {
            errors.push(FieldError::new(
                field,
                "expected digits grouped by hyphens, e.g. 03-1234-5678",
            ));
        }
    }

    errors
}

/// Standard address shape: local@domain with a dot in the domain, no
/// whitespace anywhere.
pub fn is_valid_email(s: &str) -> bool {
    let s = s.trim();
    if s.chars().any(|c| c.is_whitespace()) {
        return false;
    }

    let mut parts = s.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }

    // The domain needs a dot with something on both sides.
    matches!(domain.rfind('.'), Some(i) if i > 0 && i + 1 < domain.len())
}

/// Local phone shape: 0 + up to four digits, hyphen, up to four digits,
/// hyphen, exactly four digits (e.g. 03-1234-5678, 090-1234-5678).
pub fn is_valid_phone(s: &str) -> bool {
    let parts: Vec<&str> = s.trim().split('-').collect();
    if parts.len() != 3 {
        return false;
    }
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return false;
    }

    parts[0].starts_with('0')
        && (2..=5).contains(&parts[0].len())
        && (1..=4).contains(&parts[1].len())
        && parts[2].len() == 4
}

// ============================================================================
// SUBMIT
// ============================================================================

/// Persist a submitted form as a card row.
///
/// `existing_id` selects the edit path: the row is replaced wholesale, and
/// its image reference carries over unless `file` supplies a new upload.
/// Without `existing_id` a new row is inserted.
pub fn submit(
    store: &dyn CardStore,
    images: &dyn ObjectStore,
    form: &CardForm,
    file: Option<&UploadFile>,
    existing_id: Option<i64>,
) -> Result<i64, CardError> {
    // Step 1: validate everything before any store call.
    let violations = validate_form(form);
    if !violations.is_empty() {
        return Err(CardError::ValidationFailed(violations));
    }

    // Edit path: the row must exist, and we need its current image reference.
    let prior_ref: Option<String> = match existing_id {
        Some(id) => {
            let row = store
                .get_card(id)
                .map_err(|e| CardError::WriteFailed(format!("businesscard lookup {}: {}", id, e)))?
                .ok_or_else(|| {
                    CardError::WriteFailed(format!("businesscard {} does not exist", id))
                })?;
            row.image_ref
        }
        None => None,
    };

    // Step 2: resolve the four dimension labels. Validation guaranteed the
    // labels are non-blank, so a "no selection" answer here is impossible.
    let mut ids = [0i64; 4];
    for (slot, dim) in ids.iter_mut().zip(Dimension::ALL) {
        *slot = resolver::resolve(store, dim, form.label(dim))?
            .ok_or_else(|| CardError::invalid_field(dim.field(), "required"))?;
    }
    let [category_id, region_id, organization_id, representative_id] = ids;

    // Step 3: attach the new image, or carry the previous reference.
    let image_ref = match file {
        Some(upload) => Some(storage::attach(
            images,
            upload,
            existing_id,
            prior_ref.as_deref(),
        )?),
        None => prior_ref,
    };

    // Step 4: single composite write.
    let card = CardWrite {
        category_id,
        region_id,
        organization_id,
        representative_id,
        phone: form.phone.trim().to_string(),
        mobile: form.mobile.trim().to_string(),
        fax: form.fax.trim().to_string(),
        email: form.email.trim().to_string(),
        address: form.address.trim().to_string(),
        notes: form.notes.trim().to_string(),
        image_ref,
    };

    match existing_id {
        Some(id) => {
            store.update_card(id, &card).map_err(|e| match e {
                StoreError::NotFound => {
                    CardError::WriteFailed(format!("businesscard {} does not exist", id))
                }
                other => CardError::WriteFailed(format!("businesscard update {}: {}", id, other)),
            })?;
            Ok(id)
        }
        None => store
            .insert_card(&card)
            .map_err(|e| CardError::WriteFailed(format!("businesscard insert: {}", e))),
    }
}

/// Remove a card: delete the stored image best-effort, then the row.
pub fn delete(
    store: &dyn CardStore,
    images: &dyn ObjectStore,
    id: i64,
) -> Result<(), CardError> {
    let row = store
        .get_card(id)
        .map_err(|e| CardError::WriteFailed(format!("businesscard lookup {}: {}", id, e)))?
        .ok_or_else(|| CardError::WriteFailed(format!("businesscard {} does not exist", id)))?;

    // Failure to delete the object must not block deleting the record.
    if let Some(image_ref) = &row.image_ref {
        storage::remove_quietly(images, image_ref);
    }

    store.delete_card(id).map_err(|e| match e {
        StoreError::NotFound => CardError::WriteFailed(format!("businesscard {} does not exist", id)),
        other => CardError::WriteFailed(format!("businesscard delete {}: {}", id, other)),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{filter_cards, SearchField};
    use crate::store::SqliteStore;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn form(category: &str, region: &str, organization: &str, representative: &str) -> CardForm {
        CardForm {
            category: category.to_string(),
            region: region.to_string(),
            organization: organization.to_string(),
            representative: representative.to_string(),
            phone: "03-1234-5678".to_string(),
            email: "taro@example.com".to_string(),
            ..CardForm::default()
        }
    }

    fn png(bytes: usize) -> UploadFile {
        UploadFile {
            file_name: "card.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0u8; bytes],
        }
    }

    #[test]
    fn test_validate_collects_every_failure() {
        let form = CardForm {
            email: "not-an-address".to_string(),
            phone: "12345".to_string(),
            ..CardForm::default()
        };

        let errors = validate_form(&form);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();

        // All four blank dimensions plus both format failures, in one pass.
        assert!(fields.contains(&"category"));
        assert!(fields.contains(&"region"));
        assert!(fields.contains(&"organization"));
        assert!(fields.contains(&"representative"));
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"phone"));
        assert_eq!(errors.len(), 6);
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("taro@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.co.jp"));
        assert!(!is_valid_email("taro@example"));
        assert!(!is_valid_email("taro example@example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("taro@"));
        assert!(!is_valid_email("taro@@example.com"));
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("03-1234-5678"));
        assert!(is_valid_phone("090-1234-5678"));
        assert!(is_valid_phone("0120-12-3456"));
        assert!(!is_valid_phone("1-1234-5678")); // no leading zero
        assert!(!is_valid_phone("03-1234-567")); // last group must be 4 digits
        assert!(!is_valid_phone("0312345678")); // no hyphens
        assert!(!is_valid_phone("03-12a4-5678"));
    }

    #[test]
    fn test_submit_round_trip_with_new_labels() {
        let store = SqliteStore::open_in_memory().unwrap();
        let images = CountingObjectStore::default();

        let submitted = form("NewCat", "East", "Acme", "Taro");
        let id = submit(&store, &images, &submitted, None, None).unwrap();

        let row = store.get_card(id).unwrap().unwrap();
        assert_eq!(row.category, "NewCat");
        assert_eq!(row.region, "East");
        assert_eq!(row.organization, "Acme");
        assert_eq!(row.representative, "Taro");
        assert_eq!(row.phone, "03-1234-5678");
        assert_eq!(row.email, "taro@example.com");
    }

    #[test]
    fn test_submit_reuses_existing_masters() {
        let store = SqliteStore::open_in_memory().unwrap();
        let images = CountingObjectStore::default();

        submit(&store, &images, &form("Clinic", "East", "Acme", "Taro"), None, None).unwrap();
        submit(&store, &images, &form("Clinic", "East", "Acme", "Hanako"), None, None).unwrap();

        assert_eq!(store.list_masters(Dimension::Category).unwrap().len(), 1);
        assert_eq!(store.list_masters(Dimension::Organization).unwrap().len(), 1);
        assert_eq!(store.list_masters(Dimension::Representative).unwrap().len(), 2);
    }

    #[test]
    fn test_validation_failure_blocks_all_store_calls() {
        let store = SqliteStore::open_in_memory().unwrap();
        let images = CountingObjectStore::default();

        let blank = CardForm::default();
        let err = submit(&store, &images, &blank, None, None).unwrap_err();

        assert!(matches!(err, CardError::ValidationFailed(_)));
        assert!(store.list_masters(Dimension::Category).unwrap().is_empty());
        assert!(store.list_cards().unwrap().is_empty());
    }

    #[test]
    fn test_masters_survive_a_failed_card_write() {
        let store = SqliteStore::open_in_memory().unwrap();
        let images = CountingObjectStore::default();

        // Edit of a row that does not exist fails before resolution starts,
        // so point at a deleted row instead: create, delete, then edit.
        let id = submit(&store, &images, &form("Clinic", "East", "Acme", "Taro"), None, None).unwrap();
        store.delete_card(id).unwrap();

        let err = submit(&store, &images, &form("Clinic", "West", "Acme", "Taro"), None, Some(id))
            .unwrap_err();
        assert!(matches!(err, CardError::WriteFailed(_)));

        // Masters created by the earlier successful submit are untouched.
        assert_eq!(store.list_masters(Dimension::Region).unwrap().len(), 1);
    }

    #[test]
    fn test_edit_keeps_prior_image_when_no_new_file() {
        let store = SqliteStore::open_in_memory().unwrap();
        let images = CountingObjectStore::default();

        let submitted = form("Clinic", "East", "Acme", "Taro");
        let id = submit(&store, &images, &submitted, Some(&png(100)), None).unwrap();

        let before = store.get_card(id).unwrap().unwrap();
        let prior_ref = before.image_ref.clone().unwrap();

        let mut edited = submitted.clone();
        edited.phone = "06-9876-5432".to_string();
        submit(&store, &images, &edited, None, Some(id)).unwrap();

        let after = store.get_card(id).unwrap().unwrap();
        assert_eq!(after.phone, "06-9876-5432");
        assert_eq!(after.image_ref.as_deref(), Some(prior_ref.as_str()));
    }

    #[test]
    fn test_edit_with_new_image_replaces_ref_despite_failed_cleanup() {
        let store = SqliteStore::open_in_memory().unwrap();
        let images = CountingObjectStore { fail_remove: true, ..Default::default() };

        let submitted = form("Clinic", "East", "Acme", "Taro");
        let id = submit(&store, &images, &submitted, Some(&png(100)), None).unwrap();
        let old_ref = store.get_card(id).unwrap().unwrap().image_ref.unwrap();

        submit(&store, &images, &submitted, Some(&png(200)), Some(id)).unwrap();

        let new_ref = store.get_card(id).unwrap().unwrap().image_ref.unwrap();
        assert_ne!(new_ref, old_ref);
        // The delete of the old object was attempted and its failure ignored.
        assert_eq!(images.removes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_oversize_upload_aborts_submission() {
        let store = SqliteStore::open_in_memory().unwrap();
        let images = CountingObjectStore::default();

        let submitted = form("Clinic", "East", "Acme", "Taro");
        let big = png(11 * 1024 * 1024);
        let err = submit(&store, &images, &submitted, Some(&big), None).unwrap_err();

        assert!(matches!(err, CardError::InvalidAttachment(_)));
        assert_eq!(images.uploads.load(Ordering::SeqCst), 0);
        assert!(store.list_cards().unwrap().is_empty());
    }

    #[test]
    fn test_delete_removes_image_then_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let images = CountingObjectStore::default();

        let id = submit(&store, &images, &form("Clinic", "East", "Acme", "Taro"), Some(&png(10)), None)
            .unwrap();

        delete(&store, &images, id).unwrap();

        assert!(store.get_card(id).unwrap().is_none());
        assert_eq!(images.removes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delete_survives_storage_failure() {
        let store = SqliteStore::open_in_memory().unwrap();
        let images = CountingObjectStore { fail_remove: true, ..Default::default() };

        let id = submit(&store, &images, &form("Clinic", "East", "Acme", "Taro"), Some(&png(10)), None)
            .unwrap();

        delete(&store, &images, id).unwrap();
        assert!(store.get_card(id).unwrap().is_none());
    }

    #[test]
    fn test_end_to_end_register_then_search() {
        let store = SqliteStore::open_in_memory().unwrap();
        let images = CountingObjectStore::default();

        submit(&store, &images, &form("Clinic", "East", "City Hospital", "Hanako"), None, None)
            .unwrap();

        let rows = store.list_cards().unwrap();

        let hits = filter_cards(&rows, "hosp", SearchField::Organization);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].organization, "City Hospital");

        let none = filter_cards(&rows, "zzz", SearchField::Organization);
        assert!(none.is_empty());
    }

    // ------------------------------------------------------------------------
    // Fake object store
    // ------------------------------------------------------------------------

    #[derive(Default)]
    struct CountingObjectStore {
        uploads: AtomicUsize,
        removes: AtomicUsize,
        fail_remove: bool,
    }

    impl ObjectStore for CountingObjectStore {
        fn upload(&self, _path: &str, _bytes: &[u8]) -> Result<()> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn remove(&self, _path: &str) -> Result<()> {
            self.removes.fetch_add(1, Ordering::SeqCst);
            if self.fail_remove {
                anyhow::bail!("permission denied");
            }
            Ok(())
        }

        fn public_url(&self, path: &str) -> String {
            format!("http://localhost/images/{}", path)
        }

        fn signed_url(&self, path: &str, _ttl_secs: i64) -> Result<String> {
            Ok(format!("http://localhost/images/{}?token=fake", path))
        }
    }
}
