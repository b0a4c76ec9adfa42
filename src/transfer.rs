// CSV import/export for bulk card registration
//
// Every imported row goes through the Record Composer, so master rows are
// created lazily and the same validation applies as on the form. A bad row
// is reported and skipped; it never aborts the rest of the file.

use anyhow::{Context, Result};
use std::path::Path;

use crate::composer;
use crate::entities::CardForm;
use crate::storage::ObjectStore;
use crate::store::CardStore;

/// Outcome of a bulk import.
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub imported: usize,
    /// (1-based CSV record number, reason)
    pub failed: Vec<(usize, String)>,
}

/// Read card forms from a CSV file. Expected headers match the form fields:
/// category,region,organization,representative,phone,mobile,fax,email,address,notes
pub fn load_cards_csv(path: &Path) -> Result<Vec<CardForm>> {
    let mut rdr = csv::Reader::from_path(path).context("Failed to open CSV file")?;

    let mut forms = Vec::new();
    for result in rdr.deserialize() {
        let form: CardForm = result.context("Failed to deserialize card row")?;
        forms.push(form);
    }

    Ok(forms)
}

/// Import every row of a CSV file as a new card.
pub fn import_csv(
    store: &dyn CardStore,
    images: &dyn ObjectStore,
    path: &Path,
) -> Result<ImportSummary> {
    let forms = load_cards_csv(path)?;

    let mut summary = ImportSummary::default();
    for (index, form) in forms.iter().enumerate() {
        match composer::submit(store, images, form, None, None) {
            Ok(_) => summary.imported += 1,
            Err(e) => summary.failed.push((index + 1, e.to_string())),
        }
    }

    Ok(summary)
}

/// Export all cards, joined with their labels, to a CSV file that
/// `import_csv` can read back.
pub fn export_csv(store: &dyn CardStore, path: &Path) -> Result<usize> {
    let rows = store
        .list_cards()
        .map_err(|e| anyhow::anyhow!("failed to list cards: {}", e))?;

    let mut wtr = csv::Writer::from_path(path).context("Failed to create CSV file")?;
    for row in &rows {
        wtr.serialize(row.to_form())
            .context("Failed to serialize card row")?;
    }
    wtr.flush().context("Failed to flush CSV file")?;

    Ok(rows.len())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::path::PathBuf;

    struct NullObjectStore;

    impl ObjectStore for NullObjectStore {
        fn upload(&self, _path: &str, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
        fn remove(&self, _path: &str) -> Result<()> {
            Ok(())
        }
        fn public_url(&self, path: &str) -> String {
            format!("http://localhost/images/{}", path)
        }
        fn signed_url(&self, path: &str, _ttl_secs: i64) -> Result<String> {
            Ok(format!("http://localhost/images/{}?token=fake", path))
        }
    }

    fn temp_csv(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("cardbox-{}-{}.csv", name, uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_import_creates_cards_and_masters() {
        let store = SqliteStore::open_in_memory().unwrap();
        let csv = temp_csv(
            "import",
            "category,region,organization,representative,phone,mobile,fax,email,address,notes\n\
             Clinic,East,Acme Inc,Taro,03-1234-5678,,,taro@example.com,,\n\
             Clinic,West,Beta Works,Hanako,,,,hanako@example.com,,\n",
        );

        let summary = import_csv(&store, &NullObjectStore, &csv).unwrap();

        assert_eq!(summary.imported, 2);
        assert!(summary.failed.is_empty());
        assert_eq!(store.list_cards().unwrap().len(), 2);
        // "Clinic" was created once and reused.
        assert_eq!(
            store.list_masters(crate::entities::Dimension::Category).unwrap().len(),
            1
        );

        std::fs::remove_file(csv).unwrap();
    }

    #[test]
    fn test_import_skips_invalid_rows_and_reports_them() {
        let store = SqliteStore::open_in_memory().unwrap();
        let csv = temp_csv(
            "partial",
            "category,region,organization,representative,phone,mobile,fax,email,address,notes\n\
             Clinic,East,Acme Inc,Taro,,,,,,\n\
             ,,,,not-a-phone,,,bad-email,,\n",
        );

        let summary = import_csv(&store, &NullObjectStore, &csv).unwrap();

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, 2);
        assert!(summary.failed[0].1.contains("validation failed"));
    }

    #[test]
    fn test_export_import_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let csv = temp_csv(
            "seed",
            "category,region,organization,representative,phone,mobile,fax,email,address,notes\n\
             Clinic,East,City Hospital,Hanako,06-1111-2222,,,hanako@example.com,Osaka,VIP\n",
        );
        import_csv(&store, &NullObjectStore, &csv).unwrap();

        let out = std::env::temp_dir().join(format!("cardbox-export-{}.csv", uuid::Uuid::new_v4()));
        let exported = export_csv(&store, &out).unwrap();
        assert_eq!(exported, 1);

        let second = SqliteStore::open_in_memory().unwrap();
        let summary = import_csv(&second, &NullObjectStore, &out).unwrap();
        assert_eq!(summary.imported, 1);

        let row = &second.list_cards().unwrap()[0];
        assert_eq!(row.organization, "City Hospital");
        assert_eq!(row.address, "Osaka");
        assert_eq!(row.notes, "VIP");

        std::fs::remove_file(csv).unwrap();
        std::fs::remove_file(out).unwrap();
    }
}
