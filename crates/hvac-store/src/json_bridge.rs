use std::fs;
use std::path::Path;

use hvac_core::DocumentSnapshot;

use crate::error::{Result, StoreError};
use crate::store::Store;

impl Store {
    /// Import a document snapshot file, replacing any stored copy with the
    /// same path. Returns the imported snapshot.
    pub fn import_document_file(&self, path: &Path) -> Result<DocumentSnapshot> {
        let json = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        self.import_document_str(&json)
    }

    pub fn import_document_str(&self, json: &str) -> Result<DocumentSnapshot> {
        let snapshot: DocumentSnapshot = serde_json::from_str(json)?;
        if snapshot.path.trim().is_empty() {
            return Err(StoreError::InvalidData(
                "document snapshot has an empty path".into(),
            ));
        }
        self.save_document(&snapshot)?;
        Ok(snapshot)
    }

    /// Write a stored document as pretty JSON.
    pub fn export_document_file(&self, document: &str, out: &Path) -> Result<()> {
        let json = self.export_document_string(document)?;
        fs::write(out, json).map_err(|e| StoreError::io(out, e))
    }

    pub fn export_document_string(&self, document: &str) -> Result<String> {
        let snapshot = self
            .load_document(document)?
            .ok_or_else(|| StoreError::InvalidData(format!("no stored document '{document}'")))?;
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvac_core::{MemoryDocument, MemoryElement, params};

    fn make_snapshot() -> DocumentSnapshot {
        let mut doc = MemoryDocument::new("C:/jobs/clinic.rvt");
        doc.insert(
            MemoryElement::space(1)
                .with_text(params::NUMBER, "1.01")
                .with_real(params::SUPPLY_AIRFLOW, 120.0),
        );
        doc.snapshot()
    }

    #[test]
    fn test_import_export_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let original = make_snapshot();
        let json = serde_json::to_string(&original).unwrap();

        let imported = store.import_document_str(&json).unwrap();
        assert_eq!(imported, original);

        let exported = store.export_document_string("C:/jobs/clinic.rvt").unwrap();
        let reparsed: DocumentSnapshot = serde_json::from_str(&exported).unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.json");
        let output = dir.path().join("out.json");
        fs::write(&input, serde_json::to_string(&make_snapshot()).unwrap()).unwrap();

        let store = Store::open_in_memory().unwrap();
        store.import_document_file(&input).unwrap();
        store
            .export_document_file("C:/jobs/clinic.rvt", &output)
            .unwrap();

        let written: DocumentSnapshot =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written, make_snapshot());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .import_document_file(Path::new("/nonexistent/doc.json"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn test_empty_path_rejected() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .import_document_str(r#"{"path": "  ", "elements": []}"#)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
        assert!(store.list_documents().unwrap().is_empty());
    }

    #[test]
    fn test_export_unknown_document() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.export_document_string("C:/nope.rvt").is_err());
    }
}
