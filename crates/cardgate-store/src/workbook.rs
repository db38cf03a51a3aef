//! Whole-file load/append/save of the `User_Data` workbook.

use crate::record::CardRecord;
use std::path::{Path, PathBuf};
use thiserror::Error;
use umya_spreadsheet::{Spreadsheet, Worksheet};

pub const SHEET_NAME: &str = "User_Data";
pub const HEADER: [&str; 5] = ["Name", "Credit Card Number", "Face Encoding", "CVV", "Expiry Date"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read workbook {path}: {message}")]
    Read { path: String, message: String },
    #[error("failed to write workbook {path}: {message}")]
    Write { path: String, message: String },
    #[error("workbook {0} has no User_Data sheet")]
    MissingSheet(String),
    #[error("failed to create sheet: {0}")]
    CreateSheet(String),
}

/// Handle on the workbook file. Holds no data between calls.
#[derive(Debug, Clone)]
pub struct CardStore {
    path: PathBuf,
}

impl CardStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write a fresh workbook containing only the header row, replacing any
    /// existing file.
    pub fn create(&self) -> Result<(), StoreError> {
        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        let sheet = book
            .new_sheet(SHEET_NAME)
            .map_err(|e| StoreError::CreateSheet(e.to_string()))?;
        write_row(sheet, 1, HEADER);

        self.save(&book)?;
        tracing::info!(path = %self.path.display(), "created user database");
        Ok(())
    }

    /// Create the workbook unless the file already exists. Returns whether it
    /// was created.
    pub fn ensure(&self) -> Result<bool, StoreError> {
        if self.exists() {
            return Ok(false);
        }
        self.create()?;
        Ok(true)
    }

    /// Add a record after the last used row.
    pub fn append(&self, record: &CardRecord) -> Result<(), StoreError> {
        let mut book = self.load()?;
        let sheet = book
            .get_sheet_by_name_mut(SHEET_NAME)
            .ok_or_else(|| StoreError::MissingSheet(self.display()))?;

        let row = sheet.get_highest_row().max(1) + 1;
        write_row(sheet, row, record.cells());

        self.save(&book)?;
        tracing::info!(row, name = %record.name, "appended user record");
        Ok(())
    }

    /// Every record below the header, in sheet order. Blank rows are skipped.
    pub fn load_all(&self) -> Result<Vec<CardRecord>, StoreError> {
        let book = self.load()?;
        let sheet = book
            .get_sheet_by_name(SHEET_NAME)
            .ok_or_else(|| StoreError::MissingSheet(self.display()))?;

        let records: Vec<CardRecord> = (2..=sheet.get_highest_row())
            .map(|row| read_row(sheet, row))
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .map(CardRecord::from_cells)
            .collect();

        tracing::debug!(count = records.len(), "loaded user records");
        Ok(records)
    }

    /// First record matching the given card details, if any.
    pub fn find_by_credentials(
        &self,
        card_number: &str,
        cvv: &str,
        expiry_date: &str,
    ) -> Result<Option<CardRecord>, StoreError> {
        let records = self.load_all()?;
        Ok(crate::record::find_by_credentials(&records, card_number, cvv, expiry_date).cloned())
    }

    fn load(&self) -> Result<Spreadsheet, StoreError> {
        umya_spreadsheet::reader::xlsx::read(&self.path).map_err(|e| StoreError::Read {
            path: self.display(),
            message: e.to_string(),
        })
    }

    fn save(&self, book: &Spreadsheet) -> Result<(), StoreError> {
        umya_spreadsheet::writer::xlsx::write(book, &self.path).map_err(|e| StoreError::Write {
            path: self.display(),
            message: e.to_string(),
        })
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}

fn write_row(sheet: &mut Worksheet, row: u32, cells: [&str; 5]) {
    for (col, value) in (1u32..).zip(cells) {
        sheet.get_cell_mut((col, row)).set_value_string(value);
    }
}

fn read_row(sheet: &Worksheet, row: u32) -> [String; 5] {
    std::array::from_fn(|i| sheet.get_value((i as u32 + 1, row)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardgate_core::Embedding;
    use tempfile::TempDir;

    fn temp_store() -> (CardStore, TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = CardStore::new(dir.path().join("user_database.xlsx"));
        (store, dir)
    }

    fn record(i: usize) -> CardRecord {
        CardRecord::new(
            format!("User {i}"),
            format!("4000 0000 0000 000{i}"),
            &Embedding::new(vec![i as f32 * 0.1, -0.5, 0.25]),
            format!("{i}{i}{i}"),
            "12/29",
        )
    }

    #[test]
    fn test_create_writes_header_only() {
        let (store, _dir) = temp_store();
        store.create().unwrap();

        let book = umya_spreadsheet::reader::xlsx::read(store.path()).unwrap();
        let sheet = book.get_sheet_by_name(SHEET_NAME).unwrap();
        assert_eq!(read_row(sheet, 1), HEADER.map(String::from));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_ensure_creates_once() {
        let (store, _dir) = temp_store();
        assert!(store.ensure().unwrap());
        store.append(&record(1)).unwrap();

        assert!(!store.ensure().unwrap());
        assert_eq!(store.load_all().unwrap().len(), 1, "ensure must not clobber data");
    }

    #[test]
    fn test_append_preserves_order_and_text() {
        let (store, _dir) = temp_store();
        store.create().unwrap();

        let written: Vec<CardRecord> = (1..=5).map(record).collect();
        for r in &written {
            store.append(r).unwrap();
        }

        assert_eq!(store.load_all().unwrap(), written);
    }

    #[test]
    fn test_numeric_looking_fields_stay_text() {
        let (store, _dir) = temp_store();
        store.create().unwrap();
        let r = CardRecord {
            name: "Zero".into(),
            card_number: "0012345678901234".into(),
            face_encoding: "0.1,0.2".into(),
            cvv: "007".into(),
            expiry_date: "01/30".into(),
        };
        store.append(&r).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded[0].cvv, "007");
        assert_eq!(loaded[0].card_number, "0012345678901234");
    }

    #[test]
    fn test_find_by_credentials() {
        let (store, _dir) = temp_store();
        store.create().unwrap();
        store.append(&record(1)).unwrap();
        store.append(&record(2)).unwrap();

        let hit = store
            .find_by_credentials("4000 0000 0000 0002", "222", "12/29")
            .unwrap();
        assert_eq!(hit.map(|r| r.name), Some("User 2".to_string()));

        let miss = store
            .find_by_credentials("9999 9999 9999 9999", "222", "12/29")
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_sparse_rows_load_as_text_and_append_goes_below() {
        let (store, _dir) = temp_store();
        store.create().unwrap();

        // Row 2 misses its encoding and expiry, row 3 is blank, row 4 only has a name.
        let mut book = umya_spreadsheet::reader::xlsx::read(store.path()).unwrap();
        let sheet = book.get_sheet_by_name_mut(SHEET_NAME).unwrap();
        sheet.get_cell_mut((1, 2)).set_value_string("Ada");
        sheet.get_cell_mut((2, 2)).set_value_string("4111111111111111");
        sheet.get_cell_mut((4, 2)).set_value_string("123");
        sheet.get_cell_mut((1, 4)).set_value_string("Bob");
        umya_spreadsheet::writer::xlsx::write(&book, store.path()).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2, "blank row 3 is skipped");
        assert_eq!(
            (loaded[0].name.as_str(), loaded[0].card_number.as_str(), loaded[0].cvv.as_str()),
            ("Ada", "4111111111111111", "123")
        );
        assert_eq!(loaded[0].face_encoding, "");
        assert_eq!(loaded[0].expiry_date, "");
        assert_eq!(loaded[1].name, "Bob");
        assert_eq!(loaded[1].card_number, "");
        assert_eq!(loaded[1].cvv, "");

        let mut cy = record(3);
        cy.name = "Cy".into();
        store.append(&cy).unwrap();

        let book = umya_spreadsheet::reader::xlsx::read(store.path()).unwrap();
        let sheet = book.get_sheet_by_name(SHEET_NAME).unwrap();
        assert_eq!(sheet.get_value((1, 5)), "Cy");
        assert_eq!(sheet.get_value((1, 3)), "");

        let names: Vec<String> = store.load_all().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["Ada", "Bob", "Cy"]);
    }

    #[test]
    fn test_read_missing_file_is_error() {
        let (store, _dir) = temp_store();
        assert!(matches!(store.load_all(), Err(StoreError::Read { .. })));
    }

    #[test]
    fn test_wrong_sheet_is_error() {
        let (store, _dir) = temp_store();
        let mut book = umya_spreadsheet::new_file_empty_worksheet();
        book.new_sheet("Other").unwrap();
        umya_spreadsheet::writer::xlsx::write(&book, store.path()).unwrap();

        assert!(matches!(store.load_all(), Err(StoreError::MissingSheet(_))));
        assert!(matches!(store.append(&record(1)), Err(StoreError::MissingSheet(_))));
    }
}
