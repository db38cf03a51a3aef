//! cardgate-store — Card records kept in an `.xlsx` workbook.
//!
//! The workbook has a single `User_Data` sheet with a fixed header row. Every
//! operation loads the whole file; appends rewrite it in full. There is no
//! index and no locking.

pub mod record;
pub mod workbook;

pub use record::{find_by_credentials, CardRecord};
pub use workbook::{CardStore, StoreError, HEADER, SHEET_NAME};
