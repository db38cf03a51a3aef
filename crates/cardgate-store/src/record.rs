use cardgate_core::{Embedding, ParseEmbeddingError};
use serde::{Deserialize, Serialize};

/// One row of the `User_Data` sheet. Every field is kept as the text in the cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    pub name: String,
    pub card_number: String,
    /// Comma-joined embedding values.
    pub face_encoding: String,
    pub cvv: String,
    pub expiry_date: String,
}

impl CardRecord {
    pub fn new(
        name: impl Into<String>,
        card_number: impl Into<String>,
        face: &Embedding,
        cvv: impl Into<String>,
        expiry_date: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            card_number: card_number.into(),
            face_encoding: face.to_cell_text(),
            cvv: cvv.into(),
            expiry_date: expiry_date.into(),
        }
    }

    pub(crate) fn from_cells([name, card_number, face_encoding, cvv, expiry_date]: [String; 5]) -> Self {
        Self {
            name,
            card_number,
            face_encoding,
            cvv,
            expiry_date,
        }
    }

    pub(crate) fn cells(&self) -> [&str; 5] {
        [
            self.name.as_str(),
            self.card_number.as_str(),
            self.face_encoding.as_str(),
            self.cvv.as_str(),
            self.expiry_date.as_str(),
        ]
    }

    /// The registered face, parsed from its cell text.
    pub fn embedding(&self) -> Result<Embedding, ParseEmbeddingError> {
        Embedding::parse_cell_text(&self.face_encoding)
    }

    /// Whether the given card details identify this record.
    ///
    /// The stored card number is compared trimmed; CVV and expiry are compared
    /// as stored. All inputs are trimmed.
    pub fn matches_credentials(&self, card_number: &str, cvv: &str, expiry_date: &str) -> bool {
        self.card_number.trim() == card_number.trim()
            && self.cvv == cvv.trim()
            && self.expiry_date == expiry_date.trim()
    }

    /// Card number with every digit but the last four replaced by `*`.
    /// Numbers of four digits or fewer are masked entirely.
    pub fn masked_card_number(&self) -> String {
        let digits = self.card_number.chars().filter(char::is_ascii_digit).count();
        let keep_from = if digits > 4 { digits - 4 } else { digits };

        let mut seen = 0;
        self.card_number
            .chars()
            .map(|c| {
                if !c.is_ascii_digit() {
                    return c;
                }
                seen += 1;
                if seen > keep_from {
                    c
                } else {
                    '*'
                }
            })
            .collect()
    }
}

/// First record, in sheet order, whose card details match.
pub fn find_by_credentials<'a>(
    records: &'a [CardRecord],
    card_number: &str,
    cvv: &str,
    expiry_date: &str,
) -> Option<&'a CardRecord> {
    records
        .iter()
        .find(|r| r.matches_credentials(card_number, cvv, expiry_date))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, card: &str, cvv: &str, expiry: &str) -> CardRecord {
        CardRecord::new(name, card, &Embedding::new(vec![0.5, 0.25]), cvv, expiry)
    }

    #[test]
    fn test_new_serializes_embedding() {
        let r = record("Ada", "4111", "123", "01/30");
        assert_eq!(r.face_encoding, "0.5,0.25");
        assert_eq!(r.embedding().unwrap().values, vec![0.5, 0.25]);
    }

    #[test]
    fn test_credentials_trim_input() {
        let r = record("Ada", " 4111111111111111 ", "123", "01/30");
        assert!(r.matches_credentials("4111111111111111", " 123 ", "01/30\n"));
        assert!(!r.matches_credentials("4111111111111111", "124", "01/30"));
        assert!(!r.matches_credentials("4111111111111111", "123", "02/30"));
    }

    #[test]
    fn test_find_first_duplicate_wins() {
        let records = vec![
            record("First", "4111", "123", "01/30"),
            record("Second", "4111", "123", "01/30"),
        ];
        let found = find_by_credentials(&records, "4111", "123", "01/30").unwrap();
        assert_eq!(found.name, "First");
    }

    #[test]
    fn test_find_missing_card() {
        let records = vec![record("Ada", "4111", "123", "01/30")];
        assert!(find_by_credentials(&records, "5555", "123", "01/30").is_none());
        assert!(find_by_credentials(&[], "4111", "123", "01/30").is_none());
    }

    #[test]
    fn test_masked_card_number() {
        assert_eq!(
            record("", "4111 1111 1111 1234", "", "").masked_card_number(),
            "**** **** **** 1234"
        );
        assert_eq!(record("", "4111111111111234", "", "").masked_card_number(), "************1234");
        assert_eq!(record("", "123", "", "").masked_card_number(), "***");
        assert_eq!(record("", "1234", "", "").masked_card_number(), "****");
    }

    #[test]
    fn test_record_json_fields() {
        let json = serde_json::to_value(record("Ada", "4111", "123", "01/30")).unwrap();
        assert_eq!(json["card_number"], "4111");
        assert_eq!(json["expiry_date"], "01/30");
    }
}
