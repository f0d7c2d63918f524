//! Opaque keyset cursors.
//!
//! A cursor captures the ORDER BY column identifiers and the boundary row's
//! values as URL-safe base64 of a compact JSON object. Cursors are the only
//! engine value that must stay stable across process boundaries.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Highest cursor payload version this engine understands.
pub const CURSOR_VERSION: u32 = 1;

/// Page direction a cursor was issued for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CursorDirection {
    #[serde(rename = "f")]
    Forward,
    #[serde(rename = "b")]
    Backward,
}

/// Decoded cursor payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CursorData {
    pub v: u32,
    pub d: CursorDirection,
    /// Boundary values, one per ORDER BY column.
    pub vals: Vec<serde_json::Value>,
    /// Stable ORDER BY column identifiers (alias plus path segments).
    pub cols: Vec<String>,
}

impl CursorData {
    pub fn new(
        direction: CursorDirection,
        vals: Vec<serde_json::Value>,
        cols: Vec<String>,
    ) -> Self {
        Self {
            v: CURSOR_VERSION,
            d: direction,
            vals,
            cols,
        }
    }

    /// Encodes to the opaque wire form. Output never contains `+`, `/`, `=`.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("cursor payload serializes");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decodes and structurally validates an opaque cursor string.
    pub fn decode(cursor: &str) -> Result<CursorData> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|_| Error::validation("cursor is not valid base64"))?;
        let data: CursorData = serde_json::from_slice(&bytes)
            .map_err(|_| Error::validation("cursor payload is not valid JSON"))?;
        if data.v > CURSOR_VERSION {
            return Err(Error::validation(format!(
                "cursor version {} is newer than supported version {CURSOR_VERSION}",
                data.v
            )));
        }
        if data.vals.len() != data.cols.len() {
            return Err(Error::validation(
                "cursor value count does not match its column count",
            ));
        }
        Ok(data)
    }

    /// Checks the cursor against a query's ORDER BY column identifiers.
    pub fn validate_columns(&self, expected: &[String]) -> Result<()> {
        if self.cols != expected {
            return Err(Error::validation(format!(
                "cursor columns {:?} do not match the query's order by {:?}",
                self.cols, expected
            ))
            .with_suggestion("reuse cursors only with the query that produced them"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_preserves_payload() {
        let cursor = CursorData::new(
            CursorDirection::Forward,
            vec![json!(30), json!("Alice"), json!(null)],
            vec!["p.age".into(), "p.name".into(), "p.score".into()],
        );
        let decoded = CursorData::decode(&cursor.encode()).expect("decodes");
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn encoding_is_url_safe() {
        let cursor = CursorData::new(
            CursorDirection::Backward,
            vec![json!("value with spaces & symbols ~!")],
            vec!["p.name".into()],
        );
        let encoded = cursor.encode();
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn rejects_newer_versions() {
        let mut cursor = CursorData::new(CursorDirection::Forward, vec![], vec![]);
        cursor.v = CURSOR_VERSION + 1;
        let encoded = cursor.encode();
        assert!(CursorData::decode(&encoded).is_err());
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let cursor = CursorData {
            v: CURSOR_VERSION,
            d: CursorDirection::Forward,
            vals: vec![json!(1)],
            cols: vec!["a".into(), "b".into()],
        };
        assert!(CursorData::decode(&cursor.encode()).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(CursorData::decode("not base64 !!!").is_err());
        assert!(CursorData::decode(&URL_SAFE_NO_PAD.encode(b"{not json")).is_err());
    }

    #[test]
    fn column_validation_requires_exact_match() {
        let cursor = CursorData::new(
            CursorDirection::Forward,
            vec![json!(1)],
            vec!["p.age".into()],
        );
        assert!(cursor.validate_columns(&["p.age".into()]).is_ok());
        assert!(cursor.validate_columns(&["p.name".into()]).is_err());
        assert!(cursor
            .validate_columns(&["p.age".into(), "p.name".into()])
            .is_err());
    }
}
