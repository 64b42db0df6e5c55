//! Keyset pagination helpers.
//!
//! Collections are ordered newest first by `(timestamp, id)`. A cursor
//! encodes the last item of a page so the next query can resume right
//! after it without offsets.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

pub const DEFAULT_PAGE_LIMIT: i64 = 25;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Position after which the next page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub timestamp: DateTime<Utc>,
    pub id: String,
}

impl Cursor {
    pub fn new(timestamp: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            timestamp,
            id: id.into(),
        }
    }

    /// Opaque string handed to clients.
    pub fn encode(&self) -> String {
        let raw = format!(
            "{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.id
        );
        URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput("Invalid cursor".to_string());

        let bytes = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| invalid())?;
        let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (ts, id) = raw.split_once('|').ok_or_else(invalid)?;
        if id.is_empty() {
            return Err(invalid());
        }

        let timestamp = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| invalid())?
            .with_timezone(&Utc);

        Ok(Self::new(timestamp, id))
    }

    /// Decode an optional cursor argument.
    pub fn parse_opt(encoded: Option<&str>) -> Result<Option<Self>> {
        encoded
            .filter(|s| !s.is_empty())
            .map(Self::decode)
            .transpose()
    }
}

/// Clamp a requested page size into `1..=MAX_PAGE_LIMIT`.
pub fn clamp_limit(limit: Option<i32>) -> i64 {
    match limit {
        Some(l) if l > 0 => (l as i64).min(MAX_PAGE_LIMIT),
        _ => DEFAULT_PAGE_LIMIT,
    }
}

/// One page of a collection.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub total_count: i64,
    pub cursor: Option<String>,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Build a page from rows fetched with `LIMIT limit + 1`.
    ///
    /// The extra row only signals that another page exists; it is dropped
    /// and the cursor points at the last kept row.
    pub fn from_rows<F>(mut rows: Vec<T>, limit: i64, total_count: i64, key: F) -> Self
    where
        F: Fn(&T) -> Cursor,
    {
        let has_more = rows.len() as i64 > limit;
        rows.truncate(limit.max(0) as usize);

        let cursor = if has_more {
            rows.last().map(|row| key(row).encode())
        } else {
            None
        };

        Self {
            total_count,
            cursor,
            items: rows,
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            total_count: self.total_count,
            cursor: self.cursor,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cursor_encode_decode() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let cursor = Cursor::new(ts, "abc123");

        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_cursor_rejects_garbage() {
        assert!(Cursor::decode("not base64 !!").is_err());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode("no-separator")).is_err());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode("yesterday|id")).is_err());
    }

    #[test]
    fn test_parse_opt_treats_empty_as_none() {
        assert_eq!(Cursor::parse_opt(None).unwrap(), None);
        assert_eq!(Cursor::parse_opt(Some("")).unwrap(), None);
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), DEFAULT_PAGE_LIMIT);
        assert_eq!(clamp_limit(Some(0)), DEFAULT_PAGE_LIMIT);
        assert_eq!(clamp_limit(Some(-5)), DEFAULT_PAGE_LIMIT);
        assert_eq!(clamp_limit(Some(10)), 10);
        assert_eq!(clamp_limit(Some(10_000)), MAX_PAGE_LIMIT);
    }

    #[test]
    fn test_page_from_rows_sets_cursor_only_when_more() {
        let ts = Utc::now();
        let key = |s: &&str| Cursor::new(ts, *s);

        let page = Page::from_rows(vec!["a", "b", "c"], 2, 3, key);
        assert_eq!(page.items, vec!["a", "b"]);
        assert_eq!(page.cursor, Some(Cursor::new(ts, "b").encode()));

        let last = Page::from_rows(vec!["c"], 2, 3, key);
        assert_eq!(last.items, vec!["c"]);
        assert!(last.cursor.is_none());
    }
}
