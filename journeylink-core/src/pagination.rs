//! Opaque keyset cursors for ride search.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position after the last ride of a page, in `(departure_time, id)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "t")]
    pub departure_time: DateTime<Utc>,
    #[serde(rename = "i")]
    pub id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("cursor is not valid base64")]
    Encoding(#[from] base64::DecodeError),
    #[error("cursor payload is malformed")]
    Payload(#[from] serde_json::Error),
}

impl Cursor {
    pub fn new(departure_time: DateTime<Utc>, id: Uuid) -> Self {
        Self { departure_time, id }
    }

    pub fn encode(&self) -> String {
        // Serialising two plain fields cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn as_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.departure_time, self.id)
    }
}

/// One page of results and the cursor for the next one, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Builds a page from `limit + 1` fetched rows: the extra row only
    /// signals that another page exists.
    pub fn from_overfetch(mut rows: Vec<T>, limit: usize, key: impl Fn(&T) -> Cursor) -> Self {
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more { rows.last().map(|last| key(last).encode()) } else { None };
        Self { items: rows, next_cursor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_decodes_what_it_encodes() {
        let cursor = Cursor::new(Utc::now(), Uuid::new_v4());
        assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);
    }

    #[test]
    fn test_garbage_cursor_is_rejected() {
        assert!(matches!(Cursor::decode("%%%"), Err(CursorError::Encoding(_))));
        let not_json = URL_SAFE_NO_PAD.encode(b"hello");
        assert!(matches!(Cursor::decode(&not_json), Err(CursorError::Payload(_))));
    }

    #[test]
    fn test_overfetch_sets_next_cursor() {
        let now = Utc::now();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        let page = Page::from_overfetch(ids.clone(), 2, |id| Cursor::new(now, *id));
        assert_eq!(page.items.len(), 2);
        let next = Cursor::decode(page.next_cursor.as_deref().unwrap()).unwrap();
        assert_eq!(next.id, ids[1]);

        let last = Page::from_overfetch(ids, 3, |id| Cursor::new(now, *id));
        assert!(last.next_cursor.is_none());
    }
}
