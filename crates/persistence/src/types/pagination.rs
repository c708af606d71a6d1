//! Pagination types.
//!
//! The caller-facing cursor is logical and backend-independent: it names a
//! page number and a page size. It is handed out as an opaque string
//! (`nextPageHash`), base64-encoded JSON of the form `{"pageNo":2,"limit":50}`.
//!
//! The cursor never carries backend state. Native resume points stay on the
//! server (see `engine::ResumePoints`); a cursor with no remembered resume
//! point is served by skipping `(pageNo - 1) * limit` matches from the start
//! of the result set.
//!
//! Decoding never fails: an absent, malformed or nonsensical cursor means
//! "start of the result set". Unknown members are ignored.

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
};
use serde::{Deserialize, Serialize};

use super::value::Record;

/// Page size used when neither the cursor nor the request names one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Highest page number a cursor may name.
pub const MAX_PAGE_NO: u32 = u32::MAX - 1;

/// A backend-specific resume point.
///
/// Never handed to callers; it only travels between backend calls and the
/// server-side resume map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum NativeContinuation {
    /// Last evaluated composite key (table keys plus index keys).
    LastKey(Record),
    /// Opaque next-token issued by the store.
    Token(String),
}

/// The logical, backend-independent paging position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingCursor {
    /// 1-based page number.
    pub page_no: u32,
    /// Logical page size.
    pub limit: u32,
}

impl PagingCursor {
    /// Returns the cursor for the first page.
    pub fn first(limit: u32) -> Self {
        Self { page_no: 1, limit }
    }

    /// Creates a cursor for an arbitrary page.
    pub fn new(page_no: u32, limit: u32) -> Self {
        Self { page_no, limit }
    }

    /// Returns the cursor of the following page, or `None` past
    /// [`MAX_PAGE_NO`].
    pub fn next(&self) -> Option<Self> {
        let page_no = self.page_no.checked_add(1).filter(|n| *n <= MAX_PAGE_NO)?;
        Some(Self {
            page_no,
            limit: self.limit,
        })
    }

    /// Number of matches that precede this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page_no.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Encodes the cursor to an opaque string.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decodes a cursor, returning `None` when it is malformed.
    ///
    /// Cursors that were base64-encoded twice by older releases are accepted
    /// through exactly one extra decoding step.
    pub fn decode(s: &str) -> Option<Self> {
        let bytes = decode_base64(s.trim())?;
        if let Some(cursor) = Self::from_json(&bytes) {
            return Some(cursor);
        }

        let inner = std::str::from_utf8(&bytes).ok()?;
        let cursor = Self::from_json(&decode_base64(inner.trim())?)?;
        tracing::warn!(
            page_no = cursor.page_no,
            "Migrated legacy double-encoded paging cursor"
        );
        Some(cursor)
    }

    /// Resolves an optional caller cursor; anything unusable yields the first page.
    pub fn resolve(s: Option<&str>, default_limit: u32) -> Self {
        match s.filter(|s| !s.is_empty()).map(|s| (s, Self::decode(s))) {
            Some((_, Some(cursor))) => cursor,
            Some((raw, None)) => {
                tracing::debug!(cursor = %raw, "Ignoring unreadable paging cursor");
                Self::first(default_limit)
            }
            None => Self::first(default_limit),
        }
    }

    fn from_json(bytes: &[u8]) -> Option<Self> {
        let cursor: PagingCursor = serde_json::from_slice(bytes).ok()?;
        ((1..=MAX_PAGE_NO).contains(&cursor.page_no) && cursor.limit >= 1).then_some(cursor)
    }
}

fn decode_base64(s: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(s)
        .or_else(|_| URL_SAFE.decode(s))
        .or_else(|_| STANDARD.decode(s))
        .or_else(|_| STANDARD_NO_PAD.decode(s))
        .ok()
}

/// Information about a page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// The page number of this page.
    pub page_number: u32,
    /// The logical page size.
    pub page_size: u32,
    /// The opaque cursor of the next page, if there is one.
    pub next_page_hash: Option<String>,
    /// `true` if the page was cut short by a backend error or cancellation.
    pub partial: bool,
}

impl PageInfo {
    /// Creates page info for a terminal page.
    pub fn end(page_number: u32, page_size: u32) -> Self {
        Self {
            page_number,
            page_size,
            next_page_hash: None,
            partial: false,
        }
    }

    /// Creates page info pointing at `next`.
    pub fn with_next(page_number: u32, page_size: u32, next: &PagingCursor) -> Self {
        Self {
            page_number,
            page_size,
            next_page_hash: Some(next.encode()),
            partial: false,
        }
    }

    /// Marks the page as partial.
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self.next_page_hash = None;
        self
    }

    /// Whether another page follows.
    pub fn has_next(&self) -> bool {
        self.next_page_hash.is_some()
    }
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,
    /// Pagination information.
    pub page_info: PageInfo,
}

impl<T> Page<T> {
    /// Creates a new page with the given items and page info.
    pub fn new(items: Vec<T>, page_info: PageInfo) -> Self {
        Self { items, page_info }
    }

    /// Returns the opaque cursor of the next page.
    pub fn next_page_hash(&self) -> Option<&str> {
        self.page_info.next_page_hash.as_deref()
    }

    /// Returns true if this page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Maps the items to a different type.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page_info: self.page_info,
        }
    }
}
