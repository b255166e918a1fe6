//! Book and chapter types.
//!
//! Books are imported with their chapters already summarized; the engine only
//! ever reads them. Chapters are keyed by `(book_id, chapter_number)` where the
//! chapter number is a dotted, sortable string such as `1.2.` or `-1.3.`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dotted chapter key (`1.`, `1.2.`, `-1.1.`).
///
/// Stored in canonical form: whitespace trimmed, empty segments removed and a
/// single trailing dot, so `"1.2"` and `" 1.2. "` name the same chapter.
///
/// Ordering compares segment by segment: numerically when both segments are
/// integers, lexically otherwise, with numbers before words. A negative first
/// segment marks back matter (appendices) which sorts after every regular
/// chapter. Keys that compare equal segment-wise (`01.` and `1.`) are
/// ordered by their text so the order stays consistent with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChapterNumber(String);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment<'a> {
    Number(i64),
    Word(&'a str),
}

impl ChapterNumber {
    /// Parse and canonicalize a chapter number.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let segments: Vec<&str> = raw
            .trim()
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            return Err(format!("invalid chapter number: '{raw}'"));
        }
        if segments.iter().any(|s| s.chars().any(char::is_whitespace)) {
            return Err(format!("invalid chapter number: '{raw}'"));
        }

        let mut canonical = segments.join(".");
        canonical.push('.');
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this chapter belongs to the back matter (leading negative segment).
    pub fn is_appendix(&self) -> bool {
        matches!(self.segments().first(), Some(Segment::Number(n)) if *n < 0)
    }

    /// Nesting depth: `1.` is 1, `1.2.` is 2.
    pub fn depth(&self) -> usize {
        self.0.trim_end_matches('.').split('.').count()
    }

    fn segments(&self) -> Vec<Segment<'_>> {
        self.0
            .trim_end_matches('.')
            .split('.')
            .map(|s| match s.parse::<i64>() {
                Ok(n) => Segment::Number(n),
                Err(_) => Segment::Word(s),
            })
            .collect()
    }
}

impl Ord for ChapterNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.is_appendix()
            .cmp(&other.is_appendix())
            .then_with(|| self.segments().cmp(&other.segments()))
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ChapterNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChapterNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChapterNumber {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChapterNumber> for String {
    fn from(value: ChapterNumber) -> Self {
        value.0
    }
}

/// An imported book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    /// Where the source archive lived when it was imported.
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One chapter of a book, summarized at import time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub book_id: i64,
    pub chapter_number: ChapterNumber,
    pub name: String,
    pub summary: String,
    pub key_points: Vec<String>,
}

/// Pre-summarized book handed over by the import collaborator.
///
/// Deserialized from a TOML manifest by the CLI; the engine never parses the
/// source archive itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookImport {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "chapter")]
    pub chapters: Vec<ChapterImport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterImport {
    pub chapter_number: ChapterNumber,
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}
