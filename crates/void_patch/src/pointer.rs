//! Document paths
//!
//! A [`DocPath`] is a parsed pointer (`/Entities/Entity_[1]/Name`). Segments
//! are stored unescaped; `~1` and `~0` are only used in the text form.

use crate::error::{PatchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A path into a document, stored as unescaped segments
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath {
    segments: Vec<String>,
}

impl DocPath {
    /// The empty path, addressing the whole document
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse pointer text. The empty string is the root.
    pub fn parse(pointer: &str) -> Result<Self> {
        if pointer.is_empty() {
            return Ok(Self::root());
        }
        let rest = pointer
            .strip_prefix('/')
            .ok_or_else(|| PatchError::InvalidPointer(pointer.to_string()))?;

        let mut segments = Vec::new();
        for raw in rest.split('/') {
            segments.push(unescape(raw).ok_or_else(|| PatchError::InvalidPointer(pointer.to_string()))?);
        }
        Ok(Self { segments })
    }

    /// Build a path from unescaped segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.segments.pop()
    }

    /// Return a copy with one more segment
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    /// Return `self` followed by every segment of `other`
    pub fn concat(&self, other: &DocPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Segment-wise prefix test
    pub fn starts_with(&self, prefix: &DocPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments.iter().zip(&prefix.segments).all(|(a, b)| a == b)
    }

    /// Remove `prefix` from the front, if present
    pub fn strip_prefix(&self, prefix: &DocPath) -> Option<DocPath> {
        if self.starts_with(prefix) {
            Some(Self::from_segments(self.segments[prefix.segments.len()..].iter().cloned()))
        } else {
            None
        }
    }

    /// Split into parent path and final segment
    pub fn split_last(&self) -> Option<(DocPath, &str)> {
        let (last, parent) = self.segments.split_last()?;
        Some((Self::from_segments(parent.iter().cloned()), last.as_str()))
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Look up the value this path addresses
    pub fn resolve<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut current = doc;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(parse_index(segment)?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Mutable lookup of the value this path addresses
    pub fn resolve_mut<'a>(&self, doc: &'a mut Value) -> Option<&'a mut Value> {
        let mut current = doc;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get_mut(segment)?,
                Value::Array(items) => items.get_mut(parse_index(segment)?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Parse an array index segment. Leading zeros are rejected.
pub(crate) fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", escape(segment))?;
        }
        Ok(())
    }
}

impl FromStr for DocPath {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DocPath {
    type Error = PatchError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.to_string()
    }
}
