//! Field paths for nested addressing.
//!
//! Callers address nested fields with dotted names (`address.city`). Fixed-shape
//! array elements are addressed with an index segment, which only the
//! `nestedArrayMatch` operator produces (`items[0].sku`).

use std::fmt;

use crate::error::ValidationError;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// An object member.
    Key(String),
    /// An array element.
    Index(u32),
}

/// A path into a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parses a dotted field name. Empty segments are rejected.
    pub fn parse(dotted: &str) -> Result<Self, ValidationError> {
        let segments = dotted
            .split('.')
            .map(|part| {
                if part.is_empty() {
                    Err(ValidationError::InvalidFieldPath {
                        path: dotted.to_string(),
                    })
                } else {
                    Ok(PathSegment::Key(part.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    /// Creates a single-segment path without splitting on dots.
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Key(name.into())],
        }
    }

    /// Returns the segments of this path.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns the top-level member name.
    pub fn root(&self) -> &str {
        match self.segments.first() {
            Some(PathSegment::Key(name)) => name,
            _ => "",
        }
    }

    /// Returns `true` if the path addresses a top-level member.
    pub fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }

    /// Returns a new path with an array index appended.
    pub fn with_index(&self, index: u32) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    /// Returns a new path with `suffix` appended.
    pub fn join(&self, suffix: &FieldPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(suffix.segments.iter().cloned());
        Self { segments }
    }

    /// Renders the path with dots only, using numeric segments for indexes (`items.0.sku`).
    pub fn to_dotted(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                PathSegment::Key(name) => name.clone(),
                PathSegment::Index(i) => i.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(name) if i == 0 => write!(f, "{}", name)?,
                PathSegment::Key(name) => write!(f, ".{}", name)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted() {
        let path = FieldPath::parse("address.city").unwrap();
        assert_eq!(path.segments().len(), 2);
        assert_eq!(path.root(), "address");
        assert!(!path.is_top_level());
    }

    #[test]
    fn test_parse_rejects_empty_segment() {
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse(".a").is_err());
    }

    #[test]
    fn test_display_with_index() {
        let base = FieldPath::parse("items").unwrap();
        let path = base.with_index(2).join(&FieldPath::parse("sku.code").unwrap());
        assert_eq!(path.to_string(), "items[2].sku.code");
        assert_eq!(path.to_dotted(), "items.2.sku.code");
    }
}
