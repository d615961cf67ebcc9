//! Dotted key-path utilities.
//!
//! This crate implements helper functions for dotted key paths of the form
//! `"user.address.city"` or `"emails.0"`, as used to address values inside
//! nested JSON documents.
//!
//! # Example
//!
//! ```
//! use dot_path::{parse, format, get_str, PathStep};
//!
//! // Parse a dotted path into steps
//! let path = parse("user.emails.0");
//! assert_eq!(
//!     path,
//!     vec![
//!         PathStep::Key("user".to_string()),
//!         PathStep::Key("emails".to_string()),
//!         PathStep::Index(0),
//!     ]
//! );
//!
//! // Format steps back into a dotted path
//! assert_eq!(format(&path), "user.emails.0");
//!
//! // Resolve a value inside a document
//! let doc = serde_json::json!({"user": {"emails": ["a@x.com"]}});
//! assert_eq!(get_str(&doc, "user.emails.0"), Some(&serde_json::json!("a@x.com")));
//! ```

use serde_json::Value;
use thiserror::Error;

/// One segment of a dotted key path.
///
/// All-digit segments (without a redundant leading zero) are array indices,
/// everything else is an object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl PathStep {
    /// The segment as it appears in a dotted path string.
    pub fn as_segment(&self) -> String {
        match self {
            PathStep::Key(key) => key.clone(),
            PathStep::Index(idx) => idx.to_string(),
        }
    }
}

impl std::fmt::Display for PathStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathStep::Key(key) => f.write_str(key),
            PathStep::Index(idx) => write!(f, "{}", idx),
        }
    }
}

/// A parsed dotted path.
pub type Path = Vec<PathStep>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path has no parent")]
    NoParent,
    #[error("invalid array index")]
    InvalidIndex,
}

/// Check if a string represents a valid non-negative array index.
///
/// Leading zeros are rejected so that `"01"` stays an object key and
/// `parse`/`format` round-trip.
///
/// # Example
///
/// ```
/// use dot_path::is_valid_index;
///
/// assert!(is_valid_index("0"));
/// assert!(is_valid_index("123"));
/// assert!(!is_valid_index("01"));
/// assert!(!is_valid_index("-1"));
/// assert!(!is_valid_index("abc"));
/// ```
pub fn is_valid_index(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    let bytes = segment.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    bytes.iter().all(|b| b.is_ascii_digit())
}

/// Parse a dotted path string into steps.
///
/// The empty string parses to the empty (root) path. Segments that look like
/// array indices become [`PathStep::Index`], everything else [`PathStep::Key`].
///
/// # Example
///
/// ```
/// use dot_path::{parse, PathStep};
///
/// assert_eq!(parse(""), Vec::<PathStep>::new());
/// assert_eq!(parse("name"), vec![PathStep::Key("name".to_string())]);
/// assert_eq!(
///     parse("emails.1"),
///     vec![PathStep::Key("emails".to_string()), PathStep::Index(1)]
/// );
/// ```
pub fn parse(path: &str) -> Path {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('.')
        .map(|segment| {
            if is_valid_index(segment) {
                // Index segments are bounded well below usize::MAX in practice;
                // anything unparseable stays a key.
                match segment.parse::<usize>() {
                    Ok(idx) => PathStep::Index(idx),
                    Err(_) => PathStep::Key(segment.to_string()),
                }
            } else {
                PathStep::Key(segment.to_string())
            }
        })
        .collect()
}

/// Format path steps into a dotted path string.
///
/// Returns an empty string for the root path. Inverse of [`parse`] for paths
/// whose keys contain no `.`.
///
/// # Example
///
/// ```
/// use dot_path::{format, PathStep};
///
/// assert_eq!(format(&[]), "");
/// assert_eq!(
///     format(&[PathStep::Key("emails".to_string()), PathStep::Index(0)]),
///     "emails.0"
/// );
/// ```
pub fn format(path: &[PathStep]) -> String {
    let mut out = String::new();
    for (i, step) in path.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(&step.as_segment());
    }
    out
}

/// Join a parent path and a child segment with a dot.
///
/// An empty parent yields the bare segment.
///
/// # Example
///
/// ```
/// use dot_path::join;
///
/// assert_eq!(join("", "name"), "name");
/// assert_eq!(join("user", "name"), "user.name");
/// ```
pub fn join(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        return segment.to_string();
    }
    let mut out = String::with_capacity(parent.len() + segment.len() + 1);
    out.push_str(parent);
    out.push('.');
    out.push_str(segment);
    out
}

/// Split off the first segment of a dotted path.
///
/// # Example
///
/// ```
/// use dot_path::split_first;
///
/// assert_eq!(split_first("user.name"), ("user", Some("name")));
/// assert_eq!(split_first("user"), ("user", None));
/// ```
pub fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

/// Split off the last segment of a dotted path.
///
/// # Example
///
/// ```
/// use dot_path::split_last;
///
/// assert_eq!(split_last("user.address.city"), (Some("user.address"), "city"));
/// assert_eq!(split_last("name"), (None, "name"));
/// ```
pub fn split_last(path: &str) -> (Option<&str>, &str) {
    match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    }
}

/// Get the parent of a path.
///
/// # Errors
///
/// Returns an error for the root path.
///
/// # Example
///
/// ```
/// use dot_path::{parse, parent, PathStep};
///
/// let path = parse("user.name");
/// assert_eq!(parent(&path).unwrap(), &[PathStep::Key("user".to_string())][..]);
/// assert!(parent(&[]).is_err());
/// ```
pub fn parent(path: &[PathStep]) -> Result<&[PathStep], PathError> {
    if path.is_empty() {
        return Err(PathError::NoParent);
    }
    Ok(&path[..path.len() - 1])
}

/// Check if `path` starts with all of `prefix`'s steps.
///
/// Every path starts with the root path. A path does not start with itself's
/// strict extensions.
///
/// # Example
///
/// ```
/// use dot_path::{parse, starts_with};
///
/// assert!(starts_with(&parse("user.name"), &parse("user")));
/// assert!(starts_with(&parse("user.name"), &parse("user.name")));
/// assert!(!starts_with(&parse("user"), &parse("user.name")));
/// ```
pub fn starts_with(path: &[PathStep], prefix: &[PathStep]) -> bool {
    if prefix.len() > path.len() {
        return false;
    }
    path[..prefix.len()] == prefix[..]
}

/// Resolve a value inside a document by path.
///
/// Descent is tolerant: missing intermediate levels, out-of-range indices,
/// and type mismatches all yield `None`, never an error.
///
/// # Example
///
/// ```
/// use dot_path::{get, parse};
/// use serde_json::json;
///
/// let doc = json!({"user": {"name": "Ivan"}});
/// assert_eq!(get(&doc, &parse("user.name")), Some(&json!("Ivan")));
/// assert_eq!(get(&doc, &parse("user.missing.deeper")), None);
/// assert_eq!(get(&doc, &parse("user.name.0")), None);
/// ```
pub fn get<'a>(doc: &'a Value, path: &[PathStep]) -> Option<&'a Value> {
    let mut current = doc;
    for step in path {
        current = match (step, current) {
            (PathStep::Key(key), Value::Object(map)) => map.get(key)?,
            (PathStep::Index(idx), Value::Array(arr)) => arr.get(*idx)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable variant of [`get`].
pub fn get_mut<'a>(doc: &'a mut Value, path: &[PathStep]) -> Option<&'a mut Value> {
    let mut current = doc;
    for step in path {
        current = match (step, current) {
            (PathStep::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (PathStep::Index(idx), Value::Array(arr)) => arr.get_mut(*idx)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a value by dotted path string. Convenience over [`parse`] + [`get`].
pub fn get_str<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    get(doc, &parse(path))
}

/// Mutable variant of [`get_str`].
pub fn get_mut_str<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    get_mut(doc, &parse(path))
}
