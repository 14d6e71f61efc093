//! `${dotted.path}` placeholder tokens
//!
//! A template string is scanned into literal text and placeholder tokens.
//! A `$` that is not followed by `{` is plain text, so shell fragments such
//! as `$HOME` pass through untouched.

use std::fmt;
use thiserror::Error;

const OPEN: &str = "${";
const CLOSE: char = '}';

/// Dotted lookup path of a placeholder, e.g. `event.head.sha`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceholderPath(Vec<String>);

impl PlaceholderPath {
    /// Parse the text between `${` and `}`
    pub fn parse(inner: &str) -> Result<Self, PlaceholderError> {
        if inner.is_empty() {
            return Err(PlaceholderError::EmptyPath);
        }

        let mut segments = Vec::new();
        for (index, segment) in inner.split('.').enumerate() {
            if segment.is_empty() {
                return Err(PlaceholderError::EmptySegment {
                    path: inner.to_string(),
                });
            }
            let valid = if index == 0 {
                is_identifier(segment)
            } else {
                is_identifier(segment) || is_index(segment)
            };
            if !valid {
                return Err(PlaceholderError::InvalidSegment {
                    segment: segment.to_string(),
                });
            }
            segments.push(segment.to_string());
        }

        Ok(Self(segments))
    }

    /// Path segments in lookup order
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The token as written in a template
    pub fn token(&self) -> String {
        format!("{OPEN}{self}{CLOSE}")
    }
}

impl fmt::Display for PlaceholderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_index(segment: &str) -> bool {
    segment.bytes().all(|b| b.is_ascii_digit())
}

/// Why a placeholder token is malformed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaceholderError {
    /// `${` with no closing `}`
    #[error("unterminated placeholder `{token}`")]
    Unterminated {
        /// Text from `${` to the end of the string
        token: String,
    },

    /// `${}`
    #[error("empty placeholder `${{}}`")]
    EmptyPath,

    /// `${a..b}` or a trailing dot
    #[error("empty segment in placeholder path `{path}`")]
    EmptySegment {
        /// The whole path
        path: String,
    },

    /// A segment that is neither an identifier nor an index
    #[error("invalid placeholder segment `{segment}`")]
    InvalidSegment {
        /// The offending segment
        segment: String,
    },
}

/// One piece of a scanned template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text copied verbatim
    Literal(&'a str),
    /// A `${...}` token
    Placeholder {
        /// The token exactly as written
        raw: &'a str,
        /// Its parsed path
        path: PlaceholderPath,
    },
}

/// Split a template string into literal and placeholder segments
pub fn scan(input: &str) -> Result<Vec<Segment<'_>>, PlaceholderError> {
    let mut segments = Vec::new();
    let mut rest = input;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            return Err(PlaceholderError::Unterminated {
                token: rest[start..].to_string(),
            });
        };
        let raw = &rest[start..start + OPEN.len() + end + 1];
        let path = PlaceholderPath::parse(&after_open[..end])?;
        segments.push(Segment::Placeholder { raw, path });
        rest = &after_open[end + 1..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }

    Ok(segments)
}

/// Placeholder paths referenced by a template, in order of appearance
pub fn references(input: &str) -> Result<Vec<PlaceholderPath>, PlaceholderError> {
    Ok(scan(input)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder { path, .. } => Some(path),
            Segment::Literal(_) => None,
        })
        .collect())
}

/// Render a template, resolving each placeholder through `resolve`.
///
/// `resolve` returns `Ok(None)` to keep the token verbatim. Resolved values
/// are inserted as-is and never scanned again.
pub fn render<E, F>(input: &str, mut resolve: F) -> Result<String, E>
where
    E: From<PlaceholderError>,
    F: FnMut(&PlaceholderPath, &str) -> Result<Option<String>, E>,
{
    let mut out = String::with_capacity(input.len());
    for segment in scan(input)? {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder { raw, path } => match resolve(&path, raw)? {
                Some(value) => out.push_str(&value),
                None => out.push_str(raw),
            },
        }
    }
    Ok(out)
}
