use crate::error::{Error, Result};

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches exactly this text.
    Literal(String),
    /// `:name` binds one path segment.
    Param(String),
    /// `**` binds the rest of the path; terminal only.
    Wildcard,
}

/// Parse a pattern like `/users/:id/**` into segments.
///
/// Empty segments are ignored, so `/` is the empty pattern and trailing
/// slashes carry no meaning.
pub fn parse(pattern: &str) -> Result<Vec<Segment>> {
    let invalid = |reason: &str| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let raw: Vec<&str> = split_path(pattern).collect();
    let mut segments = Vec::with_capacity(raw.len());

    for (i, part) in raw.iter().enumerate() {
        let segment = if *part == "**" {
            if i + 1 != raw.len() {
                return Err(invalid("`**` must be the last segment"));
            }
            Segment::Wildcard
        } else if let Some(name) = part.strip_prefix(':') {
            if name.is_empty() {
                return Err(invalid("parameter segment needs a name"));
            }
            Segment::Param(name.to_string())
        } else {
            Segment::Literal((*part).to_string())
        };
        segments.push(segment);
    }

    Ok(segments)
}

/// Non-empty `/`-separated parts of a path.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
