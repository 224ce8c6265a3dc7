//! Response header assembly.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LinkStrategy;

/// Package chunks never change under a given URL until reset.
pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Project source must be revalidated on every load.
pub const REVALIDATE: &str = "no-cache";

/// Size and modification time of one input file.
#[derive(Debug, Clone, Copy)]
pub struct FileStamp<'a> {
    pub path: &'a Path,
    pub size: u64,
    pub modified: SystemTime,
}

impl FileStamp<'_> {
    fn nanos(&self) -> u128 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    }
}

/// Facts about a produced resource that determine its headers.
#[derive(Debug)]
pub struct HeaderFacts<'a> {
    /// The file the URL maps to.
    pub source: FileStamp<'a>,
    /// Other files the transformer folded into the body.
    pub dependencies: &'a [FileStamp<'a>],
    pub content_type: &'a str,
    pub content_length: usize,
    pub transformed: bool,
    pub mount: bool,
    pub imports: &'a [String],
    pub strategy: LinkStrategy,
}

#[must_use]
pub fn build(facts: &HeaderFacts<'_>) -> BTreeMap<String, String> {
    let mut stamps = Vec::with_capacity(facts.dependencies.len() + 1);
    stamps.push(facts.source);
    stamps.extend_from_slice(facts.dependencies);
    let last_modified = stamps
        .iter()
        .map(|s| s.modified)
        .max()
        .unwrap_or(facts.source.modified);

    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), facts.content_type.to_string());
    headers.insert("content-length".to_string(), facts.content_length.to_string());
    headers.insert("last-modified".to_string(), http_date(last_modified));
    headers.insert("etag".to_string(), etag(&stamps, facts.transformed));
    headers.insert(
        "cache-control".to_string(),
        if facts.mount { IMMUTABLE } else { REVALIDATE }.to_string(),
    );
    if let Some(link) = link_header(facts.imports, facts.strategy) {
        headers.insert("link".to_string(), link);
    }
    headers
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
#[must_use]
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Validator derived from the path, size and modification time of every
/// input file.
///
/// Weak when the body is a transform of the files rather than their bytes.
#[must_use]
pub fn etag(stamps: &[FileStamp<'_>], weak: bool) -> String {
    let mut fields: Vec<Vec<u8>> = Vec::with_capacity(stamps.len() * 3);
    for stamp in stamps {
        fields.push(stamp.path.as_os_str().as_encoded_bytes().to_vec());
        fields.push(stamp.size.to_le_bytes().to_vec());
        fields.push(stamp.nanos().to_le_bytes().to_vec());
    }
    let fields: Vec<&[u8]> = fields.iter().map(Vec::as_slice).collect();
    let token = esmserve_util::hash::short_token(&fields, 20);
    if weak {
        format!("W/\"{token}\"")
    } else {
        format!("\"{token}\"")
    }
}

/// Strong validator of an in-memory body.
#[must_use]
pub fn content_etag(content: &[u8]) -> String {
    format!("\"{}\"", esmserve_util::hash::short_token(&[content], 20))
}

/// One `link` value listing every same-origin import.
#[must_use]
pub fn link_header(imports: &[String], strategy: LinkStrategy) -> Option<String> {
    let rel = match strategy {
        LinkStrategy::Push => "rel=preload; as=script",
        LinkStrategy::Preload => "rel=modulepreload",
        LinkStrategy::None => return None,
    };

    let links: Vec<String> = imports
        .iter()
        .filter(|url| url.starts_with('/'))
        .map(|url| format!("<{url}>; {rel}"))
        .collect();
    if links.is_empty() {
        None
    } else {
        Some(links.join(", "))
    }
}

/// Whether an `if-none-match` value matches `etag` (weak comparison).
#[must_use]
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let bare = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    let etag = bare(etag);
    if_none_match
        .split(',')
        .any(|candidate| candidate.trim() == "*" || bare(candidate) == etag)
}
