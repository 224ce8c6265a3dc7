//! The built-in icon served when a project has none.

pub const CONTENT_TYPE: &str = "image/svg+xml";

pub const FAVICON_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 32 32"><rect width="32" height="32" rx="6" fill="#1f2937"/><path d="M9 10h14M9 16h10M9 22h14" stroke="#fbbf24" stroke-width="3" stroke-linecap="round"/></svg>
"##;

/// Strong validator of [`FAVICON_SVG`].
#[must_use]
pub fn etag() -> String {
    esmserve_core::pipeline::headers::content_etag(FAVICON_SVG.as_bytes())
}
