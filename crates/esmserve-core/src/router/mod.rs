//! Method + path router.
//!
//! Routes are stored in a segment tree. Each level prefers a literal child,
//! then a `:param` child, then a terminal `**` wildcard, backtracking into
//! the next alternative whenever a whole branch fails to produce a handler.
//! Global before/after filters are attached to patterns and fire for every
//! dispatched path their pattern matches.

mod method;
mod pattern;
mod tree;

pub use method::Method;
pub use pattern::Segment;
pub use tree::{PathRouter, ResolvedRoute};
