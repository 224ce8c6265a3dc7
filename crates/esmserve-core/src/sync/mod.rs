//! Concurrency primitives shared by the resolver, bundler and pipeline.
//!
//! - [`Memoize`]: a single-slot cache that recomputes only when its driving
//!   arguments change.
//! - [`Dedup`]: coalesces concurrent async calls sharing a key onto one
//!   in-flight task.

mod dedup;
mod memoize;

pub use dedup::Dedup;
pub use memoize::{ByAddress, Memoize};
