#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Engine of the esmserve no-bundle development server.
//!
//! Application source and third-party packages are served as native ES
//! modules. Package code is materialized lazily into chunks under a package
//! mount; everything produced is cached until a file it depends on changes.

pub mod bundler;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod router;
pub mod sync;
pub mod transform;
pub mod watch;

pub use bundler::{
    BundleError, BundleOutput, BundleRequest, Bundler, PackageBundler, PackageDescriptor,
    PackageRegistry, PassthroughBundler,
};
pub use cache::{CacheStats, Resource, ResourceCache};
pub use config::{Config, LinkStrategy};
pub use context::DevContext;
pub use error::{Error, Result};
pub use pipeline::PipelineOrchestrator;
pub use resolver::ModuleResolver;
pub use router::{Method, PathRouter, ResolvedRoute};
pub use sync::{ByAddress, Dedup, Memoize};
pub use transform::{
    ContentCategory, EsmTransformer, SpecifierResolver, TransformError, TransformOutput,
    TransformRequest, Transformer,
};
pub use watch::{FileEvent, FileEventKind, FileWatcher, ManualWatcher};
