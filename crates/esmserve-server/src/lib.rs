#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

//! HTTP surface of the esmserve dev server.
//!
//! Requests are dispatched through the core [`PathRouter`] to a small set of
//! built-in endpoints backed by the resource pipeline. File changes reach
//! the resource cache through a notify watcher and a single event loop.
//!
//! [`PathRouter`]: esmserve_core::PathRouter

pub mod app;
pub mod error;
pub mod icon;
pub mod routes;
pub mod server;
pub mod watcher;

pub use app::{build_app, AppState};
pub use error::{ServerError, ServerResult};
pub use routes::{builtin_routes, Endpoint, Filter};
pub use server::Server;
pub use watcher::{spawn_event_loop, NotifyWatcher};
