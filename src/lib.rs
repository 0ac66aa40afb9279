//! Filter query compiler and entity search for a live game map.
//!
//! A request carries the caller's permissions, a bounding box and a nested
//! filter tree. [`compile`] reduces the tree to the dimensions that differ
//! from the [`schema::StandardFilter`] and turns them into SQL (or a remote
//! payload), [`exec`] runs it, [`ranking`] checks league ranks and [`merge`]
//! joins the stat and ranking results. [`service::EntityService`] drives the
//! whole pipeline; [`server`] exposes it over HTTP.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod areas;
pub mod backup;
pub mod compile;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod masterfile;
pub mod merge;
pub mod model;
pub mod ranking;
pub mod schema;
pub mod server;
pub mod service;
pub mod snapshot;

pub use error::{QueryError, Result};
