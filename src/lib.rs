//! Asset Cache - a deduplicating two-tier cache for remote image assets.
//!
//! This crate provides an image manager that collapses concurrent requests for
//! the same URL into one download operation, backed by a cost-bounded memory
//! tier and an age-pruned disk tier.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the image manager and download operations.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing storage, network and configuration adapters.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "asset-cache";
