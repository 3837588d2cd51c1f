//! # boxpub
//!
//! Publishes a packaged Vagrant box to a box registry in one pass.
//!
//! A run performs a fixed sequence against the registry API:
//!
//! 1. ensure the box exists
//! 2. ensure the version exists
//! 3. ensure the provider exists
//! 4. look up the single-use upload target
//! 5. upload the artifact
//! 6. release the version
//!
//! The three "ensure" steps and the release treat HTTP 422 as "already
//! there", so a run can be repeated safely after a partial failure. The
//! upload step is governed by [`types::UploadPolicy`]: under the default
//! `tolerant` policy an upload failure is reported and the version is still
//! released.
//!
//! ## Example
//!
//! ```ignore
//! use boxpub::{auth, publisher::Publisher, types};
//!
//! let credential = auth::load_credential(&auth::default_token_path()?)?;
//! let request = types::PublishRequest::new("ubuntu-test", "1.0.0");
//! let publisher = Publisher::new(request, types::PublishOptions::default(), &credential)?;
//! let receipt = publisher.run(&mut reporter)?;
//! ```
//!
//! ## Modules
//!
//! - [`auth`] — Credential file loading
//! - [`config`] — Configuration file (`.boxpub.toml`) loading and merging
//! - [`error`] — Error taxonomy for a publish run
//! - [`publisher`] — The six-step publish workflow
//! - [`types`] — Domain types: request, options, steps, receipt

/// Credential file loading (`.token` next to the executable by default).
pub mod auth;

/// Configuration file (`.boxpub.toml`) loading and merging.
pub mod config;

/// Error taxonomy for a publish run.
pub mod error;

/// The six-step publish workflow and the `Reporter` trait.
pub mod publisher;

/// Domain types: request, options, steps, receipt.
pub mod types;

/// Registry API client.
/// Re-exported from the boxpub-registry microcrate.
pub use boxpub_registry as registry;
