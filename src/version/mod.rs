//! Version layer for container image tags
//!
//! Turns raw registry tags into semver versions, filters them through a
//! range constraint and picks the next version an image may move to.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Registry  │────▶│   Storer    │◀────│   Checker   │
//! │ (list tags) │     │ (ttl cache) │     │ (next ver.) │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                       │
//!        ▼                                       ▼
//! ┌─────────────┐                         ┌─────────────┐
//! │  Registries │                         │ Constraint  │
//! │   (docker)  │                         │ (ranges)    │
//! └─────────────┘                         └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: SQLite-based key/value store with per-entry expiry
//! - [`checker`]: Next-version selection and staleness
//! - [`constraint`]: Range constraint grammar and matching
//! - [`evaluation`]: Evaluation records and their builder
//! - [`registry`]: Registry trait for listing tags
//! - [`registries`]: Concrete registry implementations
//! - [`storer`]: Storage trait used by the server
//! - [`error`]: Error types for versions, cache and registry operations
//! - [`semver`]: Tag parsing and pre-release helpers

pub mod cache;
pub mod checker;
pub mod constraint;
pub mod error;
pub mod evaluation;
pub mod registries;
pub mod registry;
pub mod semver;
pub mod storer;
