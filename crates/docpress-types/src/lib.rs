//! Core type system and error handling for docpress
//!
//! This crate provides the foundational types, error handling, and collaborator
//! traits shared by the docpress crates. It includes:
//!
//! - **Error handling**: A single error taxonomy with kinds, severities and hints
//! - **Core types**: Requests, entitlement decisions, results and usage records
//! - **Lifecycle**: Request states and their legal transitions
//! - **Traits**: Async seams for sessions, plans and usage storage
//!
//! # Features
//!
//! - `serde` (default): Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use docpress_types::{CompressionRequest, QualityTier, Result};
//!
//! fn example_request() -> Result<CompressionRequest> {
//!     let tier: QualityTier = "printer".parse()?;
//!     let request = CompressionRequest::new(&b"%PDF-1.7"[..]).with_tier(tier);
//!     request.validate("application/pdf", true)?;
//!     Ok(request)
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod result;
pub mod state;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{Error, ErrorKind, ErrorSeverity, ENGINE_INSTALL_HINT};
pub use result::Result;
pub use state::{RequestState, StateTrail};
pub use traits::*;
pub use types::*;
