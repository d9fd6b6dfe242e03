//! docpress integration testing support
//!
//! This crate holds the cross-crate integration tests for docpress and the
//! utilities they share: fake engine executables, PDF payloads, multipart
//! request building and failing collaborator stores.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
pub mod test_utils;
