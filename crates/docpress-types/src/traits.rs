//! Core traits for docpress collaborators
//!
//! This module defines the seams between the pipeline and the outside world:
//! where sessions come from, where plans are looked up, and where usage is
//! written.

use crate::{PlanRecord, Result, UsageRecord, UsageSummary};
use async_trait::async_trait;

/// Resolves a session token to an authenticated user id
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Look up the user behind a token.
    ///
    /// Unknown or expired tokens resolve to `None`, never to an error.
    async fn resolve(&self, token: &str) -> Option<String>;
}

/// Source of plan records
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Fetch the plan record of a user, `None` if the user has no plan
    async fn lookup(&self, user_id: &str) -> Result<Option<PlanRecord>>;
}

/// Append-only sink for usage records
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Append a record
    async fn insert(&self, record: UsageRecord) -> Result<()>;

    /// Most recent records of a user, newest first
    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<UsageRecord>>;

    /// Aggregate usage of a user
    async fn summary(&self, user_id: &str) -> Result<UsageSummary>;
}
