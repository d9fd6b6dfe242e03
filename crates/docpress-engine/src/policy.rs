//! Identity resolution, entitlement evaluation and admission gates

use docpress_config::PolicyConfig;
use docpress_types::{
    CallerIdentity, CompressionRequest, EntitlementDecision, EntitlementStore, Error, FileSize,
    QualityTier, ResolvedIdentity, Result,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides what a caller may do and rejects requests before any work starts
#[derive(Clone)]
pub struct PolicyEvaluator {
    store: Arc<dyn EntitlementStore>,
    free_max_bytes: FileSize,
    premium_max_bytes: FileSize,
    premium_tiers: BTreeSet<QualityTier>,
}

impl std::fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEvaluator")
            .field("free_max_bytes", &self.free_max_bytes)
            .field("premium_max_bytes", &self.premium_max_bytes)
            .field("premium_tiers", &self.premium_tiers)
            .finish_non_exhaustive()
    }
}

impl PolicyEvaluator {
    /// Create an evaluator backed by `store`
    pub fn new(store: Arc<dyn EntitlementStore>, config: &PolicyConfig) -> Self {
        Self {
            store,
            free_max_bytes: config.free_max_bytes,
            premium_max_bytes: config.premium_max_bytes,
            premium_tiers: config.premium_tiers.iter().copied().collect(),
        }
    }

    /// Resolve identity: session first, then the client hint, then anonymous.
    ///
    /// Blank values count as absent.
    pub fn resolve_identity(caller: &CallerIdentity) -> ResolvedIdentity {
        let present = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        if let Some(user) = present(&caller.session) {
            ResolvedIdentity::Authenticated(user)
        } else if let Some(user) = present(&caller.hint) {
            ResolvedIdentity::ClientAsserted(user)
        } else {
            ResolvedIdentity::Anonymous
        }
    }

    /// Most restrictive decision
    pub fn free_decision(&self) -> EntitlementDecision {
        EntitlementDecision {
            is_premium: false,
            max_allowed_bytes: self.free_max_bytes,
            allowed_quality_tiers: QualityTier::ALL
                .into_iter()
                .filter(|tier| !self.premium_tiers.contains(tier))
                .collect(),
            lookup_failed: false,
        }
    }

    /// Decision for premium callers
    pub fn premium_decision(&self) -> EntitlementDecision {
        EntitlementDecision {
            is_premium: true,
            max_allowed_bytes: self.premium_max_bytes,
            allowed_quality_tiers: QualityTier::ALL.into_iter().collect(),
            lookup_failed: false,
        }
    }

    /// Compute the entitlement of a resolved identity.
    ///
    /// No record means free. A failed lookup also means free, flagged with
    /// `lookup_failed`; it never grants premium.
    pub async fn evaluate(&self, identity: &ResolvedIdentity) -> EntitlementDecision {
        let Some(user_id) = identity.user_id() else {
            return self.free_decision();
        };

        match self.store.lookup(user_id).await {
            Ok(Some(plan)) if plan.is_premium() => {
                debug!("User {} ({}) has premium plan", user_id, identity.label());
                self.premium_decision()
            }
            Ok(_) => self.free_decision(),
            Err(e) => {
                warn!(
                    "Entitlement lookup failed for user {}, applying free tier: {}",
                    user_id, e
                );
                EntitlementDecision {
                    lookup_failed: true,
                    ..self.free_decision()
                }
            }
        }
    }

    /// Apply the size gate, then the tier gate
    pub fn gate(decision: &EntitlementDecision, request: &CompressionRequest) -> Result<()> {
        let actual = request.size();
        if actual >= decision.max_allowed_bytes {
            return Err(Error::PayloadTooLarge {
                limit: decision.max_allowed_bytes,
                actual,
                premium: decision.is_premium,
            });
        }

        if !decision.allows(request.quality_tier) {
            return Err(Error::FeatureNotEntitled {
                tier: request.quality_tier,
            });
        }

        Ok(())
    }
}
