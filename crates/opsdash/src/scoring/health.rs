//! Per-tenant wellness scoring.
//!
//! A single 0–100 score built from three weighted sub-scores: user-account
//! hygiene (0–40), license utilization (0–30), and conditional-access
//! coverage (0–30). Results are cached per tenant for
//! [`HEALTH_CACHE_TTL`]; a tenant whose signals cannot be fetched reads as
//! zero rather than failing the caller.

use crate::directory::{
    bounded, ConditionalAccessPolicy, DirectoryProvider, DirectoryUser, LicenseSku, ProviderError,
};
use crate::scoring::TtlCache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const HEALTH_CACHE_TTL: Duration = Duration::from_secs(3600);

const USERS_BAND: f64 = 40.0;
const LICENSES_BAND: f64 = 30.0;
const POLICIES_BAND: u8 = 30;
const POINTS_PER_POLICY: u8 = 10;
/// Midpoint of the license band, used when a tenant has no visible
/// subscriptions: "unknown", not "bad".
const UNKNOWN_LICENSES_SUBSCORE: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthBreakdown {
    pub users: u8,
    pub licenses: u8,
    pub policies: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthScore {
    pub score: u8,
    pub breakdown: HealthBreakdown,
}

impl HealthScore {
    /// Fail-safe value for a tenant that could not be evaluated. Reads as
    /// "needs attention" on the dashboard instead of breaking the page.
    pub const fn zero() -> Self {
        Self {
            score: 0,
            breakdown: HealthBreakdown {
                users: 0,
                licenses: 0,
                policies: 0,
            },
        }
    }
}

pub struct HealthScoreEngine<P> {
    provider: Arc<P>,
    cache: TtlCache<i64, HealthScore>,
    ttl: Duration,
}

impl<P> HealthScoreEngine<P>
where
    P: DirectoryProvider,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self::with_ttl(provider, HEALTH_CACHE_TTL)
    }

    pub fn with_ttl(provider: Arc<P>, ttl: Duration) -> Self {
        Self {
            provider,
            cache: TtlCache::new(),
            ttl,
        }
    }

    /// Compute (or serve from cache) the wellness score for a tenant.
    ///
    /// Never fails: any upstream error degrades to [`HealthScore::zero`].
    pub async fn compute_health(&self, tenant_id: i64) -> HealthScore {
        match self.try_compute_health(tenant_id).await {
            Ok(score) => score,
            Err(err) => {
                warn!(tenant_id, %err, "health signals unavailable; reporting zero score");
                HealthScore::zero()
            }
        }
    }

    /// Fallible form used by callers that must distinguish "upstream failed"
    /// from a genuinely zero score (the alert feed skips failed tenants
    /// instead of flagging them).
    ///
    /// A failed computation is never cached, so a transient outage cannot
    /// pin a zero score for a full TTL window.
    pub async fn try_compute_health(&self, tenant_id: i64) -> Result<HealthScore, ProviderError> {
        if let Some(cached) = self.cache.get(&tenant_id) {
            return Ok(cached);
        }

        let (users, skus, policies) = tokio::join!(
            bounded(self.provider.fetch_users(tenant_id)),
            bounded(self.provider.fetch_license_skus(tenant_id)),
            bounded(self.provider.fetch_conditional_access_policies(tenant_id)),
        );
        let (users, skus, policies) = (users?, skus?, policies?);

        let score = score_signals(&users, &skus, &policies);
        self.cache.set(tenant_id, score, self.ttl);
        Ok(score)
    }
}

fn score_signals(
    users: &[DirectoryUser],
    skus: &[LicenseSku],
    policies: &[ConditionalAccessPolicy],
) -> HealthScore {
    let breakdown = HealthBreakdown {
        users: users_subscore(users),
        licenses: licenses_subscore(skus),
        policies: policies_subscore(policies),
    };
    HealthScore {
        score: breakdown.users + breakdown.licenses + breakdown.policies,
        breakdown,
    }
}

fn users_subscore(users: &[DirectoryUser]) -> u8 {
    // An empty directory has nothing unhealthy in it and scores the full
    // band. Documented upstream behavior, kept as-is.
    if users.is_empty() {
        return USERS_BAND as u8;
    }
    let enabled = users.iter().filter(|user| user.account_enabled).count() as f64;
    (enabled / users.len() as f64 * USERS_BAND).round() as u8
}

fn licenses_subscore(skus: &[LicenseSku]) -> u8 {
    if skus.is_empty() {
        return UNKNOWN_LICENSES_SUBSCORE;
    }
    let total_utilization: f64 = skus
        .iter()
        .map(|sku| {
            let enabled = sku.enabled_seats.max(1) as f64;
            (sku.consumed_seats as f64 / enabled).min(1.0)
        })
        .sum();
    (total_utilization / skus.len() as f64 * LICENSES_BAND).round() as u8
}

fn policies_subscore(policies: &[ConditionalAccessPolicy]) -> u8 {
    let enforced = policies.iter().filter(|p| p.is_enforced()).count();
    let enforced = u8::try_from(enforced).unwrap_or(u8::MAX);
    enforced.saturating_mul(POINTS_PER_POLICY).min(POLICIES_BAND)
}
