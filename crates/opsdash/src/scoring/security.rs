//! Security posture scoring with point-in-time snapshot history.
//!
//! A fixed battery of weighted compliance checks is evaluated against a
//! tenant's directory signals. Results are cached per tenant for
//! [`SECURITY_CACHE_TTL`] with an explicit invalidation hook;
//! [`SecurityScoreEngine::capture_snapshot`] is the only durable write in
//! the scoring core and the only read path allowed to fail loudly.

use crate::directory::{
    bounded, ConditionalAccessPolicy, DirectoryProvider, DirectoryUser, LicenseSku, ProviderError,
    ServiceHealthEntry,
};
use crate::scoring::TtlCache;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const SECURITY_CACHE_TTL: Duration = Duration::from_secs(1800);
pub const MAX_SECURITY_SCORE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Warning,
}

/// One evaluated unit of the check battery.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityCheck {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub weight: u8,
    pub status: CheckStatus,
    pub score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityScoreResult {
    pub tenant_id: i64,
    pub tenant_abbrv: String,
    pub total_score: u8,
    pub checks: Vec<SecurityCheck>,
}

/// Durable, append-only record of a captured score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySnapshot {
    pub id: i64,
    pub tenant_id: i64,
    pub score: u8,
    pub checks: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Storage seam for snapshot history. Implementations stamp `captured_at`
/// and must keep history ordered ascending by capture time; rows are never
/// mutated after the fact.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn persist(
        &self,
        tenant_id: i64,
        score: u8,
        checks: serde_json::Value,
    ) -> Result<SecuritySnapshot, StoreError>;

    async fn history(
        &self,
        tenant_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SecuritySnapshot>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode check results: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct SecurityScoreEngine<P, S> {
    provider: Arc<P>,
    store: Arc<S>,
    cache: TtlCache<i64, SecurityScoreResult>,
    ttl: Duration,
}

impl<P, S> SecurityScoreEngine<P, S>
where
    P: DirectoryProvider,
    S: SnapshotStore,
{
    pub fn new(provider: Arc<P>, store: Arc<S>) -> Self {
        Self::with_ttl(provider, store, SECURITY_CACHE_TTL)
    }

    pub fn with_ttl(provider: Arc<P>, store: Arc<S>, ttl: Duration) -> Self {
        Self {
            provider,
            store,
            cache: TtlCache::new(),
            ttl,
        }
    }

    /// Evaluate the check battery for a tenant, serving from cache within
    /// the TTL window. Unlike the wellness score this propagates upstream
    /// failures; multi-tenant callers drop failed tenants from their
    /// aggregate instead of rendering them as zero.
    pub async fn compute_security(
        &self,
        tenant_id: i64,
        tenant_abbrv: &str,
    ) -> Result<SecurityScoreResult, SecurityError> {
        if let Some(cached) = self.cache.get(&tenant_id) {
            return Ok(cached);
        }

        let (users, skus, policies, service_health) = tokio::join!(
            bounded(self.provider.fetch_users(tenant_id)),
            bounded(self.provider.fetch_license_skus(tenant_id)),
            bounded(self.provider.fetch_conditional_access_policies(tenant_id)),
            bounded(self.provider.fetch_service_health(tenant_id)),
        );
        let (users, skus, policies, service_health) =
            (users?, skus?, policies?, service_health?);

        let checks = evaluate_battery(&users, &skus, &policies, &service_health);
        let total_score = checks
            .iter()
            .map(|check| u32::from(check.score))
            .sum::<u32>()
            .min(u32::from(MAX_SECURITY_SCORE)) as u8;

        let result = SecurityScoreResult {
            tenant_id,
            tenant_abbrv: tenant_abbrv.to_string(),
            total_score,
            checks,
        };
        self.cache.set(tenant_id, result.clone(), self.ttl);
        Ok(result)
    }

    /// Drop the cached result for a tenant. Idempotent.
    pub fn invalidate(&self, tenant_id: i64) {
        self.cache.invalidate(&tenant_id);
    }

    /// Force a fresh computation and persist it as an immutable snapshot.
    ///
    /// The caller must already be authorized for durable writes; this is the
    /// one operation that fails loudly, since silently recording a zero
    /// score would corrupt the trend history.
    pub async fn capture_snapshot(
        &self,
        tenant_id: i64,
        tenant_abbrv: &str,
    ) -> Result<SecuritySnapshot, SecurityError> {
        self.invalidate(tenant_id);
        let result = self.compute_security(tenant_id, tenant_abbrv).await?;
        let checks = serde_json::to_value(&result.checks)?;
        let snapshot = self
            .store
            .persist(tenant_id, result.total_score, checks)
            .await?;
        Ok(snapshot)
    }

    /// Snapshot history for a tenant, ascending by capture time.
    pub async fn list_snapshots(
        &self,
        tenant_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SecuritySnapshot>, SecurityError> {
        Ok(self.store.history(tenant_id, since).await?)
    }
}

/// Fixed check battery. Weights sum to 100; a pass earns the full weight,
/// a warning half (rounded up), a fail nothing.
fn evaluate_battery(
    users: &[DirectoryUser],
    skus: &[LicenseSku],
    policies: &[ConditionalAccessPolicy],
    service_health: &[ServiceHealthEntry],
) -> Vec<SecurityCheck> {
    let enforced_policies = policies.iter().filter(|p| p.is_enforced()).count();

    vec![
        build_check(
            "ca-policy-present",
            "Conditional access baseline",
            "At least one enforced conditional-access policy protects sign-ins",
            "identity",
            25,
            if enforced_policies >= 1 {
                (CheckStatus::Pass, None)
            } else {
                (
                    CheckStatus::Fail,
                    Some("No enforced conditional-access policies found".to_string()),
                )
            },
        ),
        build_check(
            "ca-policy-coverage",
            "Conditional access coverage",
            "Multiple enforced policies cover distinct sign-in risks",
            "identity",
            20,
            match enforced_policies {
                0 => (CheckStatus::Fail, None),
                1 | 2 => (
                    CheckStatus::Warning,
                    Some(format!("Only {enforced_policies} enforced policy/policies")),
                ),
                _ => (CheckStatus::Pass, None),
            },
        ),
        build_check(
            "account-hygiene",
            "Disabled account hygiene",
            "Disabled accounts are cleaned up rather than left in the directory",
            "identity",
            15,
            account_hygiene(users),
        ),
        build_check(
            "license-utilization",
            "License utilization",
            "Purchased seats are actually assigned to users",
            "licensing",
            15,
            license_utilization(skus),
        ),
        build_check(
            "seat-overassignment",
            "Seat overassignment",
            "No subscription reports more consumed than purchased seats",
            "licensing",
            10,
            seat_overassignment(skus),
        ),
        build_check(
            "service-health",
            "Service incident exposure",
            "Microsoft 365 workloads for this tenant are operational",
            "operations",
            15,
            service_exposure(service_health),
        ),
    ]
}

fn build_check(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: &'static str,
    weight: u8,
    outcome: (CheckStatus, Option<String>),
) -> SecurityCheck {
    let (status, details) = outcome;
    let score = match status {
        CheckStatus::Pass => weight,
        CheckStatus::Warning => weight.div_ceil(2),
        CheckStatus::Fail => 0,
    };
    SecurityCheck {
        id,
        name,
        description,
        category,
        weight,
        status,
        score,
        details,
    }
}

fn account_hygiene(users: &[DirectoryUser]) -> (CheckStatus, Option<String>) {
    if users.is_empty() {
        return (CheckStatus::Pass, None);
    }
    let disabled = users.iter().filter(|user| !user.account_enabled).count();
    let share = disabled as f64 / users.len() as f64;
    let details = Some(format!("{disabled} of {} accounts disabled", users.len()));
    if share <= 0.20 {
        (CheckStatus::Pass, details)
    } else if share <= 0.40 {
        (CheckStatus::Warning, details)
    } else {
        (CheckStatus::Fail, details)
    }
}

fn license_utilization(skus: &[LicenseSku]) -> (CheckStatus, Option<String>) {
    if skus.is_empty() {
        return (
            CheckStatus::Warning,
            Some("No subscriptions visible for this tenant".to_string()),
        );
    }
    let average: f64 = skus
        .iter()
        .map(|sku| {
            let enabled = sku.enabled_seats.max(1) as f64;
            (sku.consumed_seats as f64 / enabled).min(1.0)
        })
        .sum::<f64>()
        / skus.len() as f64;
    let details = Some(format!("Average utilization {:.0}%", average * 100.0));
    if average >= 0.75 {
        (CheckStatus::Pass, details)
    } else if average >= 0.50 {
        (CheckStatus::Warning, details)
    } else {
        (CheckStatus::Fail, details)
    }
}

fn seat_overassignment(skus: &[LicenseSku]) -> (CheckStatus, Option<String>) {
    let offenders: Vec<&str> = skus
        .iter()
        .filter(|sku| sku.consumed_seats > sku.enabled_seats)
        .map(|sku| sku.sku_part_number.as_str())
        .collect();
    if offenders.is_empty() {
        (CheckStatus::Pass, None)
    } else {
        (
            CheckStatus::Fail,
            Some(format!("Overassigned SKUs: {}", offenders.join(", "))),
        )
    }
}

fn service_exposure(entries: &[ServiceHealthEntry]) -> (CheckStatus, Option<String>) {
    let degraded: Vec<&str> = entries
        .iter()
        .filter(|entry| !entry.status.is_operational())
        .map(|entry| entry.service.as_str())
        .collect();
    if degraded.is_empty() {
        return (CheckStatus::Pass, None);
    }
    let details = Some(format!("Affected services: {}", degraded.join(", ")));
    if entries.iter().any(|entry| entry.status.is_interruption()) {
        (CheckStatus::Fail, details)
    } else {
        (CheckStatus::Warning, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{PolicyState, ServiceStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDirectory {
        users: Vec<DirectoryUser>,
        skus: Vec<LicenseSku>,
        policies: Vec<ConditionalAccessPolicy>,
        service_health: Vec<ServiceHealthEntry>,
        fail: bool,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl DirectoryProvider for FakeDirectory {
        async fn fetch_users(&self, _tenant_id: i64) -> Result<Vec<DirectoryUser>, ProviderError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Unavailable("directory offline".into()));
            }
            Ok(self.users.clone())
        }

        async fn fetch_license_skus(
            &self,
            _tenant_id: i64,
        ) -> Result<Vec<LicenseSku>, ProviderError> {
            Ok(self.skus.clone())
        }

        async fn fetch_conditional_access_policies(
            &self,
            _tenant_id: i64,
        ) -> Result<Vec<ConditionalAccessPolicy>, ProviderError> {
            Ok(self.policies.clone())
        }

        async fn fetch_service_health(
            &self,
            _tenant_id: i64,
        ) -> Result<Vec<ServiceHealthEntry>, ProviderError> {
            Ok(self.service_health.clone())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<SecuritySnapshot>>,
        sequence: AtomicI64,
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn persist(
            &self,
            tenant_id: i64,
            score: u8,
            checks: serde_json::Value,
        ) -> Result<SecuritySnapshot, StoreError> {
            let snapshot = SecuritySnapshot {
                id: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
                tenant_id,
                score,
                checks,
                captured_at: Utc::now(),
            };
            let mut rows = self.rows.lock().expect("store mutex poisoned");
            rows.push(snapshot.clone());
            Ok(snapshot)
        }

        async fn history(
            &self,
            tenant_id: i64,
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<SecuritySnapshot>, StoreError> {
            let rows = self.rows.lock().expect("store mutex poisoned");
            let mut matching: Vec<SecuritySnapshot> = rows
                .iter()
                .filter(|row| row.tenant_id == tenant_id)
                .filter(|row| since.map(|cutoff| row.captured_at >= cutoff).unwrap_or(true))
                .cloned()
                .collect();
            matching.sort_by_key(|row| row.captured_at);
            Ok(matching)
        }
    }

    fn healthy_directory() -> FakeDirectory {
        FakeDirectory {
            users: vec![
                DirectoryUser {
                    id: "a".into(),
                    account_enabled: true,
                },
                DirectoryUser {
                    id: "b".into(),
                    account_enabled: true,
                },
            ],
            skus: vec![LicenseSku {
                sku_part_number: "ENTERPRISEPACK".into(),
                enabled_seats: 10,
                consumed_seats: 9,
            }],
            policies: (0..3)
                .map(|n| ConditionalAccessPolicy {
                    display_name: format!("policy {n}"),
                    state: PolicyState::Enabled,
                })
                .collect(),
            service_health: vec![ServiceHealthEntry {
                service: "Exchange Online".into(),
                status: ServiceStatus::ServiceOperational,
            }],
            ..FakeDirectory::default()
        }
    }

    #[tokio::test]
    async fn fully_compliant_tenant_scores_the_maximum() {
        let engine = SecurityScoreEngine::new(
            Arc::new(healthy_directory()),
            Arc::new(MemoryStore::default()),
        );

        let result = engine
            .compute_security(1, "contoso")
            .await
            .expect("signals available");
        assert_eq!(result.total_score, MAX_SECURITY_SCORE);
        assert_eq!(result.checks.len(), 6);
        assert!(result
            .checks
            .iter()
            .all(|check| check.status == CheckStatus::Pass));
    }

    #[tokio::test]
    async fn total_score_matches_weighted_check_scores() {
        let mut directory = healthy_directory();
        directory.policies.truncate(1);
        directory.service_health.push(ServiceHealthEntry {
            service: "Teams".into(),
            status: ServiceStatus::ServiceDegradation,
        });
        let engine =
            SecurityScoreEngine::new(Arc::new(directory), Arc::new(MemoryStore::default()));

        let result = engine
            .compute_security(1, "contoso")
            .await
            .expect("signals available");
        let sum: u32 = result.checks.iter().map(|c| u32::from(c.score)).sum();
        assert_eq!(u32::from(result.total_score), sum);
        // coverage warning: 20 -> 10; service warning: 15 -> 8
        assert_eq!(result.total_score, 83);
    }

    #[tokio::test]
    async fn overassigned_seats_fail_their_check() {
        let mut directory = healthy_directory();
        directory.skus.push(LicenseSku {
            sku_part_number: "EMS".into(),
            enabled_seats: 5,
            consumed_seats: 8,
        });
        let engine =
            SecurityScoreEngine::new(Arc::new(directory), Arc::new(MemoryStore::default()));

        let result = engine
            .compute_security(1, "contoso")
            .await
            .expect("signals available");
        let check = result
            .checks
            .iter()
            .find(|check| check.id == "seat-overassignment")
            .expect("check present");
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.details.as_deref().unwrap_or("").contains("EMS"));
    }

    #[tokio::test]
    async fn invalidate_forces_a_recomputation() {
        let provider = Arc::new(healthy_directory());
        let engine =
            SecurityScoreEngine::new(provider.clone(), Arc::new(MemoryStore::default()));

        engine.compute_security(1, "contoso").await.expect("first");
        engine.compute_security(1, "contoso").await.expect("cached");
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);

        engine.invalidate(1);
        engine.compute_security(1, "contoso").await.expect("fresh");
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capture_snapshot_appends_immutable_history() {
        let store = Arc::new(MemoryStore::default());
        let engine = SecurityScoreEngine::new(Arc::new(healthy_directory()), store.clone());

        let first = engine
            .capture_snapshot(1, "contoso")
            .await
            .expect("capture succeeds");
        let second = engine
            .capture_snapshot(1, "contoso")
            .await
            .expect("capture succeeds");
        assert!(second.captured_at >= first.captured_at);
        assert_ne!(first.id, second.id);

        let history = engine
            .list_snapshots(1, None)
            .await
            .expect("history readable");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[0].score, first.score);
        assert!(history.windows(2).all(|w| w[0].captured_at <= w[1].captured_at));
    }

    #[tokio::test]
    async fn capture_snapshot_propagates_upstream_failure() {
        let store = Arc::new(MemoryStore::default());
        let directory = FakeDirectory {
            fail: true,
            ..FakeDirectory::default()
        };
        let engine = SecurityScoreEngine::new(Arc::new(directory), store.clone());

        let err = engine
            .capture_snapshot(1, "contoso")
            .await
            .expect_err("capture must fail loudly");
        assert!(matches!(err, SecurityError::Provider(_)));
        // no partial write
        assert!(store.rows.lock().expect("store mutex poisoned").is_empty());
    }
}
