//! In-memory collaborator implementations and the wired-up engine set.
//!
//! The real deployment fronts Microsoft Graph and the RMM API; this service
//! ships static providers seeded with a believable demo fleet so the scoring
//! surface can be exercised end to end without external credentials.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use opsdash::config::CacheConfig;
use opsdash::directory::{
    ConditionalAccessPolicy, DirectoryProvider, DirectoryUser, LicenseSku, OpsHistoryProvider,
    PolicyState, ProviderError, ServiceHealthEntry, ServiceStatus, TaskRunSummary,
    TechnicianSummary, TenantRef, TenantRegistry,
};
use opsdash::scoring::alerts::AlertGenerator;
use opsdash::scoring::health::HealthScoreEngine;
use opsdash::scoring::licensing::LicenseOptimizationEngine;
use opsdash::scoring::security::{
    SecurityScoreEngine, SecuritySnapshot, SnapshotStore, StoreError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Directory signals for one seeded tenant.
#[derive(Default)]
pub(crate) struct TenantSeed {
    pub(crate) users: Vec<DirectoryUser>,
    pub(crate) skus: Vec<LicenseSku>,
    pub(crate) policies: Vec<ConditionalAccessPolicy>,
    pub(crate) service_health: Vec<ServiceHealthEntry>,
}

/// Static stand-in for the Graph directory client. Tenants missing from the
/// seed map behave like unreachable tenants.
pub(crate) struct StaticDirectoryProvider {
    seeds: HashMap<i64, TenantSeed>,
}

impl StaticDirectoryProvider {
    fn seed(&self, tenant_id: i64) -> Result<&TenantSeed, ProviderError> {
        self.seeds
            .get(&tenant_id)
            .ok_or_else(|| ProviderError::Unavailable(format!("tenant {tenant_id} unreachable")))
    }
}

#[async_trait]
impl DirectoryProvider for StaticDirectoryProvider {
    async fn fetch_users(&self, tenant_id: i64) -> Result<Vec<DirectoryUser>, ProviderError> {
        Ok(self.seed(tenant_id)?.users.clone())
    }

    async fn fetch_license_skus(&self, tenant_id: i64) -> Result<Vec<LicenseSku>, ProviderError> {
        Ok(self.seed(tenant_id)?.skus.clone())
    }

    async fn fetch_conditional_access_policies(
        &self,
        tenant_id: i64,
    ) -> Result<Vec<ConditionalAccessPolicy>, ProviderError> {
        Ok(self.seed(tenant_id)?.policies.clone())
    }

    async fn fetch_service_health(
        &self,
        tenant_id: i64,
    ) -> Result<Vec<ServiceHealthEntry>, ProviderError> {
        Ok(self.seed(tenant_id)?.service_health.clone())
    }
}

pub(crate) struct StaticTenantRegistry {
    tenants: Vec<TenantRef>,
}

#[async_trait]
impl TenantRegistry for StaticTenantRegistry {
    async fn list_tenants(&self) -> Result<Vec<TenantRef>, ProviderError> {
        Ok(self.tenants.clone())
    }
}

pub(crate) struct InMemoryOpsHistory {
    failed_runs: Vec<TaskRunSummary>,
    technicians: Vec<TechnicianSummary>,
}

#[async_trait]
impl OpsHistoryProvider for InMemoryOpsHistory {
    async fn list_failed_task_runs(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TaskRunSummary>, ProviderError> {
        Ok(self
            .failed_runs
            .iter()
            .filter(|run| run.finished_at >= since)
            .cloned()
            .collect())
    }

    async fn list_stale_technicians(
        &self,
        older_than_days: i64,
    ) -> Result<Vec<TechnicianSummary>, ProviderError> {
        let cutoff = Utc::now() - ChronoDuration::days(older_than_days);
        Ok(self
            .technicians
            .iter()
            .filter(|tech| tech.last_synced_at < cutoff)
            .cloned()
            .collect())
    }
}

/// Append-only snapshot store backed by a Vec. Rows are stamped on insert
/// and never touched afterwards.
#[derive(Default)]
pub(crate) struct InMemorySnapshotStore {
    rows: Mutex<Vec<SecuritySnapshot>>,
    sequence: AtomicI64,
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
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
        let mut rows = self.rows.lock().expect("snapshot mutex poisoned");
        rows.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn history(
        &self,
        tenant_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SecuritySnapshot>, StoreError> {
        let rows = self.rows.lock().expect("snapshot mutex poisoned");
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

/// The fully wired scoring core, shared across route handlers.
pub(crate) struct Engines {
    pub(crate) registry: Arc<StaticTenantRegistry>,
    pub(crate) health: Arc<HealthScoreEngine<StaticDirectoryProvider>>,
    pub(crate) security:
        Arc<SecurityScoreEngine<StaticDirectoryProvider, InMemorySnapshotStore>>,
    pub(crate) licensing: Arc<LicenseOptimizationEngine<StaticDirectoryProvider>>,
    pub(crate) alerts:
        Arc<AlertGenerator<StaticDirectoryProvider, StaticTenantRegistry, InMemoryOpsHistory>>,
}

pub(crate) fn demo_engines(cache: &CacheConfig) -> Engines {
    let provider = Arc::new(demo_directory());
    let registry = Arc::new(StaticTenantRegistry {
        tenants: demo_tenants(),
    });
    let history = Arc::new(demo_history());
    let store = Arc::new(InMemorySnapshotStore::default());

    let health = Arc::new(HealthScoreEngine::with_ttl(
        provider.clone(),
        cache.health_ttl(),
    ));
    let security = Arc::new(SecurityScoreEngine::with_ttl(
        provider.clone(),
        store,
        cache.security_ttl(),
    ));
    let licensing = Arc::new(LicenseOptimizationEngine::new(provider.clone()));
    let alerts = Arc::new(AlertGenerator::with_ttl(
        health.clone(),
        provider,
        registry.clone(),
        history,
        cache.alerts_ttl(),
    ));

    Engines {
        registry,
        health,
        security,
        licensing,
        alerts,
    }
}

fn demo_tenants() -> Vec<TenantRef> {
    vec![
        TenantRef {
            id: 1,
            abbreviation: "contoso".to_string(),
        },
        TenantRef {
            id: 2,
            abbreviation: "fabrikam".to_string(),
        },
        TenantRef {
            id: 3,
            abbreviation: "northwind".to_string(),
        },
    ]
}

fn demo_directory() -> StaticDirectoryProvider {
    let mut seeds = HashMap::new();

    // well-run tenant: high utilization, layered policies, quiet services
    seeds.insert(
        1,
        TenantSeed {
            users: seed_users(46, 4),
            skus: vec![
                seed_sku("ENTERPRISEPACK", 50, 47),
                seed_sku("EMS", 50, 45),
                seed_sku("ATP_ENTERPRISE", 50, 50),
            ],
            policies: vec![
                seed_policy("Require MFA for all users", PolicyState::Enabled),
                seed_policy("Block legacy authentication", PolicyState::Enabled),
                seed_policy("Require compliant devices", PolicyState::Enabled),
            ],
            service_health: vec![
                seed_service("Exchange Online", ServiceStatus::ServiceOperational),
                seed_service("Microsoft Teams", ServiceStatus::ServiceOperational),
                seed_service("SharePoint Online", ServiceStatus::ServiceOperational),
            ],
        },
    );

    // struggling tenant: heavy overbuy, report-only policies, Teams incident
    seeds.insert(
        2,
        TenantSeed {
            users: seed_users(12, 18),
            skus: vec![
                seed_sku("ENTERPRISEPACK", 100, 40),
                seed_sku("POWER_BI_PRO", 25, 6),
            ],
            policies: vec![
                seed_policy("Require MFA for admins", PolicyState::ReportOnly),
                seed_policy("Legacy auth audit", PolicyState::Disabled),
            ],
            service_health: vec![
                seed_service("Exchange Online", ServiceStatus::ServiceOperational),
                seed_service("Microsoft Teams", ServiceStatus::ServiceInterruption),
            ],
        },
    );

    // small tenant: modest setup, one degraded workload
    seeds.insert(
        3,
        TenantSeed {
            users: seed_users(9, 1),
            skus: vec![seed_sku("SPB", 12, 9)],
            policies: vec![seed_policy(
                "Require MFA for all users",
                PolicyState::Enabled,
            )],
            service_health: vec![
                seed_service("Exchange Online", ServiceStatus::ServiceDegradation),
                seed_service("SharePoint Online", ServiceStatus::ServiceOperational),
            ],
        },
    );

    StaticDirectoryProvider { seeds }
}

fn demo_history() -> InMemoryOpsHistory {
    InMemoryOpsHistory {
        failed_runs: vec![TaskRunSummary {
            id: 1041,
            task_name: "Nightly mailbox permission sync".to_string(),
            tenant_id: Some(2),
            tenant_name: "fabrikam".to_string(),
            finished_at: Utc::now() - ChronoDuration::hours(3),
        }],
        technicians: vec![
            TechnicianSummary {
                id: 7,
                display_name: "Dana Rivers".to_string(),
                last_synced_at: Utc::now() - ChronoDuration::days(12),
            },
            TechnicianSummary {
                id: 9,
                display_name: "Kim Ashton".to_string(),
                last_synced_at: Utc::now() - ChronoDuration::hours(6),
            },
        ],
    }
}

fn seed_users(enabled: usize, disabled: usize) -> Vec<DirectoryUser> {
    (0..enabled)
        .map(|n| DirectoryUser {
            id: format!("user-{n:03}"),
            account_enabled: true,
        })
        .chain((0..disabled).map(|n| DirectoryUser {
            id: format!("user-x{n:03}"),
            account_enabled: false,
        }))
        .collect()
}

fn seed_sku(part: &str, enabled: u32, consumed: u32) -> LicenseSku {
    LicenseSku {
        sku_part_number: part.to_string(),
        enabled_seats: enabled,
        consumed_seats: consumed,
    }
}

fn seed_policy(name: &str, state: PolicyState) -> ConditionalAccessPolicy {
    ConditionalAccessPolicy {
        display_name: name.to_string(),
        state,
    }
}

fn seed_service(name: &str, status: ServiceStatus) -> ServiceHealthEntry {
    ServiceHealthEntry {
        service: name.to_string(),
        status,
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn deserialize_optional_date<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|value| parse_date(&value).map_err(serde::de::Error::custom))
        .transpose()
}
