//! Unified alert feed.
//!
//! Polls the wellness engine, the service-health feed, and the local
//! task-run/technician history, and folds everything into one list cached
//! process-wide for [`ALERTS_CACHE_TTL`]. Every category is independently
//! fault-tolerant: a failing source contributes nothing and never aborts
//! the feed. Alert ids are deterministic composites so clients can
//! deduplicate across regenerations.

use crate::directory::{
    bounded, DirectoryProvider, OpsHistoryProvider, TenantRef, TenantRegistry,
};
use crate::scoring::health::HealthScoreEngine;
use crate::scoring::TtlCache;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const ALERTS_CACHE_TTL: Duration = Duration::from_secs(600);
/// Wellness scores below this threshold raise a warning alert.
pub const LOW_HEALTH_THRESHOLD: u8 = 50;

const FAILED_RUN_LOOKBACK_HOURS: i64 = 24;
const STALE_TECHNICIAN_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    FailedRun,
    StaleTechnicians,
    LowHealth,
    ServiceIncident,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

pub struct AlertGenerator<P, R, H> {
    health: Arc<HealthScoreEngine<P>>,
    provider: Arc<P>,
    registry: Arc<R>,
    history: Arc<H>,
    cache: TtlCache<(), Vec<Alert>>,
    ttl: Duration,
}

impl<P, R, H> AlertGenerator<P, R, H>
where
    P: DirectoryProvider,
    R: TenantRegistry,
    H: OpsHistoryProvider,
{
    pub fn new(
        health: Arc<HealthScoreEngine<P>>,
        provider: Arc<P>,
        registry: Arc<R>,
        history: Arc<H>,
    ) -> Self {
        Self::with_ttl(health, provider, registry, history, ALERTS_CACHE_TTL)
    }

    pub fn with_ttl(
        health: Arc<HealthScoreEngine<P>>,
        provider: Arc<P>,
        registry: Arc<R>,
        history: Arc<H>,
        ttl: Duration,
    ) -> Self {
        Self {
            health,
            provider,
            registry,
            history,
            cache: TtlCache::new(),
            ttl,
        }
    }

    /// Regenerate (or serve from cache) the full alert feed.
    pub async fn generate_alerts(&self) -> Vec<Alert> {
        if let Some(cached) = self.cache.get(&()) {
            return cached;
        }

        let mut alerts = Vec::new();
        self.collect_failed_runs(&mut alerts).await;
        self.collect_stale_technicians(&mut alerts).await;

        match self.registry.list_tenants().await {
            Ok(tenants) => {
                self.collect_low_health(&tenants, &mut alerts).await;
                self.collect_service_incidents(&tenants, &mut alerts).await;
            }
            Err(err) => warn!(%err, "tenant registry unavailable; skipping tenant alerts"),
        }

        self.cache.set((), alerts.clone(), self.ttl);
        alerts
    }

    async fn collect_failed_runs(&self, alerts: &mut Vec<Alert>) {
        let since = Utc::now() - chrono::Duration::hours(FAILED_RUN_LOOKBACK_HOURS);
        match self.history.list_failed_task_runs(since).await {
            Ok(runs) => {
                for run in runs {
                    alerts.push(Alert {
                        id: format!("failed-run-{}", run.id),
                        kind: AlertKind::FailedRun,
                        severity: AlertSeverity::Error,
                        title: format!("Task '{}' failed", run.task_name),
                        description: format!(
                            "{} failed for {} at {}",
                            run.task_name,
                            run.tenant_name,
                            run.finished_at.format("%Y-%m-%d %H:%M UTC")
                        ),
                        tenant_id: run.tenant_id,
                        tenant_name: Some(run.tenant_name),
                        link: Some(format!("/tasks/{}", run.id)),
                    });
                }
            }
            Err(err) => warn!(%err, "task run history unavailable; skipping failed-run alerts"),
        }
    }

    async fn collect_stale_technicians(&self, alerts: &mut Vec<Alert>) {
        match self
            .history
            .list_stale_technicians(STALE_TECHNICIAN_DAYS)
            .await
        {
            Ok(stale) if !stale.is_empty() => {
                let count = stale.len();
                let records = if count == 1 { "record" } else { "records" };
                alerts.push(Alert {
                    id: "stale-technicians".to_string(),
                    kind: AlertKind::StaleTechnicians,
                    severity: AlertSeverity::Info,
                    title: format!("{count} technician {records} out of sync"),
                    description: format!(
                        "{count} technician {records} have not been refreshed in over \
                         {STALE_TECHNICIAN_DAYS} days"
                    ),
                    tenant_id: None,
                    tenant_name: None,
                    link: Some("/technicians".to_string()),
                });
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "technician sync state unavailable; skipping stale alert"),
        }
    }

    async fn collect_low_health(&self, tenants: &[TenantRef], alerts: &mut Vec<Alert>) {
        let scored = join_all(tenants.iter().map(|tenant| async move {
            (tenant, self.health.try_compute_health(tenant.id).await)
        }))
        .await;

        for (tenant, outcome) in scored {
            match outcome {
                Ok(score) if score.score < LOW_HEALTH_THRESHOLD => {
                    alerts.push(Alert {
                        id: format!("low-health-{}", tenant.id),
                        kind: AlertKind::LowHealth,
                        severity: AlertSeverity::Warning,
                        title: format!("{} wellness needs attention", tenant.abbreviation),
                        description: format!(
                            "Wellness score is {} (threshold {LOW_HEALTH_THRESHOLD})",
                            score.score
                        ),
                        tenant_id: Some(tenant.id),
                        tenant_name: Some(tenant.abbreviation.clone()),
                        link: Some(format!("/tenants/{}", tenant.id)),
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(tenant_id = tenant.id, %err, "health unavailable; tenant skipped")
                }
            }
        }
    }

    async fn collect_service_incidents(&self, tenants: &[TenantRef], alerts: &mut Vec<Alert>) {
        let fetched = join_all(tenants.iter().map(|tenant| async move {
            (
                tenant,
                bounded(self.provider.fetch_service_health(tenant.id)).await,
            )
        }))
        .await;

        for (tenant, outcome) in fetched {
            let entries = match outcome {
                Ok(entries) => entries,
                Err(err) => {
                    debug!(tenant_id = tenant.id, %err, "service health unavailable; tenant skipped");
                    continue;
                }
            };

            for entry in entries.iter().filter(|e| !e.status.is_operational()) {
                let interrupted = entry.status.is_interruption();
                alerts.push(Alert {
                    id: format!("service-{}-{}", tenant.id, slug(&entry.service)),
                    kind: AlertKind::ServiceIncident,
                    severity: if interrupted {
                        AlertSeverity::Error
                    } else {
                        AlertSeverity::Warning
                    },
                    title: format!(
                        "{}: {} {}",
                        tenant.abbreviation,
                        entry.service,
                        if interrupted { "interrupted" } else { "degraded" }
                    ),
                    description: format!(
                        "Service health for {} reports {:?} on {}",
                        tenant.abbreviation, entry.status, entry.service
                    ),
                    tenant_id: Some(tenant.id),
                    tenant_name: Some(tenant.abbreviation.clone()),
                    link: Some(format!("/tenants/{}/service-health", tenant.id)),
                });
            }
        }
    }
}

fn slug(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}
