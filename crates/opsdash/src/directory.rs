//! Domain types and collaborator seams for the managed-tenant directory.
//!
//! The scoring engines never reach the Microsoft Graph or RMM APIs
//! themselves; they consume the traits below. The HTTP service wires in
//! concrete providers, tests wire in counting fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Upper bound on any single upstream fetch. A collaborator that hangs past
/// this is treated exactly like one that failed.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A managed tenant as known to the local registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRef {
    pub id: i64,
    pub abbreviation: String,
}

/// Subset of directory user fields the scoring core consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    pub account_enabled: bool,
}

/// Per-tenant license subscription with purchased vs. assigned seat counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSku {
    pub sku_part_number: String,
    pub enabled_seats: u32,
    pub consumed_seats: u32,
}

/// Enforcement state of a conditional-access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyState {
    #[serde(rename = "enabled")]
    Enabled,
    #[serde(rename = "disabled")]
    Disabled,
    #[serde(rename = "enabledForReportingButNotEnforced")]
    ReportOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalAccessPolicy {
    pub display_name: String,
    pub state: PolicyState,
}

impl ConditionalAccessPolicy {
    /// Report-only policies audit but do not protect.
    pub fn is_enforced(&self) -> bool {
        self.state == PolicyState::Enabled
    }
}

/// Workload status as reported by the service-health feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceStatus {
    ServiceOperational,
    ServiceRestored,
    ServiceDegradation,
    ServiceInterruption,
    ExtendedRecovery,
    InvestigationRequired,
}

impl ServiceStatus {
    pub fn is_operational(self) -> bool {
        matches!(self, Self::ServiceOperational | Self::ServiceRestored)
    }

    pub fn is_interruption(self) -> bool {
        self == Self::ServiceInterruption
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealthEntry {
    pub service: String,
    pub status: ServiceStatus,
}

/// A failed scheduled-task execution, surfaced in the alert feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunSummary {
    pub id: i64,
    pub task_name: String,
    pub tenant_id: Option<i64>,
    pub tenant_name: String,
    pub finished_at: DateTime<Utc>,
}

/// A technician record with its last directory sync time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicianSummary {
    pub id: i64,
    pub display_name: String,
    pub last_synced_at: DateTime<Utc>,
}

/// Error raised by any upstream collaborator fetch.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("upstream request timed out after {0:?}")]
    Timeout(Duration),
}

/// Read-only window onto a tenant's directory state.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    async fn fetch_users(&self, tenant_id: i64) -> Result<Vec<DirectoryUser>, ProviderError>;

    async fn fetch_license_skus(&self, tenant_id: i64) -> Result<Vec<LicenseSku>, ProviderError>;

    async fn fetch_conditional_access_policies(
        &self,
        tenant_id: i64,
    ) -> Result<Vec<ConditionalAccessPolicy>, ProviderError>;

    async fn fetch_service_health(
        &self,
        tenant_id: i64,
    ) -> Result<Vec<ServiceHealthEntry>, ProviderError>;
}

/// Registry of tenants managed by this deployment.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    async fn list_tenants(&self) -> Result<Vec<TenantRef>, ProviderError>;
}

/// Local operational history: scheduled-task runs and technician sync state.
#[async_trait]
pub trait OpsHistoryProvider: Send + Sync {
    async fn list_failed_task_runs(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<TaskRunSummary>, ProviderError>;

    async fn list_stale_technicians(
        &self,
        older_than_days: i64,
    ) -> Result<Vec<TechnicianSummary>, ProviderError>;
}

/// Caps an upstream fetch at [`FETCH_TIMEOUT`] so one wedged dependency
/// cannot stall an entire fan-out.
pub async fn bounded<T, F>(fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(FETCH_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(FETCH_TIMEOUT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_only_policies_are_not_enforced() {
        let policy = ConditionalAccessPolicy {
            display_name: "Require MFA".to_string(),
            state: PolicyState::ReportOnly,
        };
        assert!(!policy.is_enforced());
    }

    #[test]
    fn policy_state_uses_graph_wire_names() {
        let parsed: PolicyState =
            serde_json::from_str("\"enabledForReportingButNotEnforced\"").expect("known state");
        assert_eq!(parsed, PolicyState::ReportOnly);
    }

    #[test]
    fn restored_services_count_as_operational() {
        assert!(ServiceStatus::ServiceRestored.is_operational());
        assert!(!ServiceStatus::ServiceDegradation.is_operational());
        assert!(ServiceStatus::ServiceInterruption.is_interruption());
    }

    #[tokio::test]
    async fn bounded_passes_through_quick_results() {
        let result: Result<u32, ProviderError> = bounded(async { Ok(7) }).await;
        assert_eq!(result.expect("quick future resolves"), 7);
    }
}
