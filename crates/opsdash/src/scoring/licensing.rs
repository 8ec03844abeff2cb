//! Cross-tenant license waste analysis.
//!
//! Joins every tenant's seat counts against the SKU catalog to produce a
//! ranked recommendation report. Always computed live: the analysis is
//! cross-tenant and rarely invoked, so caching buys nothing.

use crate::catalog;
use crate::directory::{bounded, DirectoryProvider, TenantRef};
use futures::future::join_all;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::warn;

/// Utilization at or above this share of purchased seats needs no action.
pub const OPTIMIZED_MIN_UTILIZATION_PCT: u8 = 80;
/// Utilization at or above this share warrants a review; below it the SKU
/// is classified as wasteful.
pub const REVIEW_MIN_UTILIZATION_PCT: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseSeverity {
    Optimized,
    Review,
    Wasteful,
}

#[derive(Debug, Clone, Serialize)]
pub struct LicenseRecommendation {
    pub tenant_abbrv: String,
    pub tenant_id: i64,
    pub sku_part_number: String,
    pub friendly_name: String,
    pub total_enabled: u32,
    pub total_consumed: u32,
    pub unused_count: u32,
    pub utilization_pct: u8,
    pub estimated_waste_per_month: f64,
    pub severity: LicenseSeverity,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationSummary {
    pub recommendations: Vec<LicenseRecommendation>,
    pub total_estimated_waste: f64,
    pub analyzed_tenants: usize,
    pub analyzed_skus: usize,
}

pub struct LicenseOptimizationEngine<P> {
    provider: Arc<P>,
}

impl<P> LicenseOptimizationEngine<P>
where
    P: DirectoryProvider,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Analyze seat utilization across the given tenants.
    ///
    /// Tenant fetches fan out concurrently and join all-settled: a tenant
    /// whose subscription data cannot be fetched is dropped from the
    /// aggregate without disturbing the others.
    pub async fn analyze(&self, tenants: &[TenantRef]) -> OptimizationSummary {
        let fetches = tenants.iter().map(|tenant| async move {
            bounded(self.provider.fetch_license_skus(tenant.id))
                .await
                .map(|skus| (tenant, skus))
        });
        let settled = join_all(fetches).await;

        let mut recommendations = Vec::new();
        let mut analyzed_tenants = 0;
        let mut analyzed_skus = 0;

        for outcome in settled {
            let (tenant, skus) = match outcome {
                Ok(fetched) => fetched,
                Err(err) => {
                    warn!(%err, "skipping tenant in license analysis");
                    continue;
                }
            };
            analyzed_tenants += 1;

            for sku in skus.iter().filter(|sku| sku.enabled_seats > 0) {
                analyzed_skus += 1;
                if sku.consumed_seats > sku.enabled_seats {
                    warn!(
                        tenant_id = tenant.id,
                        sku = %sku.sku_part_number,
                        enabled = sku.enabled_seats,
                        consumed = sku.consumed_seats,
                        "consumed seats exceed enabled seats; clamping unused count to zero"
                    );
                }
                recommendations.push(recommend(tenant, sku));
            }
        }

        recommendations.sort_by(|a, b| {
            b.estimated_waste_per_month
                .partial_cmp(&a.estimated_waste_per_month)
                .unwrap_or(Ordering::Equal)
        });
        let total_estimated_waste = recommendations
            .iter()
            .map(|rec| rec.estimated_waste_per_month)
            .sum();

        OptimizationSummary {
            recommendations,
            total_estimated_waste,
            analyzed_tenants,
            analyzed_skus,
        }
    }
}

fn recommend(tenant: &TenantRef, sku: &crate::directory::LicenseSku) -> LicenseRecommendation {
    let unused_count = sku.enabled_seats.saturating_sub(sku.consumed_seats);
    let utilization_pct = ((sku.consumed_seats as f64 / sku.enabled_seats as f64) * 100.0)
        .round()
        .min(100.0) as u8;
    let estimated_waste_per_month =
        f64::from(unused_count) * catalog::monthly_price(&sku.sku_part_number);
    let severity = classify(utilization_pct);

    LicenseRecommendation {
        tenant_abbrv: tenant.abbreviation.clone(),
        tenant_id: tenant.id,
        sku_part_number: sku.sku_part_number.clone(),
        friendly_name: catalog::friendly_name(&sku.sku_part_number),
        total_enabled: sku.enabled_seats,
        total_consumed: sku.consumed_seats,
        unused_count,
        utilization_pct,
        estimated_waste_per_month,
        severity,
        recommendation: recommendation_text(severity, unused_count),
    }
}

fn classify(utilization_pct: u8) -> LicenseSeverity {
    if utilization_pct >= OPTIMIZED_MIN_UTILIZATION_PCT {
        LicenseSeverity::Optimized
    } else if utilization_pct >= REVIEW_MIN_UTILIZATION_PCT {
        LicenseSeverity::Review
    } else {
        LicenseSeverity::Wasteful
    }
}

fn recommendation_text(severity: LicenseSeverity, unused_count: u32) -> String {
    let seats = if unused_count == 1 { "seat" } else { "seats" };
    match severity {
        LicenseSeverity::Optimized => "Utilization is healthy; no action needed".to_string(),
        LicenseSeverity::Review => {
            format!("Review assignments; {unused_count} {seats} currently unused")
        }
        LicenseSeverity::Wasteful => {
            format!("Consider reclaiming {unused_count} unused {seats}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{
        ConditionalAccessPolicy, DirectoryUser, LicenseSku, ProviderError, ServiceHealthEntry,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeFleet {
        skus_by_tenant: HashMap<i64, Vec<LicenseSku>>,
        failing_tenants: Vec<i64>,
    }

    #[async_trait]
    impl DirectoryProvider for FakeFleet {
        async fn fetch_users(&self, _tenant_id: i64) -> Result<Vec<DirectoryUser>, ProviderError> {
            Ok(Vec::new())
        }

        async fn fetch_license_skus(
            &self,
            tenant_id: i64,
        ) -> Result<Vec<LicenseSku>, ProviderError> {
            if self.failing_tenants.contains(&tenant_id) {
                return Err(ProviderError::Unavailable("tenant unreachable".into()));
            }
            Ok(self.skus_by_tenant.get(&tenant_id).cloned().unwrap_or_default())
        }

        async fn fetch_conditional_access_policies(
            &self,
            _tenant_id: i64,
        ) -> Result<Vec<ConditionalAccessPolicy>, ProviderError> {
            Ok(Vec::new())
        }

        async fn fetch_service_health(
            &self,
            _tenant_id: i64,
        ) -> Result<Vec<ServiceHealthEntry>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn tenant(id: i64, abbrv: &str) -> TenantRef {
        TenantRef {
            id,
            abbreviation: abbrv.to_string(),
        }
    }

    fn sku(part: &str, enabled: u32, consumed: u32) -> LicenseSku {
        LicenseSku {
            sku_part_number: part.to_string(),
            enabled_seats: enabled,
            consumed_seats: consumed,
        }
    }

    #[tokio::test]
    async fn wasteful_sku_matches_the_documented_scenario() {
        let engine = LicenseOptimizationEngine::new(Arc::new(FakeFleet {
            skus_by_tenant: HashMap::from([(1, vec![sku("ENTERPRISEPACK", 100, 40)])]),
            failing_tenants: Vec::new(),
        }));

        let summary = engine.analyze(&[tenant(1, "contoso")]).await;
        assert_eq!(summary.recommendations.len(), 1);
        let rec = &summary.recommendations[0];
        assert_eq!(rec.unused_count, 60);
        assert_eq!(rec.utilization_pct, 40);
        assert_eq!(rec.severity, LicenseSeverity::Wasteful);
        assert_eq!(rec.estimated_waste_per_month, 2160.0);
        assert_eq!(rec.friendly_name, "Office 365 E3");
        assert_eq!(summary.total_estimated_waste, 2160.0);
    }

    #[tokio::test]
    async fn severity_thresholds_are_inclusive() {
        let engine = LicenseOptimizationEngine::new(Arc::new(FakeFleet {
            skus_by_tenant: HashMap::from([(
                1,
                vec![
                    sku("SPE_E3", 100, 80),
                    sku("SPB", 100, 50),
                    sku("EMS", 100, 49),
                ],
            )]),
            failing_tenants: Vec::new(),
        }));

        let summary = engine.analyze(&[tenant(1, "contoso")]).await;
        let severity_of = |part: &str| {
            summary
                .recommendations
                .iter()
                .find(|rec| rec.sku_part_number == part)
                .expect("sku analyzed")
                .severity
        };
        assert_eq!(severity_of("SPE_E3"), LicenseSeverity::Optimized);
        assert_eq!(severity_of("SPB"), LicenseSeverity::Review);
        assert_eq!(severity_of("EMS"), LicenseSeverity::Wasteful);
    }

    #[tokio::test]
    async fn failed_tenants_are_dropped_without_affecting_others() {
        let engine = LicenseOptimizationEngine::new(Arc::new(FakeFleet {
            skus_by_tenant: HashMap::from([
                (1, vec![sku("ENTERPRISEPACK", 10, 5)]),
                (3, vec![sku("EMS", 20, 20)]),
            ]),
            failing_tenants: vec![2],
        }));

        let summary = engine
            .analyze(&[tenant(1, "contoso"), tenant(2, "fabrikam"), tenant(3, "northwind")])
            .await;
        assert_eq!(summary.analyzed_tenants, 2);
        assert_eq!(summary.analyzed_skus, 2);
        // 5 unused E3 seats at 36/seat; EMS fully consumed
        assert_eq!(summary.total_estimated_waste, 180.0);
    }

    #[tokio::test]
    async fn zero_seat_skus_are_ignored_and_output_is_ranked() {
        let engine = LicenseOptimizationEngine::new(Arc::new(FakeFleet {
            skus_by_tenant: HashMap::from([(
                1,
                vec![
                    sku("FLOW_FREE", 0, 0),
                    sku("EMS", 100, 10),
                    sku("ENTERPRISEPACK", 100, 10),
                ],
            )]),
            failing_tenants: Vec::new(),
        }));

        let summary = engine.analyze(&[tenant(1, "contoso")]).await;
        assert_eq!(summary.analyzed_skus, 2);
        // highest monthly waste leads
        assert_eq!(summary.recommendations[0].sku_part_number, "ENTERPRISEPACK");
        assert!(
            summary.recommendations[0].estimated_waste_per_month
                >= summary.recommendations[1].estimated_waste_per_month
        );
    }

    #[tokio::test]
    async fn overassigned_seats_clamp_unused_to_zero() {
        let engine = LicenseOptimizationEngine::new(Arc::new(FakeFleet {
            skus_by_tenant: HashMap::from([(1, vec![sku("ENTERPRISEPACK", 10, 14)])]),
            failing_tenants: Vec::new(),
        }));

        let summary = engine.analyze(&[tenant(1, "contoso")]).await;
        let rec = &summary.recommendations[0];
        assert_eq!(rec.unused_count, 0);
        assert_eq!(rec.utilization_pct, 100);
        assert_eq!(rec.estimated_waste_per_month, 0.0);
        assert_eq!(rec.severity, LicenseSeverity::Optimized);
    }
}
