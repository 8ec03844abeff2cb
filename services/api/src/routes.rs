use crate::error::ApiError;
use crate::infra::{deserialize_optional_date, AppState, Engines};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{NaiveDate, NaiveTime};
use futures::future::join_all;
use opsdash::directory::{TenantRef, TenantRegistry};
use opsdash::scoring::alerts::Alert;
use opsdash::scoring::health::HealthBreakdown;
use opsdash::scoring::licensing::OptimizationSummary;
use opsdash::scoring::security::{SecurityScoreResult, SecuritySnapshot};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Serialize)]
pub(crate) struct TenantHealthView {
    pub(crate) tenant_id: i64,
    pub(crate) abbreviation: String,
    pub(crate) score: u8,
    pub(crate) breakdown: HealthBreakdown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SecurityScoreQuery {
    pub(crate) tenant_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum SecurityScoreResponse {
    Single(Box<SecurityScoreResult>),
    Many(Vec<SecurityScoreResult>),
}

#[derive(Debug, Deserialize)]
pub(crate) struct SnapshotRequest {
    pub(crate) tenant_id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    pub(crate) tenant_id: i64,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) since: Option<NaiveDate>,
}

pub(crate) fn dashboard_routes(engines: Arc<Engines>) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/health-scores",
            axum::routing::get(health_overview_endpoint),
        )
        .route(
            "/api/v1/security-score",
            axum::routing::get(security_score_endpoint),
        )
        .route(
            "/api/v1/security-score/snapshot",
            axum::routing::post(capture_snapshot_endpoint),
        )
        .route(
            "/api/v1/security-score/history",
            axum::routing::get(snapshot_history_endpoint),
        )
        .route(
            "/api/v1/license-optimization",
            axum::routing::get(license_optimization_endpoint),
        )
        .route("/api/v1/alerts", axum::routing::get(alerts_endpoint))
        .with_state(engines)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Wellness score per registered tenant. Tenants whose signals cannot be
/// fetched still appear, with the fail-safe zero score.
pub(crate) async fn health_overview_endpoint(
    State(engines): State<Arc<Engines>>,
) -> Result<Json<Vec<TenantHealthView>>, ApiError> {
    let tenants = engines.registry.list_tenants().await?;
    let scored = join_all(tenants.into_iter().map(|tenant| {
        let health = engines.health.clone();
        async move {
            let score = health.compute_health(tenant.id).await;
            TenantHealthView {
                tenant_id: tenant.id,
                abbreviation: tenant.abbreviation,
                score: score.score,
                breakdown: score.breakdown,
            }
        }
    }))
    .await;
    Ok(Json(scored))
}

/// Security posture for one tenant, or for every tenant when `tenant_id`
/// is omitted. The fleet-wide form silently drops tenants whose signals
/// cannot be fetched.
pub(crate) async fn security_score_endpoint(
    State(engines): State<Arc<Engines>>,
    Query(query): Query<SecurityScoreQuery>,
) -> Result<Json<SecurityScoreResponse>, ApiError> {
    match query.tenant_id {
        Some(tenant_id) => {
            let tenant = resolve_tenant(&engines, tenant_id).await?;
            let result = engines
                .security
                .compute_security(tenant.id, &tenant.abbreviation)
                .await?;
            Ok(Json(SecurityScoreResponse::Single(Box::new(result))))
        }
        None => {
            let tenants = engines.registry.list_tenants().await?;
            let settled = join_all(tenants.iter().map(|tenant| {
                engines
                    .security
                    .compute_security(tenant.id, &tenant.abbreviation)
            }))
            .await;
            let results = settled
                .into_iter()
                .zip(tenants.iter())
                .filter_map(|(outcome, tenant)| match outcome {
                    Ok(result) => Some(result),
                    Err(err) => {
                        debug!(tenant_id = tenant.id, %err, "tenant dropped from security report");
                        None
                    }
                })
                .collect();
            Ok(Json(SecurityScoreResponse::Many(results)))
        }
    }
}

/// Capture and persist a point-in-time security snapshot. The session layer
/// in front of this service must have already verified elevated privileges.
pub(crate) async fn capture_snapshot_endpoint(
    State(engines): State<Arc<Engines>>,
    Json(payload): Json<SnapshotRequest>,
) -> Result<Json<SecuritySnapshot>, ApiError> {
    let tenant = resolve_tenant(&engines, payload.tenant_id).await?;
    let snapshot = engines
        .security
        .capture_snapshot(tenant.id, &tenant.abbreviation)
        .await?;
    Ok(Json(snapshot))
}

pub(crate) async fn snapshot_history_endpoint(
    State(engines): State<Arc<Engines>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<SecuritySnapshot>>, ApiError> {
    let tenant = resolve_tenant(&engines, query.tenant_id).await?;
    let since = query
        .since
        .map(|date| date.and_time(NaiveTime::MIN).and_utc());
    let history = engines.security.list_snapshots(tenant.id, since).await?;
    Ok(Json(history))
}

pub(crate) async fn license_optimization_endpoint(
    State(engines): State<Arc<Engines>>,
) -> Result<Json<OptimizationSummary>, ApiError> {
    let tenants = engines.registry.list_tenants().await?;
    let summary = engines.licensing.analyze(&tenants).await;
    Ok(Json(summary))
}

pub(crate) async fn alerts_endpoint(
    State(engines): State<Arc<Engines>>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    Ok(Json(engines.alerts.generate_alerts().await))
}

async fn resolve_tenant(engines: &Engines, tenant_id: i64) -> Result<TenantRef, ApiError> {
    if tenant_id <= 0 {
        return Err(ApiError::InvalidParam(format!(
            "tenant_id must be a positive integer, got {tenant_id}"
        )));
    }
    let tenants = engines.registry.list_tenants().await?;
    tenants
        .into_iter()
        .find(|tenant| tenant.id == tenant_id)
        .ok_or(ApiError::UnknownTenant(tenant_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::demo_engines;
    use axum::body::Body;
    use axum::http::Request;
    use opsdash::config::CacheConfig;
    use opsdash::scoring::security::CheckStatus;
    use tower::util::ServiceExt;

    fn engines() -> Arc<Engines> {
        Arc::new(demo_engines(&CacheConfig::default()))
    }

    #[tokio::test]
    async fn healthcheck_responds_ok_through_the_router() {
        let app = dashboard_routes(engines());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_overview_covers_every_registered_tenant() {
        let Json(views) = health_overview_endpoint(State(engines()))
            .await
            .expect("overview builds");
        assert_eq!(views.len(), 3);
        let contoso = views
            .iter()
            .find(|view| view.abbreviation == "contoso")
            .expect("contoso present");
        assert!(contoso.score > 90);
        assert_eq!(
            contoso.score,
            contoso.breakdown.users + contoso.breakdown.licenses + contoso.breakdown.policies
        );
    }

    #[tokio::test]
    async fn single_tenant_security_score_resolves_by_id() {
        let Json(response) = security_score_endpoint(
            State(engines()),
            Query(SecurityScoreQuery { tenant_id: Some(1) }),
        )
        .await
        .expect("score computes");
        match response {
            SecurityScoreResponse::Single(result) => {
                assert_eq!(result.tenant_abbrv, "contoso");
                assert!(result
                    .checks
                    .iter()
                    .any(|check| check.status == CheckStatus::Pass));
            }
            SecurityScoreResponse::Many(_) => panic!("expected a single-tenant response"),
        }
    }

    #[tokio::test]
    async fn unknown_tenant_is_rejected_with_not_found() {
        let err = security_score_endpoint(
            State(engines()),
            Query(SecurityScoreQuery {
                tenant_id: Some(99),
            }),
        )
        .await
        .expect_err("unknown tenant rejected");
        assert!(matches!(err, ApiError::UnknownTenant(99)));
    }

    #[tokio::test]
    async fn non_positive_tenant_id_is_invalid_input() {
        let err = capture_snapshot_endpoint(
            State(engines()),
            Json(SnapshotRequest { tenant_id: -4 }),
        )
        .await
        .expect_err("invalid id rejected before reaching the engine");
        assert!(matches!(err, ApiError::InvalidParam(_)));
    }

    #[tokio::test]
    async fn snapshot_capture_feeds_the_history_endpoint() {
        let engines = engines();
        let Json(snapshot) = capture_snapshot_endpoint(
            State(engines.clone()),
            Json(SnapshotRequest { tenant_id: 2 }),
        )
        .await
        .expect("capture succeeds");
        assert_eq!(snapshot.tenant_id, 2);

        let Json(history) = snapshot_history_endpoint(
            State(engines),
            Query(HistoryQuery {
                tenant_id: 2,
                since: None,
            }),
        )
        .await
        .expect("history reads");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, snapshot.id);
        assert_eq!(history[0].score, snapshot.score);
    }

    #[tokio::test]
    async fn license_report_and_alerts_cover_the_demo_fleet() {
        let engines = engines();
        let Json(summary) = license_optimization_endpoint(State(engines.clone()))
            .await
            .expect("summary builds");
        assert_eq!(summary.analyzed_tenants, 3);
        assert!(summary.total_estimated_waste > 0.0);

        let Json(alerts) = alerts_endpoint(State(engines))
            .await
            .expect("alerts build");
        // demo seed: one failed run, one stale technician, one Teams incident
        assert!(alerts.iter().any(|a| a.id == "failed-run-1041"));
        assert!(alerts.iter().any(|a| a.id == "stale-technicians"));
        assert!(alerts.iter().any(|a| a.id == "service-2-microsoft-teams"));
    }
}
