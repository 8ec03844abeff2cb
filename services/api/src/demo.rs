use crate::error::ApiError;
use crate::infra::demo_engines;
use chrono::{Local, NaiveDate, NaiveTime};
use clap::Args;
use futures::future::join_all;
use opsdash::config::CacheConfig;
use opsdash::directory::TenantRegistry;
use serde_json::json;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Only report snapshot history captured on or after this date (YYYY-MM-DD).
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) history_since: Option<NaiveDate>,
    /// Print one JSON document per line instead of pretty-printing.
    #[arg(long)]
    pub(crate) compact: bool,
    /// Skip the alert feed portion of the demo output.
    #[arg(long)]
    pub(crate) skip_alerts: bool,
}

/// Score the built-in fleet end to end and print each report as JSON. This
/// is the offline twin of the HTTP surface, handy for stakeholder demos and
/// for eyeballing scoring changes without a running server.
pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), ApiError> {
    let engines = demo_engines(&CacheConfig::default());
    let tenants = engines.registry.list_tenants().await?;

    let health = join_all(tenants.iter().map(|tenant| {
        let engine = engines.health.clone();
        async move {
            let score = engine.compute_health(tenant.id).await;
            json!({
                "tenant_id": tenant.id,
                "abbreviation": tenant.abbreviation,
                "score": score.score,
                "breakdown": score.breakdown,
            })
        }
    }))
    .await;
    emit("health-scores", json!(health), args.compact)?;

    let mut security = Vec::with_capacity(tenants.len());
    for tenant in &tenants {
        let result = engines
            .security
            .compute_security(tenant.id, &tenant.abbreviation)
            .await?;
        security.push(result);
    }
    emit("security-scores", serde_json::to_value(&security)?, args.compact)?;

    // capture one snapshot per tenant so the history section has rows
    let since = args
        .history_since
        .unwrap_or_else(|| Local::now().date_naive())
        .and_time(NaiveTime::MIN)
        .and_utc();
    for tenant in &tenants {
        engines
            .security
            .capture_snapshot(tenant.id, &tenant.abbreviation)
            .await?;
        let history = engines.security.list_snapshots(tenant.id, Some(since)).await?;
        emit(
            &format!("security-history/{}", tenant.abbreviation),
            serde_json::to_value(&history)?,
            args.compact,
        )?;
    }

    let summary = engines.licensing.analyze(&tenants).await;
    emit(
        "license-optimization",
        serde_json::to_value(&summary)?,
        args.compact,
    )?;

    if !args.skip_alerts {
        let alerts = engines.alerts.generate_alerts().await;
        emit("alerts", serde_json::to_value(&alerts)?, args.compact)?;
    }

    Ok(())
}

fn emit(section: &str, value: serde_json::Value, compact: bool) -> Result<(), ApiError> {
    let rendered = if compact {
        serde_json::to_string(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    };
    println!("=== {section} ===");
    println!("{rendered}");
    Ok(())
}
