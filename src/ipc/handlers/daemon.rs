use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn ping(_params: Value, _ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "pong": true, "ts": chrono::Utc::now().to_rfc3339() }))
}

pub async fn status(_params: Value, ctx: &AppContext) -> Result<Value> {
    let companies = ctx.storage.count_companies(Some("active")).await?;
    let pending = ctx.storage.count_companies(Some("pending")).await?;
    let open_rfqs = ctx.storage.count_rfqs(Some("open")).await?;
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": ctx.started_at.elapsed().as_secs(),
        "activeCompanies": companies,
        "pendingCompanies": pending,
        "openRfqs": open_rfqs,
        "connectedClients": ctx.broadcaster.subscriber_count(),
    }))
}
