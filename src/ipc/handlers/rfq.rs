use crate::rfq::RfqDraft;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RfqIdParams {
    rfq_id: String,
}

pub async fn create(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let draft: RfqDraft = serde_json::from_value(params)?;
    let view = ctx.rfq.create(&identity, draft).await?;
    Ok(serde_json::to_value(view)?)
}

pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: ListParams = serde_json::from_value(params)?;
    let rfqs = ctx.rfq.list_visible(&identity, p.status.as_deref()).await?;
    Ok(json!(rfqs))
}

pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: RfqIdParams = serde_json::from_value(params)?;
    let view = ctx.rfq.get(&identity, &p.rfq_id).await?;
    Ok(serde_json::to_value(view)?)
}

pub async fn close(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: RfqIdParams = serde_json::from_value(params)?;
    ctx.rfq.close(&identity, &p.rfq_id).await?;
    Ok(json!({}))
}
