use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitParams {
    rfq_id: String,
    price: f64,
    delivery_days: i64,
    notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawParams {
    quote_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptParams {
    rfq_id: String,
    quote_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    rfq_id: String,
}

pub async fn submit(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: SubmitParams = serde_json::from_value(params)?;
    let quote = ctx
        .rfq
        .submit_quote(
            &identity,
            &p.rfq_id,
            p.price,
            p.delivery_days,
            p.notes.as_deref(),
        )
        .await?;
    Ok(serde_json::to_value(quote)?)
}

pub async fn withdraw(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: WithdrawParams = serde_json::from_value(params)?;
    let quote = ctx.rfq.withdraw_quote(&identity, &p.quote_id).await?;
    Ok(serde_json::to_value(quote)?)
}

pub async fn accept(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: AcceptParams = serde_json::from_value(params)?;
    let quote = ctx
        .rfq
        .accept_quote(&identity, &p.rfq_id, &p.quote_id)
        .await?;
    Ok(serde_json::to_value(quote)?)
}

pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: ListParams = serde_json::from_value(params)?;
    let quotes = ctx.rfq.list_quotes(&identity, &p.rfq_id).await?;
    Ok(json!(quotes))
}
