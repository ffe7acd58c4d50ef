use crate::connections::{ConnectionDecision, ConnectionFilter, RelationshipKind};
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestParams {
    target_company_id: String,
    kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RespondParams {
    relationship_id: String,
    /// "accept" | "reject"
    decision: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisconnectParams {
    relationship_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    /// Defaults to the caller's own company.
    company_id: Option<String>,
    kind: Option<String>,
    status: Option<String>,
}

pub async fn request(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: RequestParams = serde_json::from_value(params)?;
    let kind = RelationshipKind::parse(&p.kind)?;
    let row = ctx
        .connections
        .request(&identity, &p.target_company_id, kind)
        .await?;
    Ok(serde_json::to_value(row)?)
}

pub async fn respond(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: RespondParams = serde_json::from_value(params)?;
    let decision = ConnectionDecision::parse(&p.decision)?;
    match ctx
        .connections
        .respond(&identity, &p.relationship_id, decision)
        .await?
    {
        Some(row) => Ok(serde_json::to_value(row)?),
        None => Ok(json!({ "removed": true })),
    }
}

pub async fn disconnect(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: DisconnectParams = serde_json::from_value(params)?;
    ctx.connections
        .disconnect(&identity, &p.relationship_id)
        .await?;
    Ok(json!({}))
}

pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: ListParams = serde_json::from_value(params)?;
    let company_id = match p.company_id {
        Some(id) => id,
        None => identity.acting_company()?.to_string(),
    };
    let filter = ConnectionFilter {
        kind: p.kind.as_deref().map(RelationshipKind::parse).transpose()?,
        status: p.status,
    };
    let rows = ctx.connections.list(&identity, &company_id, filter).await?;
    Ok(json!(rows))
}
