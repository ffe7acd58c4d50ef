use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendParams {
    recipient_company_id: String,
    body: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadParams {
    /// The other side of the thread.
    other_company_id: String,
    /// Defaults to the caller's company; admins may read any pair.
    company_id: Option<String>,
    limit: Option<i64>,
    before: Option<String>,
}

pub async fn send(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: SendParams = serde_json::from_value(params)?;
    let row = ctx
        .mailbox
        .send(&identity, &p.recipient_company_id, &p.body)
        .await?;
    Ok(serde_json::to_value(row)?)
}

pub async fn thread(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: ThreadParams = serde_json::from_value(params)?;
    let own = match p.company_id {
        Some(id) => id,
        None => identity.acting_company()?.to_string(),
    };
    let rows = ctx
        .mailbox
        .thread(
            &identity,
            &own,
            &p.other_company_id,
            p.limit,
            p.before.as_deref(),
        )
        .await?;
    Ok(json!(rows))
}
