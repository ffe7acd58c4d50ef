use crate::directory::Registration;
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetParams {
    company_id: String,
}

#[derive(Deserialize)]
struct SearchParams {
    name: Option<String>,
    sector: Option<String>,
}

pub async fn register(params: Value, ctx: &AppContext) -> Result<Value> {
    let reg: Registration = serde_json::from_value(params)?;
    let (company, manager) = ctx.directory.register(reg).await?;
    Ok(json!({ "company": company, "manager": manager }))
}

pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    super::authenticate(&params, ctx).await?;
    let p: GetParams = serde_json::from_value(params)?;
    let company = ctx.directory.get(&p.company_id).await?;
    Ok(serde_json::to_value(company)?)
}

pub async fn search(params: Value, ctx: &AppContext) -> Result<Value> {
    super::authenticate(&params, ctx).await?;
    let p: SearchParams = serde_json::from_value(params)?;
    let companies = ctx
        .directory
        .search(p.name.as_deref(), p.sector.as_deref())
        .await?;
    Ok(json!(companies))
}
