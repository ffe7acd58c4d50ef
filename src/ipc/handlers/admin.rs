use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompanyIdParams {
    company_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCompaniesParams {
    status: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListUsersParams {
    company_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetUserRoleParams {
    user_id: String,
    role: String,
}

pub async fn approve_company(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: CompanyIdParams = serde_json::from_value(params)?;
    let company = ctx.directory.approve_company(&identity, &p.company_id).await?;
    Ok(serde_json::to_value(company)?)
}

pub async fn suspend_company(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: CompanyIdParams = serde_json::from_value(params)?;
    let company = ctx.directory.suspend_company(&identity, &p.company_id).await?;
    Ok(serde_json::to_value(company)?)
}

pub async fn reinstate_company(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: CompanyIdParams = serde_json::from_value(params)?;
    let company = ctx
        .directory
        .reinstate_company(&identity, &p.company_id)
        .await?;
    Ok(serde_json::to_value(company)?)
}

pub async fn list_companies(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: ListCompaniesParams = serde_json::from_value(params)?;
    let companies = ctx
        .directory
        .list_companies(&identity, p.status.as_deref())
        .await?;
    Ok(json!(companies))
}

pub async fn list_users(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: ListUsersParams = serde_json::from_value(params)?;
    let users = ctx
        .directory
        .list_users(&identity, p.company_id.as_deref())
        .await?;
    Ok(json!(users))
}

pub async fn set_user_role(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: SetUserRoleParams = serde_json::from_value(params)?;
    let user = ctx
        .directory
        .set_user_role(&identity, &p.user_id, &p.role)
        .await?;
    Ok(serde_json::to_value(user)?)
}
