use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
struct LoginParams {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LogoutParams {
    token: String,
}

pub async fn login(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: LoginParams = serde_json::from_value(params)?;
    let (token, identity) = ctx.guard.login(&p.email, &p.password).await?;
    Ok(json!({
        "token": token,
        "userId": identity.user_id,
        "email": identity.email,
        "role": identity.role.as_str(),
        "companyId": identity.company_id,
    }))
}

pub async fn logout(params: Value, ctx: &AppContext) -> Result<Value> {
    let p: LogoutParams = serde_json::from_value(params)?;
    let revoked = ctx.guard.logout(&p.token).await?;
    Ok(json!({ "revoked": revoked }))
}
