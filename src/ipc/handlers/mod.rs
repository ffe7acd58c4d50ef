pub mod admin;
pub mod auth;
pub mod company;
pub mod connection;
pub mod daemon;
pub mod message;
pub mod product;
pub mod quote;
pub mod rfq;

use crate::guard::Identity;
use crate::AppContext;
use anyhow::Result;
use serde_json::Value;

/// Resolve the `token` param carried by every authenticated method.
pub(crate) async fn authenticate(params: &Value, ctx: &AppContext) -> Result<Identity> {
    let token = params
        .get("token")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(ctx.guard.authenticate(token).await?)
}
