use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddParams {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    unit_price: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    product_id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    unit_price: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveParams {
    product_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    company_id: String,
}

pub async fn add(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: AddParams = serde_json::from_value(params)?;
    let product = ctx
        .directory
        .add_product(&identity, &p.name, &p.description, &p.category, p.unit_price)
        .await?;
    Ok(serde_json::to_value(product)?)
}

pub async fn update(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: UpdateParams = serde_json::from_value(params)?;
    let product = ctx
        .directory
        .update_product(
            &identity,
            &p.product_id,
            &p.name,
            &p.description,
            &p.category,
            p.unit_price,
        )
        .await?;
    Ok(serde_json::to_value(product)?)
}

pub async fn remove(params: Value, ctx: &AppContext) -> Result<Value> {
    let identity = super::authenticate(&params, ctx).await?;
    let p: RemoveParams = serde_json::from_value(params)?;
    ctx.directory.remove_product(&identity, &p.product_id).await?;
    Ok(json!({}))
}

pub async fn list(params: Value, ctx: &AppContext) -> Result<Value> {
    super::authenticate(&params, ctx).await?;
    let p: ListParams = serde_json::from_value(params)?;
    let products = ctx.directory.list_products(&p.company_id).await?;
    Ok(json!(products))
}
