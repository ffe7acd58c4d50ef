//! End-to-end tests for the JSON-RPC server: spins up a real daemon on a
//! free port and drives the workflow over WebSocket, asserting the wire
//! error codes external clients depend on.

use std::io::{Read as _, Write as _};
use std::net::TcpStream;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use nexusd::config::DaemonConfig;
use nexusd::guard;
use nexusd::storage::Storage;
use nexusd::{ipc, AppContext};

type Ws = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn get_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Start a daemon on a random port and return its URL plus the shared context.
async fn start_test_daemon() -> (String, u16, Arc<AppContext>) {
    let data_dir = tempfile::tempdir().unwrap().keep();
    let port = get_free_port();

    let config = Arc::new(DaemonConfig::new(
        Some(port),
        Some(data_dir.clone()),
        Some("warn".to_string()),
        None,
    ));
    let storage = Arc::new(Storage::new(&data_dir).await.unwrap());
    let ctx = AppContext::build(config, storage);

    tokio::spawn(ipc::run(ctx.clone()));

    // Wait for the listener to come up.
    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    (format!("ws://127.0.0.1:{port}"), port, ctx)
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.expect("ws connect");
    ws
}

/// Send one JSON-RPC request and wait for the response with a matching id,
/// skipping any interleaved notification frames.
async fn rpc(ws: &mut Ws, id: u64, method: &str, params: Value) -> Value {
    let req = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
    ws.send(Message::Text(req.to_string())).await.unwrap();
    loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("rpc response timeout")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            let v: Value = serde_json::from_str(&text).unwrap();
            if v.get("id").and_then(Value::as_u64) == Some(id) {
                return v;
            }
        }
    }
}

fn result(v: &Value) -> &Value {
    assert!(
        v.get("error").is_none(),
        "expected success, got error: {v}"
    );
    &v["result"]
}

fn error_code(v: &Value) -> i64 {
    v["error"]["code"].as_i64().expect("error code")
}

/// Seed a platform super-admin directly through storage (the bootstrap CLI
/// path) and return a bearer token for it.
async fn seed_admin(ctx: &AppContext) -> String {
    let salt = guard::new_salt();
    let hash = guard::hash_password(&salt, "root-password");
    let user = ctx
        .storage
        .create_user("root@platform.example", &hash, &salt, "super_admin", None)
        .await
        .unwrap();
    ctx.guard.issue_token(&user.id).await.unwrap()
}

#[tokio::test]
async fn ping_status_and_unknown_method() {
    let (url, _port, _ctx) = start_test_daemon().await;
    let mut ws = connect(&url).await;

    let resp = rpc(&mut ws, 1, "daemon.ping", json!({})).await;
    assert_eq!(result(&resp)["pong"], json!(true));

    let resp = rpc(&mut ws, 2, "daemon.status", json!({})).await;
    assert!(result(&resp)["version"].is_string());

    let resp = rpc(&mut ws, 3, "daemon.frobnicate", json!({})).await;
    assert_eq!(error_code(&resp), -32601);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_endpoint_shares_the_port() {
    let (_url, port, _ctx) = start_test_daemon().await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("\"status\":\"ok\""));
}

#[tokio::test]
async fn credential_errors_have_distinct_codes() {
    let (url, _port, _ctx) = start_test_daemon().await;
    let mut ws = connect(&url).await;

    // Garbage token → unauthenticated.
    let resp = rpc(&mut ws, 1, "rfq.list", json!({ "token": "bogus" })).await;
    assert_eq!(error_code(&resp), -32004);

    // Unknown login → unauthenticated, same code.
    let resp = rpc(
        &mut ws,
        2,
        "auth.login",
        json!({ "email": "ghost@nowhere.example", "password": "password123" }),
    )
    .await;
    assert_eq!(error_code(&resp), -32004);
}

#[tokio::test]
async fn full_workflow_over_the_wire() {
    let (url, _port, ctx) = start_test_daemon().await;
    let mut ws = connect(&url).await;
    let admin_token = seed_admin(&ctx).await;

    // ── Onboard two companies ────────────────────────────────────────────────
    let resp = rpc(
        &mut ws,
        1,
        "company.register",
        json!({
            "name": "Acme Metals",
            "sector": "metals",
            "kind": "buyer",
            "managerEmail": "buyer@acme.example",
            "managerPassword": "buyer-password",
        }),
    )
    .await;
    let buyer_company = result(&resp)["company"]["id"].as_str().unwrap().to_string();

    let resp = rpc(
        &mut ws,
        2,
        "company.register",
        json!({
            "name": "Globex Supply",
            "sector": "metals",
            "kind": "supplier",
            "managerEmail": "sales@globex.example",
            "managerPassword": "sales-password",
        }),
    )
    .await;
    let supplier_company = result(&resp)["company"]["id"].as_str().unwrap().to_string();

    // A pending company cannot act yet.
    let resp = rpc(
        &mut ws,
        3,
        "auth.login",
        json!({ "email": "buyer@acme.example", "password": "buyer-password" }),
    )
    .await;
    let buyer_token = result(&resp)["token"].as_str().unwrap().to_string();
    let resp = rpc(
        &mut ws,
        4,
        "rfq.create",
        json!({ "token": &buyer_token, "title": "t", "description": "d", "quantity": 1 }),
    )
    .await;
    assert_eq!(error_code(&resp), -32005);

    // ── Admin approves both ──────────────────────────────────────────────────
    for (id, company) in [(5, &buyer_company), (6, &supplier_company)] {
        let resp = rpc(
            &mut ws,
            id,
            "admin.approveCompany",
            json!({ "token": &admin_token, "companyId": company }),
        )
        .await;
        assert_eq!(result(&resp)["status"], json!("active"));
    }

    let resp = rpc(
        &mut ws,
        7,
        "auth.login",
        json!({ "email": "sales@globex.example", "password": "sales-password" }),
    )
    .await;
    let supplier_token = result(&resp)["token"].as_str().unwrap().to_string();

    // ── RFQ + quotes ─────────────────────────────────────────────────────────
    let resp = rpc(
        &mut ws,
        8,
        "rfq.create",
        json!({
            "token": &buyer_token,
            "title": "Steel coils",
            "description": "200t cold-rolled",
            "quantity": 200,
            "budget": 150000.0,
        }),
    )
    .await;
    let rfq_id = result(&resp)["id"].as_str().unwrap().to_string();

    let resp = rpc(
        &mut ws,
        9,
        "quote.submit",
        json!({ "token": &supplier_token, "rfqId": &rfq_id, "price": 140000.0, "deliveryDays": 30 }),
    )
    .await;
    let quote_id = result(&resp)["id"].as_str().unwrap().to_string();
    assert_eq!(result(&resp)["status"], json!("submitted"));

    // Duplicate submission from the same supplier → duplicate code.
    let resp = rpc(
        &mut ws,
        10,
        "quote.submit",
        json!({ "token": &supplier_token, "rfqId": &rfq_id, "price": 139000.0, "deliveryDays": 28 }),
    )
    .await;
    assert_eq!(error_code(&resp), -32003);

    // The supplier cannot accept; the buyer can.
    let resp = rpc(
        &mut ws,
        11,
        "quote.accept",
        json!({ "token": &supplier_token, "rfqId": &rfq_id, "quoteId": &quote_id }),
    )
    .await;
    assert_eq!(error_code(&resp), -32005);

    let resp = rpc(
        &mut ws,
        12,
        "quote.accept",
        json!({ "token": &buyer_token, "rfqId": &rfq_id, "quoteId": &quote_id }),
    )
    .await;
    assert_eq!(result(&resp)["status"], json!("accepted"));

    let resp = rpc(
        &mut ws,
        13,
        "rfq.get",
        json!({ "token": &buyer_token, "rfqId": &rfq_id }),
    )
    .await;
    assert_eq!(result(&resp)["status"], json!("closed"));

    // Accepting again loses to the already-closed RFQ.
    let resp = rpc(
        &mut ws,
        14,
        "quote.accept",
        json!({ "token": &buyer_token, "rfqId": &rfq_id, "quoteId": &quote_id }),
    )
    .await;
    assert_eq!(error_code(&resp), -32002);

    // ── Connections over the wire ────────────────────────────────────────────
    let resp = rpc(
        &mut ws,
        15,
        "connection.request",
        json!({ "token": &buyer_token, "targetCompanyId": &supplier_company, "kind": "supplier" }),
    )
    .await;
    let rel_id = result(&resp)["id"].as_str().unwrap().to_string();

    let resp = rpc(
        &mut ws,
        16,
        "connection.request",
        json!({ "token": &buyer_token, "targetCompanyId": &buyer_company, "kind": "supplier" }),
    )
    .await;
    assert_eq!(error_code(&resp), -32602);

    let resp = rpc(
        &mut ws,
        17,
        "connection.respond",
        json!({ "token": &supplier_token, "relationshipId": &rel_id, "decision": "accept" }),
    )
    .await;
    assert_eq!(result(&resp)["status"], json!("active"));

    // Messaging now flows between the connected pair.
    let resp = rpc(
        &mut ws,
        18,
        "message.send",
        json!({ "token": &buyer_token, "recipientCompanyId": &supplier_company, "body": "PO incoming" }),
    )
    .await;
    assert_eq!(result(&resp)["body"], json!("PO incoming"));
}
