pub mod event;
pub mod handlers;

use crate::error::WorkflowError;
use crate::AppContext;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ─── JSON-RPC 2.0 types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

// ─── Error codes ─────────────────────────────────────────────────────────────
//
// notFound        = -32001  (referenced entity missing or not visible)
// invalidState    = -32002  (operation not valid for the entity's state,
//                            including lost accept races)
// duplicate       = -32003  (relationship/quote uniqueness violation)
// unauthenticated = -32004  (missing/unknown/expired credential)
// forbidden       = -32005  (role, membership, or party check failed)

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
const NOT_FOUND: i32 = -32001;
const INVALID_STATE: i32 = -32002;
const DUPLICATE: i32 = -32003;
const UNAUTHENTICATED: i32 = -32004;
const FORBIDDEN: i32 = -32005;

// ─── Server ──────────────────────────────────────────────────────────────────

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "RPC server listening (WebSocket + HTTP health on same port)");

    // Broadcast daemon.ready to anyone who subscribes after connect
    ctx.broadcaster.broadcast(
        "daemon.ready",
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "port": ctx.config.port
        }),
    );

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    // Pinned so we can use it in the select! loop without moving.
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping RPC server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("RPC server stopped");
    Ok(())
}

/// Respond to an HTTP `GET /health` request with a JSON status document.
///
/// The daemon shares one port for both WebSocket (JSON-RPC) and a plain
/// HTTP health endpoint so load balancers can check liveness without a WS
/// library.
async fn handle_health_check(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Consume the request (we don't inspect it — any GET /health is fine).
    let mut req_buf = vec![0u8; 2048];
    let _ = stream.read(&mut req_buf).await;

    let uptime_secs = ctx.started_at.elapsed().as_secs();
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime_secs,
        "connectedClients": ctx.broadcaster.subscriber_count(),
        "port": ctx.config.port,
    });
    let body_str = body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_str.len(),
        body_str
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    // Peek at the first bytes to distinguish HTTP health checks from
    // WebSocket upgrades — both share the same port. All other GET requests
    // (including WS upgrades) fall through to the WS handshake as normal.
    let mut peek_buf = [0u8; 12];
    let n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    if n >= 11 && &peek_buf[..11] == b"GET /health" {
        return handle_health_check(stream, &ctx).await;
    }

    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    // Every request carries its own bearer credential — there is no
    // connection-level handshake. Workflow events are pushed to every
    // connected client.
    let mut broadcast_rx = ctx.broadcaster.subscribe();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = dispatch_text(&text, &ctx).await;
                        if let Err(e) = sink.send(Message::Text(response)).await {
                            warn!(err = %e, "send error");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(err = %e, "ws error");
                        break;
                    }
                    _ => {}
                }
            }
            // Outgoing broadcast event
            event = broadcast_rx.recv() => {
                match event {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            warn!(err = %e, "broadcast send error");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "broadcast lagged");
                    }
                }
            }
        }
    }
    Ok(())
}

pub async fn dispatch_text(text: &str, ctx: &AppContext) -> String {
    // Parse
    let req: RpcRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => {
            return error_response(Value::Null, PARSE_ERROR, "Parse error");
        }
    };

    // Validate jsonrpc field
    if req.jsonrpc != "2.0" {
        return error_response(
            req.id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "Invalid Request",
        );
    }

    let id = req.id.unwrap_or(Value::Null);
    let params = req.params.unwrap_or(Value::Null);

    debug!(method = %req.method, "rpc dispatch");

    let result = dispatch(&req.method, params, ctx).await;

    match result {
        Ok(value) => {
            let resp = RpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(value),
                error: None,
            };
            serde_json::to_string(&resp).unwrap_or_default()
        }
        Err(e) => {
            let (code, msg) = classify_error(&e);
            error_response(id, code, &msg)
        }
    }
}

async fn dispatch(method: &str, params: Value, ctx: &AppContext) -> anyhow::Result<Value> {
    match method {
        "daemon.ping" => handlers::daemon::ping(params, ctx).await,
        "daemon.status" => handlers::daemon::status(params, ctx).await,
        "auth.login" => handlers::auth::login(params, ctx).await,
        "auth.logout" => handlers::auth::logout(params, ctx).await,
        "company.register" => handlers::company::register(params, ctx).await,
        "company.get" => handlers::company::get(params, ctx).await,
        "company.search" => handlers::company::search(params, ctx).await,
        "product.add" => handlers::product::add(params, ctx).await,
        "product.update" => handlers::product::update(params, ctx).await,
        "product.remove" => handlers::product::remove(params, ctx).await,
        "product.list" => handlers::product::list(params, ctx).await,
        "connection.request" => handlers::connection::request(params, ctx).await,
        "connection.respond" => handlers::connection::respond(params, ctx).await,
        "connection.disconnect" => handlers::connection::disconnect(params, ctx).await,
        "connection.list" => handlers::connection::list(params, ctx).await,
        "rfq.create" => handlers::rfq::create(params, ctx).await,
        "rfq.list" => handlers::rfq::list(params, ctx).await,
        "rfq.get" => handlers::rfq::get(params, ctx).await,
        "rfq.close" => handlers::rfq::close(params, ctx).await,
        "quote.submit" => handlers::quote::submit(params, ctx).await,
        "quote.withdraw" => handlers::quote::withdraw(params, ctx).await,
        "quote.accept" => handlers::quote::accept(params, ctx).await,
        "quote.list" => handlers::quote::list(params, ctx).await,
        "message.send" => handlers::message::send(params, ctx).await,
        "message.thread" => handlers::message::thread(params, ctx).await,
        "admin.approveCompany" => handlers::admin::approve_company(params, ctx).await,
        "admin.suspendCompany" => handlers::admin::suspend_company(params, ctx).await,
        "admin.reinstateCompany" => handlers::admin::reinstate_company(params, ctx).await,
        "admin.listCompanies" => handlers::admin::list_companies(params, ctx).await,
        "admin.listUsers" => handlers::admin::list_users(params, ctx).await,
        "admin.setUserRole" => handlers::admin::set_user_role(params, ctx).await,
        _ => Err(anyhow::anyhow!("METHOD_NOT_FOUND:{}", method)),
    }
}

fn classify_error(e: &anyhow::Error) -> (i32, String) {
    // Domain errors carry their own code mapping.
    if let Some(we) = e.downcast_ref::<WorkflowError>() {
        let code = match we {
            WorkflowError::Validation(_) | WorkflowError::InvalidTarget(_) => INVALID_PARAMS,
            WorkflowError::NotFound(_) => NOT_FOUND,
            WorkflowError::InvalidState(_) => INVALID_STATE,
            WorkflowError::DuplicateRelationship | WorkflowError::DuplicateQuote => DUPLICATE,
            WorkflowError::Unauthenticated(_) => UNAUTHENTICATED,
            WorkflowError::Forbidden(_) | WorkflowError::Unauthorized(_) => FORBIDDEN,
            WorkflowError::Storage(_) | WorkflowError::Internal(_) => {
                error!(err = %we, "internal error");
                return (INTERNAL_ERROR, "Internal error".to_string());
            }
        };
        return (code, we.to_string());
    }

    let msg = e.to_string();
    if msg.starts_with("METHOD_NOT_FOUND:") {
        return (METHOD_NOT_FOUND, "Method not found".to_string());
    }
    if msg.contains("missing field") || msg.contains("invalid type") {
        return (INVALID_PARAMS, format!("Invalid params: {}", msg));
    }
    error!(err = %e, "internal error");
    (INTERNAL_ERROR, "Internal error".to_string())
}

fn error_response(id: Value, code: i32, message: &str) -> String {
    let resp = RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: message.to_string(),
        }),
    };
    serde_json::to_string(&resp).unwrap_or_default()
}
