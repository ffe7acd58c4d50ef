//! Workflow notifications — fire-and-forget fan-out to connected clients and
//! an optional external webhook.
//!
//! Events are queued on a bounded channel and delivered from a background
//! task. `Notifier::send` never blocks and drops on overflow — notification
//! delivery must never hold up (or hold locks across) a workflow mutation.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::NotifyConfig;
use crate::ipc::event::EventBroadcaster;

const QUEUE_DEPTH: usize = 256;

// ─── Event types ─────────────────────────────────────────────────────────────

/// A notification-worthy workflow transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum WorkflowEvent {
    #[serde(rename_all = "camelCase")]
    ConnectionRequested {
        relationship_id: String,
        from_company_id: String,
        to_company_id: String,
        connection_kind: String,
    },
    #[serde(rename_all = "camelCase")]
    ConnectionAccepted {
        relationship_id: String,
        a_company_id: String,
        b_company_id: String,
        connection_kind: String,
    },
    #[serde(rename_all = "camelCase")]
    RfqCreated {
        rfq_id: String,
        requester_company_id: String,
        target_company_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    QuoteSubmitted {
        rfq_id: String,
        quote_id: String,
        responder_company_id: String,
    },
    #[serde(rename_all = "camelCase")]
    QuoteAccepted {
        rfq_id: String,
        quote_id: String,
        requester_company_id: String,
        responder_company_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MessageReceived {
        message_id: String,
        from_company_id: String,
        to_company_id: String,
    },
    #[serde(rename_all = "camelCase")]
    CompanyStatusChanged {
        company_id: String,
        status: String,
    },
}

impl WorkflowEvent {
    /// JSON-RPC notification method name for the broadcast sink.
    pub fn method(&self) -> &'static str {
        match self {
            WorkflowEvent::ConnectionRequested { .. } => "connection.requested",
            WorkflowEvent::ConnectionAccepted { .. } => "connection.accepted",
            WorkflowEvent::RfqCreated { .. } => "rfq.created",
            WorkflowEvent::QuoteSubmitted { .. } => "quote.submitted",
            WorkflowEvent::QuoteAccepted { .. } => "quote.accepted",
            WorkflowEvent::MessageReceived { .. } => "message.received",
            WorkflowEvent::CompanyStatusChanged { .. } => "company.statusChanged",
        }
    }
}

// ─── Sink seam ───────────────────────────────────────────────────────────────

/// A delivery channel for workflow events. Failures are logged and dropped —
/// no sink may block the daemon or trigger retries in the workflow path.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn deliver(&self, event: &WorkflowEvent) -> anyhow::Result<()>;
}

/// Pushes the event to every connected WebSocket client as a JSON-RPC
/// notification.
pub struct BroadcastSink {
    broadcaster: Arc<EventBroadcaster>,
}

impl BroadcastSink {
    pub fn new(broadcaster: Arc<EventBroadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn deliver(&self, event: &WorkflowEvent) -> anyhow::Result<()> {
        self.broadcaster
            .broadcast(event.method(), serde_json::to_value(event)?);
        Ok(())
    }
}

/// POSTs the event JSON to a configured endpoint (in-app e-mail gateway,
/// Slack bridge, …). Delivery is best-effort.
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self { url, client }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, event: &WorkflowEvent) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "event": event.method(),
            "ts": Utc::now().to_rfc3339(),
            "payload": event,
        });
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

// ─── Sender handle ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<WorkflowEvent>,
}

impl Notifier {
    /// Queue an event for delivery. Never blocks — drops silently if the
    /// queue is full.
    pub fn send(&self, event: WorkflowEvent) {
        let _ = self.tx.try_send(event);
    }
}

/// Spawns the background delivery task and returns the sender handle.
pub fn spawn(broadcaster: Arc<EventBroadcaster>, config: &NotifyConfig) -> Notifier {
    let mut sinks: Vec<Box<dyn NotificationSink>> =
        vec![Box::new(BroadcastSink::new(broadcaster))];
    if let Some(url) = &config.webhook_url {
        sinks.push(Box::new(WebhookSink::new(
            url.clone(),
            config.webhook_timeout_secs,
        )));
    }

    let (tx, mut rx) = mpsc::channel::<WorkflowEvent>(QUEUE_DEPTH);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            debug!(event = event.method(), "delivering workflow event");
            for sink in &sinks {
                if let Err(e) = sink.deliver(&event).await {
                    warn!(sink = sink.name(), event = event.method(), err = %e,
                        "notification delivery failed — dropped");
                }
            }
        }
    });

    Notifier { tx }
}
