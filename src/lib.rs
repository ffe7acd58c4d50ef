pub mod config;
pub mod connections;
pub mod directory;
pub mod error;
pub mod guard;
pub mod ipc;
pub mod janitor;
pub mod mailbox;
pub mod notify;
pub mod rfq;
pub mod storage;

use std::sync::Arc;

use config::DaemonConfig;
use connections::ConnectionGraph;
use directory::Directory;
use guard::AccessGuard;
use ipc::event::EventBroadcaster;
use mailbox::Mailbox;
use notify::Notifier;
use rfq::RfqEngine;
use storage::Storage;

/// Shared application state passed to every RPC handler and background task.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub storage: Arc<Storage>,
    pub broadcaster: Arc<EventBroadcaster>,
    /// Resolves bearer credentials to an acting user + company.
    pub guard: Arc<AccessGuard>,
    /// Company directory, product catalog, platform administration.
    pub directory: Arc<Directory>,
    /// Inter-company relationship requests and responses.
    pub connections: Arc<ConnectionGraph>,
    /// RFQ lifecycle, quote submission, exclusive acceptance.
    pub rfq: Arc<RfqEngine>,
    /// Connection-gated company-to-company messaging.
    pub mailbox: Arc<Mailbox>,
    /// Fire-and-forget workflow event fan-out.
    pub notifier: Notifier,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire the full engine stack over an already-opened storage handle.
    pub fn build(config: Arc<DaemonConfig>, storage: Arc<Storage>) -> Arc<AppContext> {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let notifier = notify::spawn(broadcaster.clone(), &config.notify);
        let guard = Arc::new(AccessGuard::new(storage.clone(), config.token_ttl_hours));
        let directory = Arc::new(Directory::new(storage.clone(), notifier.clone()));
        let connections = Arc::new(ConnectionGraph::new(storage.clone(), notifier.clone()));
        let rfq = Arc::new(RfqEngine::new(storage.clone(), notifier.clone()));
        let mailbox = Arc::new(Mailbox::new(
            storage.clone(),
            guard.clone(),
            notifier.clone(),
        ));
        Arc::new(AppContext {
            config,
            storage,
            broadcaster,
            guard,
            directory,
            connections,
            rfq,
            mailbox,
            notifier,
            started_at: std::time::Instant::now(),
        })
    }
}
