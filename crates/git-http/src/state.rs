use std::sync::Arc;

use git_serve::{CapabilityRegistry, DEFAULT_AGENT};
use tokio::sync::Semaphore;

use crate::repo::{DirectoryStorage, RepositoryProvider};

/// Abstraction over the state required by Git HTTP handlers.
pub trait GitHttpState: Clone + Send + Sync + 'static {
    type Storage: RepositoryProvider + Send + Sync;

    fn storage(&self) -> &Self::Storage;
    fn registry(&self) -> &Arc<CapabilityRegistry>;
    fn git_semaphore(&self) -> &Arc<Semaphore>;
    fn settings(&self) -> &HttpSettings;
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub max_body: usize,
    pub timeout_ms: u64,
    pub max_concurrency: usize,
    pub agent: String,
    pub namespace: Option<String>,
    pub export_all: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            max_body: 1024 * 1024,
            timeout_ms: 30_000,
            max_concurrency: 16,
            agent: DEFAULT_AGENT.to_owned(),
            namespace: None,
            export_all: false,
        }
    }
}

/// Ready-made state serving repositories from a directory tree.
#[derive(Clone)]
pub struct ServeState {
    storage: DirectoryStorage,
    registry: Arc<CapabilityRegistry>,
    semaphore: Arc<Semaphore>,
    settings: Arc<HttpSettings>,
}

impl ServeState {
    pub fn new(storage: DirectoryStorage, registry: CapabilityRegistry, settings: HttpSettings) -> Self {
        ServeState {
            storage,
            registry: Arc::new(registry),
            semaphore: Arc::new(Semaphore::new(settings.max_concurrency.max(1))),
            settings: Arc::new(settings),
        }
    }
}

impl GitHttpState for ServeState {
    type Storage = DirectoryStorage;

    fn storage(&self) -> &DirectoryStorage {
        &self.storage
    }

    fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    fn git_semaphore(&self) -> &Arc<Semaphore> {
        &self.semaphore
    }

    fn settings(&self) -> &HttpSettings {
        &self.settings
    }
}
