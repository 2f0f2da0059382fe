//! Per-connection context threaded through advertisement, request handling
//! and command execution.

use crate::refs::RefStore;

/// Agent string advertised when none is configured.
pub const DEFAULT_AGENT: &str = concat!("git-serve/", env!("CARGO_PKG_VERSION"));

/// Read-only view of the repository being served.
pub struct ServeContext<'a> {
    refs: &'a dyn RefStore,
    agent: String,
}

impl<'a> ServeContext<'a> {
    pub fn new(refs: &'a dyn RefStore) -> Self {
        ServeContext { refs, agent: DEFAULT_AGENT.to_owned() }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    pub fn refs(&self) -> &'a dyn RefStore {
        self.refs
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }
}
