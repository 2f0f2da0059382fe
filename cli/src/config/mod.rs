//! Configuration for the `git-serve` binary.
//!
//! Stored as RON. Every field has a default, so an empty `Config()` is a
//! valid file.

pub mod loader;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use git_http::HttpSettings;
use git_serve::DEFAULT_AGENT;
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub log_level: String,
    pub serve: Serve,
    pub http: Http,
}

impl Default for Config {
    fn default() -> Self {
        Config { log_level: "info".to_string(), serve: Serve::default(), http: Http::default() }
    }
}

/// Settings shared by every transport.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct Serve {
    /// Advertised `agent=` value; the crate version when unset.
    pub agent: Option<String>,
    /// Git namespace to serve, as in `GIT_NAMESPACE`.
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Http {
    pub listen: String,
    /// Directory holding `<repo>` and `<group>/<repo>` repositories.
    pub repos_root: PathBuf,
    /// Upper bound on a request body, in bytes.
    pub max_body: usize,
    pub timeout_ms: u64,
    /// Requests served at the same time; the rest wait.
    pub max_concurrency: usize,
    /// Serve repositories without a `git-daemon-export-ok` marker.
    pub export_all: bool,
}

impl Default for Http {
    fn default() -> Self {
        Http {
            listen: "127.0.0.1:8080".to_string(),
            repos_root: PathBuf::from("./repos"),
            max_body: 1024 * 1024,
            timeout_ms: 30_000,
            max_concurrency: 16,
            export_all: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.log_level()?;
        self.listen_addr()?;
        if self.http.max_body == 0 {
            bail!("http.max_body must be greater than zero");
        }
        if self.http.max_concurrency == 0 {
            bail!("http.max_concurrency must be greater than zero");
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .with_context(|| format!("invalid log_level: {:?}", self.log_level))
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.http
            .listen
            .parse()
            .with_context(|| format!("invalid http.listen address: {:?}", self.http.listen))
    }

    pub fn agent(&self) -> String {
        self.serve.agent.clone().unwrap_or_else(|| DEFAULT_AGENT.to_string())
    }

    /// Applies `GIT_NAMESPACE`; an empty value means no namespace.
    pub fn apply_namespace_env(&mut self, value: Option<String>) {
        if let Some(namespace) = value {
            self.serve.namespace = Some(namespace).filter(|ns| !ns.is_empty());
        }
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            max_body: self.http.max_body,
            timeout_ms: self.http.timeout_ms,
            max_concurrency: self.http.max_concurrency,
            agent: self.agent(),
            namespace: self.serve.namespace.clone(),
            export_all: self.http.export_all,
        }
    }
}
