use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use git_http::{DirectoryStorage, ServeState, router};
use git_serve::{CapabilityRegistry, GixRefStore, ServeContext, ServeOptions, serve};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "git-serve")]
#[command(about = "Git protocol v2 server - ref advertisement over stdio or smart HTTP", long_about = None)]
struct Cli {
    /// Config file (RON); discovered from the working directory when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve one repository over stdin/stdout
    Serve {
        /// Handle a single request and exit
        #[arg(long)]
        stateless_rpc: bool,
        /// Print the capability advertisement and exit
        #[arg(long)]
        advertise_capabilities: bool,
        /// Git namespace to serve (overrides GIT_NAMESPACE)
        #[arg(long)]
        namespace: Option<String>,
        /// Value advertised as `agent=`
        #[arg(long)]
        agent: Option<String>,
        /// Repository directory
        directory: PathBuf,
    },
    /// Serve a tree of repositories over smart HTTP
    Http {
        /// Listen address, e.g. 127.0.0.1:8080
        #[arg(long)]
        listen: Option<String>,
        /// Directory containing the repositories
        #[arg(long)]
        root: Option<PathBuf>,
        /// Serve repositories without a git-daemon-export-ok marker
        #[arg(long)]
        export_all: bool,
    },
}

impl Commands {
    /// Command line flags take precedence over the config file and environment.
    fn apply_overrides(&self, config: &mut Config) {
        match self {
            Commands::Serve { namespace, agent, .. } => {
                if let Some(namespace) = namespace {
                    config.serve.namespace = Some(namespace.clone()).filter(|ns| !ns.is_empty());
                }
                if let Some(agent) = agent {
                    config.serve.agent = Some(agent.clone());
                }
            }
            Commands::Http { listen, root, export_all } => {
                if let Some(listen) = listen {
                    config.http.listen = listen.clone();
                }
                if let Some(root) = root {
                    config.http.repos_root = root.clone();
                }
                if *export_all {
                    config.http.export_all = true;
                }
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => config::loader::load_from_file(path)?,
        None => config::loader::load_with_discovery()?,
    };
    config.apply_namespace_env(std::env::var("GIT_NAMESPACE").ok());
    cli.command.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // stdout carries protocol data
    tracing_subscriber::fmt()
        .with_max_level(config.log_level()?)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Serve { stateless_rpc, advertise_capabilities, directory, .. } => {
            let options = ServeOptions { advertise_capabilities, stateless_rpc };
            run_stdio(&config, options, directory).await
        }
        Commands::Http { .. } => run_http(&config).await,
    }
}

async fn run_stdio(config: &Config, options: ServeOptions, directory: PathBuf) -> Result<()> {
    let agent = config.agent();
    let namespace = config.serve.namespace.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let store = GixRefStore::open(&directory, namespace.as_deref())
            .with_context(|| format!("failed to open repository at {}", directory.display()))?;
        let ctx = ServeContext::new(&store).with_agent(agent);
        let registry = CapabilityRegistry::standard();

        let input = std::io::stdin().lock();
        let output = BufWriter::new(std::io::stdout().lock());
        if let Err(err) = serve(&ctx, &registry, options, input, output) {
            tracing::error!("serve failed: {err}");
            return Err(err.into());
        }
        Ok(())
    })
    .await
    .context("serve task failed")?
}

async fn run_http(config: &Config) -> Result<()> {
    let addr = config.listen_addr()?;
    let root = &config.http.repos_root;
    if !root.is_dir() {
        tracing::warn!("repository root does not exist: {}", root.display());
    }

    let state = ServeState::new(
        DirectoryStorage::new(root.clone()),
        CapabilityRegistry::standard(),
        config.http_settings(),
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("serving {} on http://{addr}", root.display());
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_stdio_flags() {
        let cli = Cli::try_parse_from([
            "git-serve",
            "serve",
            "--stateless-rpc",
            "--advertise-capabilities",
            "--namespace",
            "tenant",
            "/srv/git/tools.git",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve { stateless_rpc, advertise_capabilities, namespace, directory, .. } => {
                assert!(stateless_rpc);
                assert!(advertise_capabilities);
                assert_eq!(namespace.as_deref(), Some("tenant"));
                assert_eq!(directory, PathBuf::from("/srv/git/tools.git"));
            }
            Commands::Http { .. } => panic!("expected serve"),
        }
    }

    #[test]
    fn serve_requires_a_directory() {
        assert!(Cli::try_parse_from(["git-serve", "serve"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "git-serve",
            "--config",
            "custom.ron",
            "http",
            "--listen",
            "0.0.0.0:9000",
            "--root",
            "/srv/git",
            "--export-all",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("custom.ron")));

        let mut config = Config::default();
        cli.command.apply_overrides(&mut config);
        assert_eq!(config.http.listen, "0.0.0.0:9000");
        assert_eq!(config.http.repos_root, PathBuf::from("/srv/git"));
        assert!(config.http.export_all);
        assert_eq!(config.listen_addr().unwrap().port(), 9000);
    }

    #[test]
    fn namespace_flag_beats_environment() {
        let cli = Cli::try_parse_from(["git-serve", "serve", "--namespace", "cli", "."]).unwrap();
        let mut config = Config::default();
        config.apply_namespace_env(Some("env".to_string()));
        cli.command.apply_overrides(&mut config);
        assert_eq!(config.serve.namespace.as_deref(), Some("cli"));
    }

    #[test]
    fn load_config_reads_explicit_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("git-serve.ron");
        std::fs::write(&path, r#"Config(http: Http(max_concurrency: 0))"#).unwrap();
        let path = path.to_string_lossy().into_owned();

        let cli = Cli::try_parse_from(["git-serve", "--config", &path, "http"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
