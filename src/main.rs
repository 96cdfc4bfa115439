//! # tvcomet
//!
//! Live-update relay binary: runs the comet mailbox server, or follows a
//! server's live updates from the terminal.

#![deny(unsafe_code)]

mod listen;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tvcomet_client::{Capabilities, SelectorPolicy, TransportKind, select_transport};
use tvcomet_server::CometServer;
use tvcomet_settings::CometSettings;

/// Live-update relay for the TV server admin console.
#[derive(Parser, Debug)]
#[command(name = "tvcomet", about = "Live-update (comet) relay")]
struct Cli {
    /// Settings file (defaults to `~/.tvcomet/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the mailbox server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Follow a server and print events as JSON lines.
    Listen {
        /// Console base URL.
        #[arg(long)]
        url: Option<String>,
        /// Notification class to print (repeatable).
        #[arg(long = "class")]
        classes: Vec<String>,
        /// Force a transport instead of selecting one.
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,
    },
    /// Print the transport that would be selected.
    Select {
        /// User agent to test against the exclusion list.
        #[arg(long)]
        user_agent: Option<String>,
        /// Pretend WebSocket is unavailable.
        #[arg(long)]
        no_websocket: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TransportArg {
    Websocket,
    Poll,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Websocket => Self::Socket,
            TransportArg::Poll => Self::Poll,
        }
    }
}

fn load(config: Option<&PathBuf>) -> Result<CometSettings> {
    let path = config.cloned().unwrap_or_else(tvcomet_settings::settings_path);
    tvcomet_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load(cli.config.as_ref())?;

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            serve(settings).await
        }
        Command::Listen {
            url,
            classes,
            transport,
        } => {
            if let Some(url) = url {
                settings.client.base_url = url;
            }
            let classes = if classes.is_empty() {
                listen::DEFAULT_CLASSES.iter().map(|c| (*c).to_owned()).collect()
            } else {
                classes
            };
            logging::init(&settings.logging, None);

            let cancel = CancellationToken::new();
            let stopper = cancel.clone();
            let _ = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    stopper.cancel();
                }
            });
            let reloads =
                listen::run(settings.client, &classes, transport.map(Into::into), cancel).await?;
            tracing::info!(reloads, "stopped following live updates");
            Ok(())
        }
        Command::Select {
            user_agent,
            no_websocket,
        } => {
            let mut caps = Capabilities::from_settings(&settings.client);
            if user_agent.is_some() {
                caps.user_agent = user_agent;
            }
            caps.websocket &= !no_websocket;
            let kind = select_transport(&caps, &SelectorPolicy::from_settings(&settings.client));
            println!("{kind}");
            Ok(())
        }
    }
}

async fn serve(settings: CometSettings) -> Result<()> {
    let server = Arc::new(CometServer::new(settings.server));
    logging::init(&settings.logging, Some(Arc::clone(server.hub())));

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    let sweeper = server.spawn_sweeper();
    tracing::info!("tvcomet listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let aborted = server
        .shutdown()
        .graceful_shutdown(vec![handle, sweeper], None)
        .await;
    tracing::info!(aborted, "Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_overrides() {
        let cli = Cli::parse_from(["tvcomet", "serve", "--port", "0", "--host", "0.0.0.0"]);
        match cli.command {
            Command::Serve { host, port } => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn listen_repeatable_classes() {
        let cli = Cli::parse_from([
            "tvcomet", "listen", "--class", "dvrdb", "--class", "epg", "--transport", "poll",
        ]);
        match cli.command {
            Command::Listen {
                classes, transport, ..
            } => {
                assert_eq!(classes, vec!["dvrdb", "epg"]);
                assert_eq!(transport, Some(TransportArg::Poll));
                assert_eq!(TransportKind::from(TransportArg::Poll), TransportKind::Poll);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::parse_from(["tvcomet", "select", "--config", "/tmp/x.json", "--no-websocket"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.json")));
        assert!(matches!(cli.command, Command::Select { no_websocket: true, .. }));
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(settings.server.port, 9981);
    }

    #[test]
    fn invalid_config_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{broken").unwrap();
        let err = load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to load settings"));
    }
}
