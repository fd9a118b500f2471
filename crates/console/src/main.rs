use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;

use api::{DestinationConfig, ProxyApi};
use logstream::{LogStreamClient, LogStreamConfig, LogStreamEvent, PatternNotifier};

mod render;

#[derive(Parser, Debug)]
#[clap(name = "proxydeck")]
#[clap(about = "Operator console for the video proxy manager", long_about = None)]
struct Args {
    /// Base URL of the proxy manager server.
    #[clap(long, default_value = "http://localhost")]
    server_url: String,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tail the live server log, refreshing the proxy listing as new
    /// proxies appear (the default).
    Watch {
        /// Log marker that triggers a listing refresh.
        #[clap(long, default_value = logstream::PROXY_CREATED_MARKER)]
        marker: String,
    },
    /// List files awaiting a move, with their proxies.
    Proxies,
    /// List the configured destination folders.
    Destinations {
        /// Create this folder instead of listing.
        #[clap(long)]
        create: Option<String>,
    },
    /// Move files into a destination folder.
    Move {
        #[clap(long, required = true, num_args = 1..)]
        files: Vec<String>,
        #[clap(long)]
        destination: String,
        /// Subfolder to create under the destination.
        #[clap(long, default_value = "")]
        new_folder: String,
    },
    /// Delete a video and its proxy.
    Delete {
        #[clap(long)]
        original: String,
        #[clap(long, default_value = "")]
        proxy: String,
    },
    /// Ask the server to reprocess all high-resolution files.
    Reprocess,
    /// Show or edit the server configuration.
    Config {
        #[clap(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current configuration.
    Show,
    /// Point the server at a different destination backend.
    SetDestination {
        #[clap(long, value_parser = ["local", "nfs"])]
        kind: String,
        #[clap(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let api = ProxyApi::new(args.server_url.as_str())?;
    let command = args.command.unwrap_or(Command::Watch {
        marker: logstream::PROXY_CREATED_MARKER.to_string(),
    });

    match command {
        Command::Watch { marker } => watch(&args.server_url, api, marker).await,
        Command::Proxies => {
            print!("{}", render::proxy_table(&api.list_proxies().await?));
            Ok(())
        }
        Command::Destinations { create } => match create {
            Some(folder) => {
                api.create_destination(&folder).await?;
                println!("Created destination folder {}", folder);
                Ok(())
            }
            None => {
                for dest in api.list_destinations().await? {
                    println!("{}", dest);
                }
                Ok(())
            }
        },
        Command::Move {
            files,
            destination,
            new_folder,
        } => {
            api.move_files(&files, &destination, &new_folder).await?;
            println!("Moved {} file(s) to {}", files.len(), destination);
            Ok(())
        }
        Command::Delete { original, proxy } => {
            api.delete_video(&original, &proxy).await?;
            println!("Deleted {}", original);
            Ok(())
        }
        Command::Reprocess => {
            api.reprocess().await?;
            println!("Reprocessing started");
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                let config = api.fetch_config().await?;
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
            ConfigAction::SetDestination { kind, path } => {
                // The update endpoint replaces the whole document, so this
                // is a read-modify-write.
                let mut config = api.fetch_config().await?;
                config.destination_config = DestinationConfig { kind, path };
                api.update_config(&config).await?;
                println!("Destination updated");
                Ok(())
            }
        },
    }
}

/// Tail the live log stream and keep the proxy listing current.
async fn watch(server_url: &str, api: ProxyApi, marker: String) -> Result<()> {
    let ws_url = logs_endpoint(server_url)?;
    info!("watching {}", ws_url);

    // Initial listing; afterwards the notifier keeps it current.
    match api.list_proxies().await {
        Ok(proxies) => print!("{}", render::proxy_table(&proxies)),
        Err(e) => warn!("initial proxy listing failed: {}", e),
    }

    // The notifier callback is synchronous; hand the refresh to a channel
    // so the stream session never waits on an HTTP round trip.
    let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);
    let notifier = PatternNotifier::new(marker, Arc::new(move || {
        let _ = refresh_tx.try_send(());
    }));

    let mut client = LogStreamClient::with_notifier(LogStreamConfig::new(ws_url), notifier);
    let mut events = client.start();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(LogStreamEvent::Connected) => {
                    println!("{}", render::status_line("connected"));
                }
                Some(LogStreamEvent::Record(record)) => {
                    print!("{}", render::record(&record));
                }
                Some(LogStreamEvent::Reconnecting { delay }) => {
                    println!(
                        "{}",
                        render::status_line(&format!(
                            "disconnected, retrying in {}s",
                            delay.as_secs()
                        ))
                    );
                }
                Some(LogStreamEvent::Closed) => {
                    println!("{}", render::status_line("server closed the log stream"));
                    break;
                }
                None => break,
            },
            Some(()) = refresh_rx.recv() => {
                match api.list_proxies().await {
                    Ok(proxies) => print!("{}", render::proxy_table(&proxies)),
                    Err(e) => warn!("proxy listing refresh failed: {}", e),
                }
            }
        }
    }

    client.stop().await;
    Ok(())
}

/// Derive the server's `/ws/logs` endpoint from its base URL.
fn logs_endpoint(server_url: &str) -> Result<String> {
    let mut url = Url::parse(server_url).context("invalid server url")?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot derive a websocket scheme for {}", server_url))?;
    url.set_path("/ws/logs");
    Ok(url.to_string())
}
