//! # cubelink
//!
//! Command-line client: watch a server's state and broadcasts, or send a
//! single request and print the response.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cubelink_client::{
    ConnectionState, Envelope, RemoteClient, SubscriberEvent, Subscription, WebSocketConnector,
};
use cubelink_settings::ClientSettings;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Remote-control client for a cubelink server.
#[derive(Parser, Debug)]
#[command(name = "cubelink", about = "Remote-control client for a cubelink server")]
struct Cli {
    /// Settings file (defaults to `~/.cubelink/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server host (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Server password (overrides settings).
    #[arg(long)]
    password: Option<String>,

    /// Connect with `wss://`.
    #[arg(long)]
    tls: bool,

    /// Accept any server certificate.
    #[arg(long, requires = "tls")]
    insecure: bool,

    /// Log filter when `RUST_LOG` is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print state changes and unsolicited messages until interrupted.
    Watch,
    /// Send one request and print its response.
    Send {
        /// Request name, e.g. `query_tracks`.
        name: String,

        /// Request option as `key=value`; values parse as JSON, else string.
        #[arg(short = 'o', long = "option", value_parser = parse_option)]
        options: Vec<(String, Value)>,

        /// Seconds to wait for the connection and the response.
        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },
}

impl Cli {
    fn settings(&self) -> Result<ClientSettings> {
        let mut settings = match &self.config {
            Some(path) => cubelink_settings::load_settings_from_path(path),
            None => cubelink_settings::load_settings(),
        }
        .context("Failed to load settings")?;

        let conn = &mut settings.connection;
        if let Some(host) = &self.host {
            conn.host.clone_from(host);
        }
        if let Some(port) = self.port {
            conn.port = port;
        }
        if let Some(password) = &self.password {
            conn.password.clone_from(password);
        }
        if self.tls {
            conn.tls_enabled = true;
        }
        if self.insecure {
            conn.cert_validation_disabled = true;
        }
        Ok(settings)
    }
}

fn parse_option(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty option key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        cubelink_core::logging::init_json_subscriber(&cli.log_level);
    } else {
        cubelink_core::logging::init_subscriber(&cli.log_level);
    }

    let settings = cli.settings()?;
    debug!(connection = ?settings.connection, "settings loaded");
    let client = RemoteClient::spawn(settings, WebSocketConnector);

    match cli.command {
        Command::Watch => watch(&client).await,
        Command::Send {
            name,
            options,
            timeout_secs,
        } => {
            let options: Map<String, Value> = options.into_iter().collect();
            let request = Envelope::request(name).options(options).build();
            send(&client, request, Duration::from_secs(timeout_secs)).await
        }
    }
}

async fn watch(client: &RemoteClient) -> Result<()> {
    let mut sub = client.add_subscriber()?;
    info!(subscriber = %sub.id(), "watching");
    loop {
        tokio::select! {
            event = sub.recv() => match event {
                Some(SubscriberEvent::StateChanged(change)) => {
                    println!("state {} -> {}", change.old, change.new);
                }
                Some(SubscriberEvent::Message(envelope)) => {
                    println!("{}", serde_json::to_string(&envelope)?);
                }
                Some(SubscriberEvent::InvalidCredentials) => bail!("server rejected the password"),
                None => bail!("client stopped"),
            },
            _ = tokio::signal::ctrl_c() => {
                client.remove_subscriber(sub.id())?;
                client.disconnect()?;
                return Ok(());
            }
        }
    }
}

async fn send(client: &RemoteClient, request: Envelope, limit: Duration) -> Result<()> {
    let mut sub = client.add_subscriber()?;
    tokio::time::timeout(limit, wait_connected(&mut sub))
        .await
        .context("Timed out connecting")??;

    let pending = client.call(request, sub.id()).await?;
    let response = tokio::time::timeout(limit, pending)
        .await
        .context("Timed out waiting for the response")??;
    println!("{}", serde_json::to_string_pretty(response.options())?);

    client.disconnect()?;
    Ok(())
}

async fn wait_connected(sub: &mut Subscription) -> Result<()> {
    while let Some(event) = sub.recv().await {
        match event {
            SubscriberEvent::StateChanged(change) if change.new == ConnectionState::Connected => {
                return Ok(());
            }
            SubscriberEvent::InvalidCredentials => bail!("server rejected the password"),
            _ => {}
        }
    }
    bail!("client stopped")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn option_values_parse_as_json_or_string() {
        assert_eq!(parse_option("limit=50").unwrap(), ("limit".into(), Value::from(50)));
        assert_eq!(parse_option("shuffle=true").unwrap(), ("shuffle".into(), Value::Bool(true)));
        assert_eq!(
            parse_option("filter=beatles").unwrap(),
            ("filter".into(), Value::String("beatles".into()))
        );
        assert_eq!(
            parse_option("query=a=b").unwrap(),
            ("query".into(), Value::String("a=b".into()))
        );
    }

    #[test]
    fn malformed_options_rejected() {
        assert_matches!(parse_option("limit"), Err(_));
        assert_matches!(parse_option("=5"), Err(_));
    }

    #[test]
    fn flags_override_settings() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "cubelink",
            "--config",
            dir.path().join("missing.json").to_str().unwrap(),
            "--host",
            "10.0.0.5",
            "--port",
            "9000",
            "--tls",
            "--insecure",
            "send",
            "ping",
        ]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.connection.url(), "wss://10.0.0.5:9000");
        assert!(settings.connection.cert_validation_disabled);
        assert_matches!(cli.command, Command::Send { ref name, .. } if name == "ping");
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
