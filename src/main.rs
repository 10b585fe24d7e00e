use std::collections::HashMap;
use std::env;

use anyhow::Context;
use clap::{Parser, Subcommand};
use secret_store_client::{SecretStoreClient, SecretStoreClientBuilder};
use serde_json::Value;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "secret-store")]
#[command(about = "Read and manage secrets in a Vault-compatible KV v2 store")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Server address, overrides VAULT_ADDR
    #[arg(long, global = true)]
    address: Option<String>,

    /// Enable client debug logging
    #[arg(short, long, global = true, env = "VAULT_DEBUG")]
    debug: bool,

    /// Print the metrics snapshot after the command
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether the server answers its health endpoint
    Health,

    /// Read a secret
    Get { path: String, version: Option<u64> },

    /// Read a single key of a secret
    Value {
        path: String,
        key: String,
        /// Returned when the key or secret is missing; parsed as JSON when possible
        default: Option<String>,
    },

    /// List keys under a path
    List { path: String },

    /// Write a secret from a JSON object
    Put { path: String, data: String },

    /// Delete specific versions, or the whole secret when none are given
    Delete { path: String, versions: Vec<u64> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_logger();
    let cli = Cli::parse();

    let mut builder = SecretStoreClientBuilder::from_env().debug(cli.debug).on_renewal_error(|e| {
        tracing::error!(error = %e, "token renewal stopped");
    });
    if let Some(address) = cli.address {
        builder = builder.address(address);
    }
    let client = builder.build().context("invalid client configuration")?;

    let result = run(&client, cli.command).await;
    if cli.metrics {
        println!("{}", serde_json::to_string_pretty(&client.get_metrics())?);
    }
    client.shutdown().await;

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(client: &SecretStoreClient, command: Command) -> anyhow::Result<Value> {
    let output = match command {
        Command::Health => Value::Bool(client.health_check().await),
        Command::Get { path, version } => {
            let secret = client.get_secret(&path, version).await?;
            serde_json::to_value(secret)?
        }
        Command::Value { path, key, default } => {
            let default = default.map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)));
            client.get_secret_value(&path, &key, default).await?
        }
        Command::List { path } => serde_json::to_value(client.list_secrets(&path).await?)?,
        Command::Put { path, data } => {
            let data: HashMap<String, Value> =
                serde_json::from_str(&data).context("secret data must be a JSON object")?;
            client.put_secret(&path, data).await?;
            Value::Bool(true)
        }
        Command::Delete { path, versions } => {
            client.delete_secret(&path, Some(versions.as_slice())).await?;
            Value::Bool(true)
        }
    };
    Ok(output)
}

fn init_logger() -> Option<WorkerGuard> {
    use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
    use tracing_log::LogTracer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::{EnvFilter, Registry};

    if !env::var("JSON_LOG").is_ok_and(|s| s.parse().unwrap_or_default()) {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
        return None;
    }

    // Redirect the logs from log library to tracing's subscribers.
    LogTracer::init().expect("Unable to setup log tracer!");

    let app_name = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION")).to_string();

    // Non-blocking stderr writer, stdout carries command output
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);
    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(JsonStorageLayer)
        .with(bunyan_formatting_layer);
    tracing::subscriber::set_global_default(subscriber).expect("Unable to set global subscriber");
    Some(guard)
}
