use std::time::Duration;

use castle_client::{Client, ClientConfig, ClientError, ClientEvent, RequestOptions};
use clap::{Parser, Subcommand};
use frames::Codec;
use serde_json::{Value, json};
use tokio::sync::broadcast;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("timed out after {0:?} waiting for the server")]
    Timeout(Duration),
    #[error("waiting for ctrl-c failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "castle", about = "RPC and publish/subscribe client")]
struct Cli {
    /// Candidate server URLs, first one dialed first.
    #[arg(long, env = "CASTLE_SERVERS", value_delimiter = ',', default_value = "ws://127.0.0.1:8000")]
    servers: Vec<String>,

    /// Client address to log in with; empty lets the server assign one.
    #[arg(long, env = "CASTLE_ADDRESS", default_value = "")]
    address: String,

    #[arg(long, env = "CASTLE_CODEC", default_value = "binary", value_parser = parse_codec)]
    codec: Codec,

    /// Give up on one-shot commands after this long.
    #[arg(long, default_value_t = 30_000)]
    wait_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call a service and print its reply.
    Request {
        path: String,
        #[arg(long, default_value = "null")]
        data: String,
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Send without waiting for a reply.
        #[arg(long, default_value_t = false)]
        no_reply: bool,
    },
    /// Publish on a topic.
    Publish {
        topic: String,
        #[arg(long, default_value = "null")]
        data: String,
    },
    /// Print publications as JSON lines until ctrl-c.
    Subscribe {
        #[arg(required = true)]
        topics: Vec<String>,
    },
    /// Serve an echo service under `name` until ctrl-c.
    Serve { name: String },
}

fn parse_codec(raw: &str) -> Result<Codec, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "binary" | "proto" => Ok(Codec::Binary),
        "json" | "text" => Ok(Codec::Json),
        other => Err(format!("unknown codec `{other}` (expected binary or json)")),
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let wait = Duration::from_millis(cli.wait_ms);
    let config = ClientConfig::default()
        .with_servers(cli.servers)
        .with_address(cli.address)
        .with_codec(cli.codec);
    let client = Client::connect(config);
    tokio::spawn(log_events(client.events()));

    let result = match cli.command {
        Command::Request { path, data, timeout_ms, no_reply } => {
            let mut options = RequestOptions::default().with_need_reply(!no_reply);
            if let Some(ms) = timeout_ms {
                options = options.with_timeout(Duration::from_millis(ms));
            }
            let data = parse_data(&data)?;
            run_request(&client, path, data, options, wait)
                .await
                .and_then(|reply| print_json(&reply))
        }
        Command::Publish { topic, data } => {
            let data = parse_data(&data)?;
            within(wait, client.publish(topic, data))
                .await
                .and_then(|ack| print_json(&ack))
        }
        Command::Subscribe { topics } => run_subscribe(&client, topics).await,
        Command::Serve { name } => run_serve(&client, name).await,
    };

    finish(&client, wait).await;
    result
}

async fn run_request(
    client: &Client,
    path: String,
    data: Value,
    options: RequestOptions,
    wait: Duration,
) -> Result<Value, CliError> {
    let reply = within(wait, client.request(path, data, options)).await?;
    if !options.need_reply {
        // A no-reply request resolves once buffered; wait until it is written.
        within(wait, client.flush()).await?;
    }
    Ok(reply)
}

/// Close the link after it has written everything handed to it.
async fn finish(client: &Client, wait: Duration) {
    match within(wait, client.close()).await {
        Ok(()) | Err(CliError::Client(ClientError::Closed)) => {}
        Err(e) => tracing::warn!(error = %e, "link did not close cleanly"),
    }
}

async fn run_subscribe(client: &Client, topics: Vec<String>) -> Result<(), CliError> {
    client
        .subscribe(topics, |data: &Value, from: &str, topic: &str| {
            println!("{}", json!({ "topic": topic, "from": from, "data": data }));
        })
        .await?;
    tokio::signal::ctrl_c().await?;
    Ok(())
}

async fn run_serve(client: &Client, name: String) -> Result<(), CliError> {
    let service = name.clone();
    let registration = client.register_service(name, move |data: Value| {
        let service = service.clone();
        async move {
            tracing::info!(service = %service, "serve: echoing request");
            Ok::<_, Value>(data)
        }
    });
    // The announcement is retried on every login; a failed first one is not fatal.
    if let Err(e) = registration.await {
        tracing::warn!(error = %e, "serve: registration not acknowledged");
    }
    tokio::signal::ctrl_c().await?;
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::LoggedIn { address }) => tracing::info!(%address, "logged in"),
            Ok(ClientEvent::LoginFailed { reason }) => tracing::warn!(%reason, "login failed"),
            Ok(ClientEvent::LinkError { reason }) => tracing::warn!(%reason, "link error"),
            Ok(ClientEvent::Moved { url }) => tracing::info!(%url, "moved"),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn within<T>(wait: Duration, future: impl Future<Output = Result<T, ClientError>>) -> Result<T, CliError> {
    match tokio::time::timeout(wait, future).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CliError::Timeout(wait)),
    }
}

fn parse_data(raw: &str) -> Result<Value, CliError> {
    Ok(serde_json::from_str(raw)?)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
