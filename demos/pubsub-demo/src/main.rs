// Demo publisher/subscriber for the heron client library.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use heron_client::{Client, ConnInfo, MsgHandler, PemCertFiles, TopicHandler, notify_on_ack};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pubsub-demo")]
#[command(about = "Publish to or subscribe from a heron pub/sub broker")]
struct Args {
    /// Broker address (host:port)
    #[arg(long, default_value = "localhost:4040")]
    broker: String,

    /// Namespace shared by the cooperating demo processes
    #[arg(long, default_value = "demo")]
    namespace: String,

    /// CA certificate PEM file
    #[arg(long)]
    ca_cert: PathBuf,

    /// Client certificate PEM file
    #[arg(long)]
    cert: PathBuf,

    /// Client private key PEM file
    #[arg(long)]
    key: PathBuf,

    /// Log ping round-trip times every two seconds
    #[arg(long)]
    ping: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish messages on a topic
    Publish {
        /// Topic to publish on (a clean absolute path, e.g. /demo/chat)
        #[arg(long, default_value = "/demo/chat")]
        topic: String,

        /// Message payload
        message: String,

        /// How many copies to publish
        #[arg(long, default_value = "1")]
        count: u32,
    },
    /// Subscribe to topics and print what arrives
    Subscribe {
        /// Topics to subscribe to
        #[arg(default_value = "/demo/chat")]
        topics: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let certs = Arc::new(PemCertFiles {
        ca_cert_file: args.ca_cert.clone(),
        cert_file: args.cert.clone(),
        key_file: args.key.clone(),
    });
    let mut info = ConnInfo::new(args.broker.clone(), certs);
    if args.ping {
        info = info.with_ping_observer(Arc::new(|rtt: Duration| {
            info!(rtt_us = rtt.as_micros() as u64, "ping answered");
        }));
    }
    info.apply_overrides(None).context("apply config overrides")?;

    let client = Client::new(args.namespace.clone(), "pubsub-demo", info);
    client.connect().await.context("connect to the broker")?;

    match args.command {
        Command::Publish {
            topic,
            message,
            count,
        } => publish(&client, &topic, &message, count).await?,
        Command::Subscribe { topics } => subscribe(&client, topics).await?,
    }

    client.disconnect().await.context("disconnect")?;
    Ok(())
}

async fn publish(client: &Client, topic: &str, message: &str, count: u32) -> Result<()> {
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();

    for seq in 0..count {
        client
            .publish(
                Some(notify_on_ack(ack_tx.clone(), seq)),
                topic,
                message.as_bytes().to_vec(),
            )
            .await
            .with_context(|| format!("publish {seq} on {topic}"))?;
    }

    // Wait for the broker to acknowledge every publication.
    for _ in 0..count {
        let seq = ack_rx.recv().await.context("ack stream ended early")?;
        info!(seq, topic, "publication acknowledged");
    }
    Ok(())
}

async fn subscribe(client: &Client, topics: Vec<String>) -> Result<()> {
    let handlers: Vec<TopicHandler> = topics
        .iter()
        .map(|topic| {
            TopicHandler::new(
                topic.as_str(),
                MsgHandler::new(|topic, payload| {
                    info!(
                        %topic,
                        payload = %String::from_utf8_lossy(payload),
                        "received",
                    );
                }),
            )
        })
        .collect();

    client
        .subscribe(None, handlers)
        .await
        .context("subscribe")?;
    info!(?topics, "subscribed; waiting for publications (ctrl-c to stop)");

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    Ok(())
}
