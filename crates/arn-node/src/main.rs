//! arn-node: run an agent relay network node.
//!
//!   arn-node run [--config <path>] [--relay <url>]...
//!   arn-node demo
//!   arn-node identity [--key <path>]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use arn_network::SimulatedRelayNetwork;
use arn_node::{AgentNetwork, NodeConfig};
use arn_protocol::constants::PROTOCOL_VERSION;
use arn_protocol::{AgentAdvertisement, Identity, ServiceRequest};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arn-node")]
#[command(about = "Agent Relay Network node - discover agents and exchange signed requests over relays")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Join the network and serve until interrupted
    Run {
        /// Config file (default: <config dir>/arn/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Relay URL (repeat or comma-delimit); replaces configured relays
        #[arg(long = "relay", value_delimiter = ',')]
        relays: Vec<String>,
    },
    /// Two nodes exchanging a request over in-process relays
    Demo,
    /// Print (creating if needed) this node's public key
    Identity {
        /// Key file (default: <data dir>/arn/identity.key)
        #[arg(long)]
        key: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { config, relays } => {
            let mut config = NodeConfig::load(config.as_deref())?;
            if !relays.is_empty() {
                config.network.relays = relays;
            }
            init_logging(&config.logging.level);
            run(config).await
        }
        Command::Demo => {
            init_logging("info");
            demo().await
        }
        Command::Identity { key } => {
            let path = match key {
                Some(path) => path,
                None => NodeConfig::default().key_path()?,
            };
            let identity = Identity::load_or_create(&path)
                .with_context(|| format!("loading identity from {}", path.display()))?;
            println!("{}", identity.public_key());
            println!("protocol: {PROTOCOL_VERSION}");
            println!("key file: {}", path.display());
            Ok(())
        }
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let network = AgentNetwork::from_config(config)?;
    network.start().await?;
    tracing::info!(identity = %network.local_identity(), protocol = PROTOCOL_VERSION, "Node ready");

    let mut discovered = network.on_agent_discovered();
    let mut requests = network.on_request_received();
    let mut responses = network.on_response_received();
    let mut tasks = network.on_task_coordination_received();

    loop {
        tokio::select! {
            Some(profile) = discovered.recv() => {
                tracing::info!(agent_id = %profile.agent_id, capabilities = ?profile.capabilities, "Agent available");
            }
            Some(request) = requests.recv() => {
                tracing::info!(request_id = %request.request_id, task_type = %request.task_type, "Awaiting local handler for request");
            }
            Some(response) = responses.recv() => {
                tracing::info!(request_id = %response.request_id, result = %response.result, "Response");
            }
            Some(task) = tasks.recv() => {
                tracing::info!(task_id = %task.task_id, agents = ?task.agents, "Joined task");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    network.stop().await?;
    Ok(())
}

async fn demo() -> anyhow::Result<()> {
    let relays = SimulatedRelayNetwork::new();
    let urls = ["wss://relay-a.local", "wss://relay-b.local", "wss://relay-c.local"];
    let mut config = NodeConfig::default();
    config.network.relays = urls.iter().map(|u| u.to_string()).collect();
    config.network.discovery_window_ms = 500;

    let provider = AgentNetwork::new(Identity::generate(), relays.transports(&urls), config.clone());
    let customer = AgentNetwork::new(Identity::generate(), relays.transports(&urls), config);
    provider.start().await?;
    customer.start().await?;

    let mut incoming = provider.on_request_received();
    let mut answers = customer.on_response_received();

    let ad = AgentAdvertisement::new("price-analysis-agent", "Price Analysis", "$0.01".parse()?)
        .with_capability("technical_analysis")
        .with_reputation(0.9);
    provider.announce_agent(ad).await?;

    let found = customer
        .discover_agents(&["technical_analysis".to_string()])
        .await?;
    for profile in &found {
        println!("discovered {} ({}) at {}", profile.agent_id, profile.reputation, profile.cost);
    }

    let request_id = customer
        .request_agent_service(
            ServiceRequest::new("technical_analysis", serde_json::json!({"symbol": "AAPL"}))
                .with_target("price-analysis-agent"),
        )
        .await?;
    println!("sent request {request_id}");

    let request = tokio::time::timeout(Duration::from_secs(5), incoming.recv())
        .await
        .context("provider never saw the request")?
        .context("request channel closed")?;
    provider
        .respond_to_request(&request.request_id, serde_json::json!({"trend": "up"}), "$0.01".parse()?)
        .await?;

    let response = tokio::time::timeout(Duration::from_secs(5), answers.recv())
        .await
        .context("customer never saw the response")?
        .context("response channel closed")?;
    println!(
        "response from {}: {} (cost {})",
        response.agent_id, response.result, response.cost
    );

    let status = customer.network_status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    provider.stop().await?;
    customer.stop().await?;
    Ok(())
}
