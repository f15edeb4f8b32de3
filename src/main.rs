use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use universal_store::config::Config;
use universal_store::tracing_init::init_tracing;
use universal_store::{
    ChannelHub, CustomEvent, EnvironmentId, RuntimeContext, StoreEvent, StoreOptions,
    StoreRegistry, Subscription, UniversalStore,
};

const DEMO_STORE_ID: &str = "demo:counter";
const CONVERGE_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(name = "universal-store", version, about = "Replicated store demo and tooling")]
struct Cli {
    /// Config file (default: ~/.config/universal-store/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a leader and several followers over a simulated bus
    Demo {
        /// Number of follower environments
        #[arg(long, default_value_t = 2)]
        followers: usize,
        /// Number of update rounds
        #[arg(long, default_value_t = 3)]
        updates: u64,
        /// Trace protocol events of every store
        #[arg(long)]
        debug: bool,
    },
    /// Validate and print the effective configuration
    CheckConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DemoState {
    count: u64,
    last_writer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
enum DemoEvent {
    #[serde(rename = "PING")]
    Ping { from: String },
}

impl CustomEvent for DemoEvent {
    fn event_type(&self) -> &str {
        match self {
            DemoEvent::Ping { .. } => "PING",
        }
    }
}

type DemoStore = Arc<UniversalStore<DemoState, DemoEvent>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    init_tracing(&config.logging);

    match cli.command {
        Command::Demo {
            followers,
            updates,
            debug,
        } => run_demo(&config, followers, updates, debug || config.stores.debug).await,
        Command::CheckConfig => {
            let rendered = toml::to_string_pretty(&config).context("rendering config")?;
            println!("{}", rendered);
            Ok(())
        }
    }
}

async fn run_demo(config: &Config, followers: usize, updates: u64, debug: bool) -> anyhow::Result<()> {
    let hub = ChannelHub::new();
    let leader_env = config.runtime.environment;

    let leader_registry = StoreRegistry::new(RuntimeContext::new());
    let leader: DemoStore = leader_registry.create_or_reuse(
        StoreOptions::leader(DEMO_STORE_ID)
            .with_initial_state(DemoState {
                count: 0,
                last_writer: leader_env.to_string(),
            })
            .with_debug(debug),
    )?;
    leader_registry
        .runtime()
        .bind(hub.connect(&leader_env.to_string()), leader_env);
    leader.until_ready().await?;

    // Follower registries and ping subscriptions stay alive for the whole
    // demo; dropping a registry would drop its stores.
    let mut follower_registries = Vec::with_capacity(followers);
    let mut replicas: Vec<DemoStore> = Vec::with_capacity(followers);
    let mut pings: Vec<Subscription> = Vec::with_capacity(followers);
    for index in 0..followers {
        let environment = follower_environment(leader_env, index);
        let registry = StoreRegistry::new(RuntimeContext::new());

        // Created before the binding resolves; preparation runs on bind.
        let replica: DemoStore = registry
            .create_or_reuse(StoreOptions::follower(DEMO_STORE_ID).with_debug(debug))?;
        let label = format!("{}#{}", environment, index);
        let ping = replica.subscribe_to("PING", move |event, info| {
            if let StoreEvent::Custom(DemoEvent::Ping { from }) = event {
                println!("[{}] ping from {} (actor {})", label, from, info.actor.id);
            }
        });

        registry
            .runtime()
            .bind(hub.connect(&format!("{}#{}", environment, index)), environment);
        replica
            .until_ready()
            .await
            .with_context(|| format!("follower {} failed to sync", index))?;

        follower_registries.push(registry);
        replicas.push(replica);
        pings.push(ping);
    }

    // One writer at a time: each write is awaited on every replica before
    // the next one starts.
    for round in 0..updates {
        leader.update_state(|state| DemoState {
            count: state.count + 1,
            last_writer: leader_env.to_string(),
        })?;
        wait_for_convergence(&leader, &replicas).await?;

        let Some(replica) = replicas.get(round as usize % replicas.len().max(1)) else {
            continue;
        };
        let writer = replica.actor().environment.to_string();
        replica.update_state(|state| DemoState {
            count: state.count + 1,
            last_writer: writer,
        })?;
        let written = replica.get_state();
        wait_until("leader to apply the follower's update", || {
            leader.get_state() == written
        })
        .await?;
        wait_for_convergence(&leader, &replicas).await?;

        replica.send(DemoEvent::Ping {
            from: replica.actor().environment.to_string(),
        })?;
    }

    let expected = leader.get_state();
    println!("leader   {}: {:?}", leader.actor(), expected);
    for replica in &replicas {
        println!("follower {}: {:?}", replica.actor(), replica.get_state());
        if replica.get_state() != expected {
            bail!("replica {} did not converge", replica.actor());
        }
    }

    Ok(())
}

async fn wait_for_convergence(leader: &DemoStore, replicas: &[DemoStore]) -> anyhow::Result<()> {
    wait_until("replicas to converge", || {
        let expected = leader.get_state();
        replicas.iter().all(|replica| replica.get_state() == expected)
    })
    .await
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + CONVERGE_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out after {:?} waiting for {}", CONVERGE_TIMEOUT, what);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    Ok(())
}

fn follower_environment(leader: EnvironmentId, index: usize) -> EnvironmentId {
    let candidates: Vec<EnvironmentId> = [
        EnvironmentId::Server,
        EnvironmentId::Manager,
        EnvironmentId::Preview,
    ]
    .into_iter()
    .filter(|environment| *environment != leader)
    .collect();
    candidates[index % candidates.len()]
}
