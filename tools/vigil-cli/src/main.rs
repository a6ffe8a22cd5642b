use clap::{Parser, Subcommand};
use serde_json::Value;
use vigil_core::api::{
    DependencyRequest, DependencyResponse, EdgeListResponse, EventListResponse,
    LeaseListResponse, NodeDetailResponse, NodeListResponse, ScheduleBinding,
    ScheduleListResponse,
};
use vigil_core::{endpoints, NodeRef, Schedule, ScheduleId, ScheduleThresholds, Status};

mod client;

use client::ApiClient;

#[derive(Debug, Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil CLI - Lease and health status management")]
#[command(version = vigil_core::VERSION)]
struct Cli {
    /// Coordinator base URL
    #[arg(
        long,
        global = true,
        env = "VIGIL_COORDINATOR_URL",
        default_value = "http://127.0.0.1:8081"
    )]
    coordinator: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Lease inspection
    Lease {
        #[command(subcommand)]
        action: LeaseAction,
    },
    /// Status node inspection
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Dependency edge management
    Dep {
        #[command(subcommand)]
        action: DepAction,
    },
    /// Schedule management
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
    /// Recent status changes
    Events {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Coordinator health and counters
    Status,
}

#[derive(Debug, Subcommand)]
enum LeaseAction {
    /// List live leases
    List,
}

#[derive(Debug, Subcommand)]
enum NodeAction {
    /// List status nodes
    List {
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        kind: Option<String>,
    },
    /// Show one node, written `kind:id`
    Show { node: NodeRef },
}

#[derive(Debug, Subcommand)]
enum DepAction {
    /// Make PARENT depend on CHILD
    Add { parent: NodeRef, child: NodeRef },
    /// Remove the PARENT -> CHILD edge
    Remove { parent: NodeRef, child: NodeRef },
    /// List all edges
    List,
}

#[derive(Debug, Subcommand)]
enum ScheduleAction {
    /// List schedules
    List,
    /// Register or replace a schedule
    Add {
        id: ScheduleId,
        name: String,
        #[arg(long, default_value_t = 60)]
        interval: u64,
        #[arg(long, default_value_t = 1000)]
        warning_ms: u64,
        #[arg(long, default_value_t = 3000)]
        critical_ms: u64,
        /// Nodes probed by the schedule, comma separated
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<NodeRef>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let api = ApiClient::new(&cli.coordinator)?;

    match cli.command {
        Commands::Lease { action } => handle_lease_action(&api, action).await,
        Commands::Node { action } => handle_node_action(&api, action).await,
        Commands::Dep { action } => handle_dep_action(&api, action).await,
        Commands::Schedule { action } => handle_schedule_action(&api, action).await,
        Commands::Events { limit } => handle_events(&api, limit).await,
        Commands::Status => handle_status(&api).await,
    }
}

async fn handle_lease_action(api: &ApiClient, action: LeaseAction) -> anyhow::Result<()> {
    match action {
        LeaseAction::List => {
            let listing: LeaseListResponse = api.get(endpoints::API_V1_LEASES).await?;
            println!("🔒 {} live lease(s)", listing.total);
            for lease in listing.leases {
                println!(
                    "  {:<20} holder={} token={} expires={}",
                    lease.resource,
                    lease.agent_id,
                    lease.token,
                    lease.expires_at.to_rfc3339()
                );
            }
        }
    }
    Ok(())
}

async fn handle_node_action(api: &ApiClient, action: NodeAction) -> anyhow::Result<()> {
    match action {
        NodeAction::List { status, kind } => {
            let path = node_list_path(status, kind.as_deref());
            let listing: NodeListResponse = api.get(&path).await?;
            println!("📋 {} node(s)", listing.total);
            for node in listing.nodes {
                println!("  {:<20} {}", node.node.to_string(), node.status);
            }
        }
        NodeAction::Show { node } => {
            let path = node_path(&node);
            let detail: NodeDetailResponse = api.get(&path).await?;
            println!("🔍 {} is {}", detail.node.node, detail.node.status);
            println!("  updated:  {}", detail.node.last_updated.to_rfc3339());
            println!("  parents:  {}", join(&detail.parents));
            println!("  children: {}", join(&detail.children));
            for sample in detail.recent_samples.iter().rev() {
                let outcome = if sample.success {
                    "ok".to_string()
                } else {
                    sample.error_type.clone().unwrap_or_else(|| "failed".to_string())
                };
                let latency = sample
                    .response_time_ms
                    .map(|ms| format!("{}ms", ms))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  sample {} {} {}",
                    sample.executed_at.to_rfc3339(),
                    outcome,
                    latency
                );
            }
        }
    }
    Ok(())
}

async fn handle_dep_action(api: &ApiClient, action: DepAction) -> anyhow::Result<()> {
    match action {
        DepAction::Add { parent, child } => {
            let request = DependencyRequest { parent, child };
            let response: DependencyResponse =
                api.post(endpoints::API_V1_DEPENDENCIES, &request).await?;
            println!("➕ Added {}", response.edge);
            print_changes(&response);
        }
        DepAction::Remove { parent, child } => {
            let request = DependencyRequest { parent, child };
            let response: DependencyResponse =
                api.delete(endpoints::API_V1_DEPENDENCIES, &request).await?;
            if response.applied {
                println!("🗑️  Removed {}", response.edge);
                print_changes(&response);
            } else {
                println!("No edge {}", response.edge);
            }
        }
        DepAction::List => {
            let listing: EdgeListResponse = api.get(endpoints::API_V1_DEPENDENCIES).await?;
            println!("🔗 {} edge(s)", listing.total);
            for edge in listing.edges {
                println!("  {}", edge);
            }
        }
    }
    Ok(())
}

async fn handle_schedule_action(api: &ApiClient, action: ScheduleAction) -> anyhow::Result<()> {
    match action {
        ScheduleAction::List => {
            let listing: ScheduleListResponse = api.get(endpoints::API_V1_SCHEDULES).await?;
            println!("⏱️  {} schedule(s)", listing.total);
            for binding in listing.schedules {
                println!(
                    "  {:>4} {:<20} every {}s nodes: {}",
                    binding.schedule.id,
                    binding.schedule.name,
                    binding.schedule.interval_secs,
                    join(&binding.nodes)
                );
            }
        }
        ScheduleAction::Add {
            id,
            name,
            interval,
            warning_ms,
            critical_ms,
            nodes,
        } => {
            let schedule = Schedule::new(
                id,
                name,
                interval,
                ScheduleThresholds::new(warning_ms, critical_ms),
            )?;
            let binding = ScheduleBinding { schedule, nodes };
            let registered: ScheduleBinding =
                api.post(endpoints::API_V1_SCHEDULES, &binding).await?;
            println!(
                "➕ Registered schedule {} for {} node(s)",
                registered.schedule.id,
                registered.nodes.len()
            );
        }
    }
    Ok(())
}

async fn handle_events(api: &ApiClient, limit: usize) -> anyhow::Result<()> {
    let path = format!("{}?limit={}", endpoints::API_V1_EVENTS, limit);
    let listing: EventListResponse = api.get(&path).await?;
    for change in listing.events {
        println!(
            "{} {:<20} {} -> {}",
            change.at.to_rfc3339(),
            change.node.to_string(),
            change.old,
            change.new
        );
    }
    Ok(())
}

async fn handle_status(api: &ApiClient) -> anyhow::Result<()> {
    let health: Value = api.get(endpoints::HEALTH).await?;
    let metrics: Value = api.get(endpoints::METRICS).await?;
    println!("📊 Vigil Coordinator Status");
    println!(
        "🎯 {} {}",
        health["service"].as_str().unwrap_or("unknown"),
        health["version"].as_str().unwrap_or("?")
    );
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn print_changes(response: &DependencyResponse) {
    for change in &response.changes {
        println!("  {} {} -> {}", change.node, change.old, change.new);
    }
}

fn join(nodes: &[NodeRef]) -> String {
    if nodes.is_empty() {
        return "-".to_string();
    }
    nodes
        .iter()
        .map(NodeRef::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn node_path(node: &NodeRef) -> String {
    endpoints::API_V1_NODE
        .replace("{kind}", node.kind.as_str())
        .replace("{id}", &node.id.to_string())
}

fn node_list_path(status: Option<Status>, kind: Option<&str>) -> String {
    let mut params = Vec::new();
    if let Some(status) = status {
        params.push(format!("status={}", status));
    }
    if let Some(kind) = kind {
        params.push(format!("kind={}", kind));
    }
    if params.is_empty() {
        endpoints::API_V1_NODES.to_string()
    } else {
        format!("{}?{}", endpoints::API_V1_NODES, params.join("&"))
    }
}
