//! Taskmesh command-line entry point: config loading, workflow validation,
//! and the `serve` command that wires the gateway together.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use taskmesh_core::{WorkflowDefinition, WorkflowStore};
use taskmesh_executor::WorkflowExecutor;
use taskmesh_gateway::{AppState, GatewayServer};
use taskmesh_planner::{compute_waves, CriticalPath, DependencyGraph, ExecutionPlanner};
use taskmesh_registry::{
    HealthConfig, HealthMonitor, OptimizationHook, TaskDispatcher, WorkerRegistry,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskmesh", about = "Taskmesh — workflow planning and execution engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "taskmesh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestration gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect configured workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// List configured workflows
    List,
    /// Check workflows for cycles and dangling dependencies
    Validate,
}

#[derive(Debug, Deserialize)]
struct TaskmeshConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    health: HealthSettings,
    #[serde(default)]
    workers: Vec<WorkerEntry>,
    #[serde(default)]
    workflows: Vec<WorkflowDefinition>,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthSettings {
    #[serde(default = "default_probe_interval_secs")]
    probe_interval_secs: u64,
    #[serde(default = "default_probe_timeout_ms")]
    probe_timeout_ms: u64,
    #[serde(default = "default_optimization_interval_secs")]
    optimization_interval_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            optimization_interval_secs: default_optimization_interval_secs(),
        }
    }
}

impl From<&HealthSettings> for HealthConfig {
    fn from(settings: &HealthSettings) -> Self {
        Self {
            probe_interval: Duration::from_secs(settings.probe_interval_secs),
            probe_timeout: Duration::from_millis(settings.probe_timeout_ms),
            optimization_interval: Duration::from_secs(settings.optimization_interval_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WorkerEntry {
    capability: String,
    endpoint: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_probe_interval_secs() -> u64 {
    30
}
fn default_probe_timeout_ms() -> u64 {
    2_000
}
fn default_optimization_interval_secs() -> u64 {
    120
}

/// Evicts expired plans on the health loop's slow tick.
struct CacheSweepHook {
    planner: Arc<ExecutionPlanner>,
}

#[async_trait]
impl OptimizationHook for CacheSweepHook {
    fn name(&self) -> &str {
        "plan-cache-sweep"
    }
    async fn run(&self) {
        self.planner.sweep_cache().await;
    }
}

/// Read and parse the TOML config, naming the path on failure.
async fn load_config(path: &Path) -> anyhow::Result<TaskmeshConfig> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
    Ok(toml::from_str(&raw)?)
}

/// Register configured workflows, rejecting cyclic or dangling graphs up
/// front so a bad definition never reaches the planner at request time.
fn build_store(workflows: Vec<WorkflowDefinition>) -> anyhow::Result<WorkflowStore> {
    let mut store = WorkflowStore::new();
    for mut workflow in workflows {
        if workflow.estimated_total_duration_ms == 0 {
            workflow.estimated_total_duration_ms = workflow
                .steps
                .iter()
                .map(|s| s.estimated_duration_ms)
                .sum();
        }
        let graph = DependencyGraph::build(&workflow.steps)
            .map_err(|e| anyhow::anyhow!("workflow '{}': {}", workflow.id, e))?;
        CriticalPath::analyze(&graph, &workflow.steps)
            .map_err(|e| anyhow::anyhow!("workflow '{}': {}", workflow.id, e))?;
        store
            .register(workflow)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            let store = Arc::new(build_store(config.workflows)?);
            info!(workflows = store.len(), "Workflows registered");

            let registry = Arc::new(WorkerRegistry::new());
            for worker in &config.workers {
                let id = registry.register(&worker.capability, &worker.endpoint).await;
                info!(
                    worker_id = %id,
                    capability = %worker.capability,
                    endpoint = %worker.endpoint,
                    "Worker registered"
                );
            }

            let planner = Arc::new(ExecutionPlanner::new(store.clone()));
            let dispatcher = Arc::new(TaskDispatcher::new(registry.clone()));
            let executor = Arc::new(WorkflowExecutor::new(
                store,
                planner.clone(),
                dispatcher.clone(),
            ));

            let health = Arc::new(
                HealthMonitor::new(registry.clone(), HealthConfig::from(&config.health))
                    .with_hook(Arc::new(CacheSweepHook {
                        planner: planner.clone(),
                    })),
            );
            let _health_loop = health.clone().start();

            let state = Arc::new(AppState {
                registry,
                dispatcher,
                planner,
                executor,
                health,
            });
            let app = GatewayServer::build(state);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Taskmesh gateway listening on {}", addr);
            axum::serve(listener, app).await?;
        }
        Commands::Workflow { action } => match action {
            WorkflowAction::List => {
                if config.workflows.is_empty() {
                    println!("No workflows configured.");
                    println!("Define workflows in taskmesh.toml under [[workflows]]");
                } else {
                    println!("Configured workflows:");
                    for workflow in &config.workflows {
                        let total: u64 = workflow
                            .steps
                            .iter()
                            .map(|s| s.estimated_duration_ms)
                            .sum();
                        println!(
                            "  {} — {} ({} steps, ~{}s)",
                            workflow.id,
                            workflow.name,
                            workflow.steps.len(),
                            total / 1000
                        );
                    }
                }
            }
            WorkflowAction::Validate => {
                for workflow in &config.workflows {
                    let graph = DependencyGraph::build(&workflow.steps)
                        .map_err(|e| anyhow::anyhow!("workflow '{}': {}", workflow.id, e))?;
                    let critical = CriticalPath::analyze(&graph, &workflow.steps)
                        .map_err(|e| anyhow::anyhow!("workflow '{}': {}", workflow.id, e))?;
                    let phases = compute_waves(&workflow.steps)
                        .map_err(|e| anyhow::anyhow!("workflow '{}': {}", workflow.id, e))?;
                    println!(
                        "{}: ok — {} phases, critical path {:?} (~{}s)",
                        workflow.id,
                        phases.len(),
                        critical.path,
                        critical.total_duration_ms / 1000
                    );
                }
                println!("All workflows valid.");
            }
        },
    }

    Ok(())
}
