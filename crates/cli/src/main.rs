//! `jobmon` CLI entry-point — every process that makes up the control
//! plane (server, swarm, distributor, reaper) plus the read-only admin
//! commands, in one binary.
//!
//! Available sub-commands:
//! - `serve`        — start the API server.
//! - `migrate`       — run pending database migrations.
//! - `validate`      — validate a client-authored workflow DAG JSON file.
//! - `swarm`         — bind/resume a workflow run and drive it to completion.
//! - `distributor`   — run the polling loop for one (cluster, workflow run).
//! - `reap`          — run the reaper sweep loop.
//! - `workflow`      — query workflow/task status.
//! - `task`          — query task status and dependencies.

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use client::Requester;
use config_crate::JobmonConfig;

#[derive(Parser)]
#[command(name = "jobmon", about = "HPC workflow orchestration control plane", version)]
struct Cli {
    /// Path to an ini-style config file; falls back to JOBMON__CONFIG_FILE,
    /// then built-in defaults.
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8070")]
        bind: String,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Validate a workflow DAG definition JSON file without binding it.
    Validate {
        /// Path to the workflow JSON file.
        path: std::path::PathBuf,
    },
    /// Bind (or resume) a workflow run and drive it to completion.
    Swarm {
        #[arg(long)]
        tool_version_id: i64,
        #[arg(long)]
        dag_id: i64,
        #[arg(long)]
        workflow_args_hash: String,
        #[arg(long)]
        task_hash: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 10_000)]
        max_concurrently_running: i32,
        /// Bump resources on tasks whose latest instance hit a resource
        /// error, before starting this run.
        #[arg(long)]
        increase_resources: bool,
    },
    /// Run the polling loop that submits and monitors one cluster's work
    /// for a given workflow run.
    Distributor {
        #[arg(long)]
        cluster_id: i64,
        #[arg(long)]
        workflow_run_id: i64,
    },
    /// Run the reaper sweep loop.
    Reap,
    /// Workflow queries.
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },
    /// Task queries.
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
}

#[derive(Subcommand)]
enum WorkflowCommand {
    /// Print a workflow's current row.
    Status { workflow_id: i64 },
    /// Print every task's status under a workflow.
    Tasks { workflow_id: i64 },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Print a task's current row.
    Status { task_id: i64 },
    /// Print a task's upstream or downstream dependencies.
    Dependencies {
        task_id: i64,
        #[arg(long, value_enum, default_value_t = Direction::Down)]
        direction: Direction,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum Direction {
    Up,
    Down,
}

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = JobmonConfig::load(cli.config).expect("failed to load configuration");

    match cli.command {
        Command::Serve { bind } => {
            info!("starting jobmon-server on {bind}");
            let pool = db::pool::create_pool(&config.db.url, config.db.pool_size)
                .await
                .expect("failed to connect to database");
            api::serve(&bind, pool).await.expect("server exited with an error");
        }

        Command::Migrate { database_url } => {
            info!("running migrations against {database_url}");
            let pool = db::pool::create_pool(&database_url, 2)
                .await
                .expect("failed to connect to database");
            db::pool::run_migrations(&pool).await.expect("migration failed");
            info!("migrations applied successfully");
        }

        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("cannot read file {}: {e}", path.display()));

            let workflow: engine::models::ClientWorkflow =
                serde_json::from_str(&content).unwrap_or_else(|e| panic!("invalid JSON: {e}"));

            match engine::dag::validate_dag(&workflow) {
                Ok(order) => println!("workflow is valid, execution order: {order:?}"),
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }

        Command::Swarm {
            tool_version_id,
            dag_id,
            workflow_args_hash,
            task_hash,
            name,
            max_concurrently_running,
            increase_resources,
        } => {
            let requester = requester_from_config(&config);

            let (workflow, run) = swarm::factory::bind_and_resume(
                &requester,
                tool_version_id,
                dag_id,
                &workflow_args_hash,
                &task_hash,
                name.as_deref(),
                max_concurrently_running,
                SERVER_VERSION,
                increase_resources,
            )
            .await
            .expect("failed to bind/resume workflow run");

            info!(workflow_id = workflow.id, workflow_run_id = run.id, "workflow run linked");

            let mut swarm_run = swarm::SwarmRun::start(
                requester,
                &workflow,
                run.id,
                config.distributor.max_batch_size as usize,
                Duration::from_secs_f64(config.heartbeat.interval_seconds),
                config.heartbeat.report_by_buffer,
            )
            .await
            .expect("failed to load workflow run state");

            let status = swarm_run
                .run_to_completion(Duration::from_secs(10))
                .await
                .expect("swarm run failed");

            info!(%status, "workflow run reached a terminal status");
        }

        Command::Distributor { cluster_id, workflow_run_id } => {
            let requester = requester_from_config(&config);
            let gateway = distributor::Gateway::new(requester);
            let driver = distributor::driver_for_cluster(&config.distributor.cluster);

            let loop_ = distributor::DistributorLoop::start(
                gateway,
                driver,
                cluster_id,
                workflow_run_id,
                config.heartbeat.interval_seconds * config.heartbeat.report_by_buffer,
                config.distributor.concurrent_submissions as usize,
            )
            .await
            .expect("failed to register distributor instance");

            info!(cluster_id, workflow_run_id, "distributor registered, entering poll loop");
            loop_
                .run_forever(Duration::from_secs_f64(config.distributor.poll_interval_seconds))
                .await
                .expect("distributor loop exited with an error");
        }

        Command::Reap => {
            let requester = requester_from_config(&config);
            let gateway = reaper::Gateway::new(requester);
            let notifier: Box<dyn reaper::Notifier> = Box::new(reaper::TracingNotifier::default());
            let loop_ = reaper::ReaperLoop::new(gateway, notifier, config.reaper.fix_status_step);

            info!("reaper entering sweep loop");
            loop_.run_forever(Duration::from_secs_f64(config.reaper.sweep_interval_seconds)).await;
        }

        Command::Workflow { command } => run_workflow_command(&config, command).await,
        Command::Task { command } => run_task_command(&config, command).await,
    }
}

fn requester_from_config(config: &JobmonConfig) -> Requester {
    Requester::new(config.http.service_url.clone(), Duration::from_secs_f64(config.http.retries_timeout))
}

async fn run_workflow_command(config: &JobmonConfig, command: WorkflowCommand) {
    let requester = requester_from_config(config);
    match command {
        WorkflowCommand::Status { workflow_id } => {
            let route = format!("/api/v1/cli/workflow/{workflow_id}");
            print_json(&requester, &route).await;
        }
        WorkflowCommand::Tasks { workflow_id } => {
            let route = format!("/api/v1/cli/workflow/{workflow_id}/tasks");
            print_json(&requester, &route).await;
        }
    }
}

async fn run_task_command(config: &JobmonConfig, command: TaskCommand) {
    let requester = requester_from_config(config);
    match command {
        TaskCommand::Status { task_id } => {
            let route = format!("/api/v1/cli/task/{task_id}");
            print_json(&requester, &route).await;
        }
        TaskCommand::Dependencies { task_id, direction } => {
            let suffix = match direction {
                Direction::Up => "up",
                Direction::Down => "down",
            };
            let route = format!("/api/v1/cli/task/{task_id}/dependencies/{suffix}");
            print_json(&requester, &route).await;
        }
    }
}

async fn print_json(requester: &Requester, route: &str) {
    let (_, content) = requester.get(route, &[]).await.expect("request failed");
    println!("{}", serde_json::to_string_pretty(&content).unwrap());
}
