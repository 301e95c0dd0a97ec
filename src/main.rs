use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ember::config::{CoordinatorConfig, WorkerConfig};
use ember::coordinator::{self, CoordinatorState, SubmitResponse};
use ember::jobs;
use ember::kvs::{HttpKvs, HttpStorageFactory};
use ember::logic::LogicRegistry;
use ember::shutdown::install_shutdown_handler;
use ember::worker::{self, WorkerState};

#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(version)]
#[command(about = "A small distributed dataflow engine")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start a coordinator
    Coordinator(CoordinatorArgs),

    /// Start a worker
    Worker(WorkerArgs),

    /// Submit a job to a running coordinator
    Submit(SubmitArgs),
}

#[derive(Parser, Debug)]
struct CoordinatorArgs {
    /// Port to listen on
    #[arg(long, default_value = "9000")]
    port: u16,

    /// Address of the key-value store coordinator (host:port)
    #[arg(long, default_value = "127.0.0.1:8000")]
    kvs: String,

    /// Address workers use to reach this coordinator, if it differs
    /// from the listen address
    #[arg(long)]
    advertise: Option<String>,

    /// Directory for persisted code packages
    #[arg(long, default_value = ".")]
    package_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Port to listen on
    #[arg(long, default_value = "9001")]
    port: u16,

    /// Address of the coordinator (host:port)
    #[arg(long, default_value = "127.0.0.1:9000")]
    coordinator: String,

    /// Directory for the worker's identity and pushed code packages
    #[arg(long, default_value = "ember-worker")]
    storage_dir: PathBuf,

    /// Milliseconds between heartbeats
    #[arg(long, default_value = "5000")]
    heartbeat_ms: u64,
}

#[derive(Parser, Debug)]
struct SubmitArgs {
    /// Address of the coordinator (host:port)
    #[arg(long, default_value = "127.0.0.1:9000")]
    coordinator: String,

    /// Path to the code package to ship
    #[arg(long)]
    package: PathBuf,

    /// Name of the registered entry point to run
    #[arg(long)]
    entry: String,

    /// Arguments passed to the entry point, in order
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Coordinator(args) => run_coordinator(args).await,
        Commands::Worker(args) => run_worker(args).await,
        Commands::Submit(args) => run_submit(args).await,
    }
}

fn bundled_logic() -> Arc<LogicRegistry> {
    let mut registry = LogicRegistry::new();
    jobs::register(&mut registry);
    registry.into_shared()
}

async fn run_coordinator(args: CoordinatorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr: SocketAddr = format!("127.0.0.1:{}", args.port).parse()?;
    let mut config =
        CoordinatorConfig::new(listen_addr, args.kvs).with_package_dir(args.package_dir);
    if let Some(advertise) = args.advertise {
        config.advertise_addr = advertise;
    }

    let kvs = Arc::new(HttpKvs::new(config.kvs_addr.clone()));
    let state = CoordinatorState::new(config.clone(), bundled_logic(), kvs);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    let shutdown = install_shutdown_handler();
    coordinator::serve(state, listener, shutdown).await?;
    Ok(())
}

async fn run_worker(args: WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr: SocketAddr = format!("127.0.0.1:{}", args.port).parse()?;
    let config = WorkerConfig::new(listen_addr, args.coordinator)
        .with_storage_dir(args.storage_dir)
        .with_heartbeat_interval_ms(args.heartbeat_ms);

    let worker_id = worker::worker_identity(&config.storage_dir).await?;
    tracing::info!(worker_id = %worker_id, "Worker identity loaded");

    let state = Arc::new(WorkerState {
        config: config.clone(),
        storage: Arc::new(HttpStorageFactory::new()),
        registry: bundled_logic(),
    });

    let shutdown = install_shutdown_handler();
    tokio::spawn(worker::heartbeat_loop(
        config.clone(),
        worker_id,
        shutdown.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    worker::serve(state, listener, shutdown).await?;
    Ok(())
}

async fn run_submit(args: SubmitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let package = tokio::fs::read(&args.package).await?;

    let url = format!("http://{}/submit", args.coordinator);
    let mut request = reqwest::Client::new()
        .post(&url)
        .query(&[("entry", args.entry.as_str())]);
    for (i, arg) in args.args.iter().enumerate() {
        request = request.query(&[(format!("arg{}", i + 1), arg)]);
    }

    let response = request.body(package).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        let parsed: SubmitResponse = serde_json::from_str(&body)?;
        for failure in &parsed.upload_failures {
            eprintln!("warning: package upload failed on {failure}");
        }
        println!("{}", parsed.output);
        Ok(())
    } else {
        eprintln!("*** JOB FAILED ({status}) ***");
        eprintln!("{body}");
        std::process::exit(1);
    }
}
