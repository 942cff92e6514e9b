use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use calclabels::config::{
    LaunchConfig, RemoteAccessFile, ServiceConfig, StoreConfig, DEFAULT_PORT, DEFAULT_PROGRAM,
};
use calclabels::http::{run_server, AppState};
use calclabels::service::CalcService;
use calclabels::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "calclabels")]
#[command(version)]
#[command(about = "Launches label volume computations on a compute cluster")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service
    Serve(ServeArgs),

    /// Submit a calculation request (JSON file) to a running service
    Submit {
        #[command(flatten)]
        client: ClientArgs,

        /// Path to the JSON request
        request: PathBuf,
    },

    /// Poll the status behind a result-callback URL
    Status {
        #[command(flatten)]
        client: ClientArgs,

        /// The result-callback URL returned on submission
        callback: String,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Directory under which session directories are created
    staging_dir: PathBuf,

    /// Service proxy (host:port) used to discover the DVID server
    #[arg(long)]
    proxy: Option<String>,

    /// Port for the HTTP server
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// JSON file with remote-machine, remote-user and remote-environment.
    /// Without it the compute program runs on this machine.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Compute program invoked with the session directory
    #[arg(long, default_value = DEFAULT_PROGRAM)]
    program: String,

    /// Timeout in seconds for requests to the DVID server
    #[arg(long, default_value = "30")]
    store_timeout_secs: u64,
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Service address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:25125")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct SubmitOutput {
    #[serde(rename = "result-callback")]
    result_callback: String,
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tokio::fs::create_dir_all(&args.staging_dir)
        .await
        .map_err(|e| {
            format!(
                "cannot create staging directory {}: {}",
                args.staging_dir.display(),
                e
            )
        })?;
    let staging_root = tokio::fs::canonicalize(&args.staging_dir).await?;

    let launch = match &args.config {
        Some(path) => RemoteAccessFile::load(path)
            .await?
            .into_launch_config(args.program.clone())?,
        None => LaunchConfig::Local {
            program: args.program.clone(),
        },
    };

    let config = ServiceConfig {
        listen_addr: SocketAddr::from(([0, 0, 0, 0], args.port)),
        staging_root,
        store: StoreConfig {
            discovery_proxy: args.proxy.clone(),
            request_timeout: Duration::from_secs(args.store_timeout_secs),
        },
        launch,
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        staging_root = %config.staging_root.display(),
        proxy = ?config.store.discovery_proxy,
        remote = config.launch.is_remote(),
        program = config.launch.program(),
        "Starting calclabels service"
    );
    if config.store.discovery_proxy.is_none() {
        tracing::warn!("No proxy configured, requests must name their dvid-server");
    }

    let listen_addr = config.listen_addr;
    let service = CalcService::new(config)?;
    let shutdown = install_shutdown_handler();
    run_server(listen_addr, AppState { service }, shutdown).await?;

    tracing::info!("Server stopped");
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

fn service_url(addr: &str, path: &str) -> String {
    format!("{}/{}", addr.trim_end_matches('/'), path)
}

async fn handle_submit(
    client: &ClientArgs,
    request: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let body = tokio::fs::read(&request)
        .await
        .map_err(|e| format!("cannot read {}: {}", request.display(), e))?;

    let resp = reqwest::Client::new()
        .post(service_url(&client.addr, "calculation/"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;

    if !resp.status().is_success() {
        eprintln!("Error: Submission failed: {}", resp.text().await?);
        std::process::exit(1);
    }

    let value: serde_json::Value = resp.json().await?;
    let result_callback = value
        .get("result-callback")
        .and_then(|v| v.as_str())
        .ok_or("response carries no result-callback")?
        .to_string();

    match client.output {
        OutputFormat::Json => {
            let output = SubmitOutput { result_callback };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Job submitted successfully!");
            println!("Result callback: {}", result_callback);
        }
    }
    Ok(())
}

async fn handle_status(
    client: &ClientArgs,
    callback: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let resp = reqwest::Client::new()
        .get(service_url(&client.addr, &format!("jobstatus/{}", callback)))
        .send()
        .await?;

    let ok = resp.status().is_success();
    let body = resp.text().await?;
    if !ok {
        eprintln!("Error: {}", body);
        std::process::exit(1);
    }

    match client.output {
        OutputFormat::Json => println!("{}", body),
        OutputFormat::Table => {
            let status = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("status").and_then(|s| s.as_str()).map(String::from));
            match status {
                Some(status) => println!("Status: {}", status),
                None => println!("{}", body),
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Serve(serve_args) => serve(serve_args).await?,
        Commands::Submit { client, request } => handle_submit(&client, request).await?,
        Commands::Status { client, callback } => handle_status(&client, callback).await?,
    }

    Ok(())
}
