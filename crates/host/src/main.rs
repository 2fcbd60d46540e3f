use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use md_web_host::config::Config;
use md_web_host::ws::{self, ServerState};
use tokio::signal;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_banner() {
    eprintln!();
    eprintln!("  \x1b[1;36mmd-web\x1b[0m \x1b[2mv{VERSION}\x1b[0m");
    eprintln!("  \x1b[2;37mRich Markdown editing, host side.\x1b[0m");
    eprintln!();
}

fn print_help() {
    println!("md-web - Markdown editor host");
    println!();
    println!("USAGE:");
    println!("    md-web [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config FILE  Config file to load");
    println!("    -p, --port PORT    WebSocket port");
    println!("    -b, --bind ADDR    Address to bind");
    println!("    -h, --help         Print help information");
    println!("    -v, --version      Print version");
    println!();
    println!("CONFIG:");
    println!("    ~/.config/md-web/config.toml");
    println!();
    println!("VIEWS CONNECT TO:");
    println!("    ws://<bind>:<port>/?doc=<url-encoded document path>");
}

/// Graceful start: Check if port is available
fn check_port_available(bind: &str, port: u16) -> bool {
    TcpListener::bind(format!("{bind}:{port}")).is_ok()
}

/// Graceful start: Find available port starting from default
fn find_available_port(bind: &str, start: u16) -> Option<u16> {
    (start..start.saturating_add(10)).find(|&port| check_port_available(bind, port))
}

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    port: Option<u16>,
    bind: Option<String>,
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--config" | "-c", Some(v)) => parsed.config = Some(PathBuf::from(v)),
            ("--port" | "-p", Some(v)) => {
                parsed.port = Some(v.parse().map_err(|e| anyhow::anyhow!("invalid port {v}: {e}"))?);
            }
            ("--bind" | "-b", Some(v)) => parsed.bind = Some(v.clone()),
            (flag, _) => anyhow::bail!("unrecognized argument {flag}"),
        }
        i += 2;
    }
    Ok(parsed)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging (tracing)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if let Some(first) = args.get(1) {
        match first.as_str() {
            "--version" | "-v" => {
                println!("md-web {VERSION}");
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {}
        }
    }
    let args = parse_args(&args)?;

    print_banner();

    // === LOAD CONFIGURATION ===
    let mut config = if let Some(path) = &args.config {
        Config::load_from_path(path)?
    } else {
        Config::create_default_if_missing();
        Config::load()
    };
    let source = args.config.clone().unwrap_or_else(Config::default_config_path);
    tracing::info!(path = %source.display(), "Configuration loaded");

    if let Some(port) = args.port {
        config.server.ws_port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    // === GRACEFUL START ===
    let ws_port = if check_port_available(&config.server.bind, config.server.ws_port) {
        config.server.ws_port
    } else {
        tracing::warn!(port = config.server.ws_port, "Port in use, finding alternative");
        find_available_port(&config.server.bind, config.server.ws_port.saturating_add(1)).ok_or_else(|| {
            anyhow::anyhow!(
                "no available WS ports in range {}-{}",
                config.server.ws_port,
                config.server.ws_port.saturating_add(10)
            )
        })?
    };

    let state = Arc::new(ServerState::from_config(&config));
    eprintln!(
        "  \x1b[1;32m[ws]\x1b[0m     Views connect at \x1b[4;96mws://{}:{ws_port}/?doc=...\x1b[0m",
        config.server.bind
    );
    eprintln!("  \x1b[2mPress Ctrl+C to stop\x1b[0m");
    eprintln!();

    tokio::select! {
        result = ws::serve(state.clone(), &config.server.bind, ws_port) => {
            result?;
        }
        () = shutdown_signal() => {
            tracing::info!("Graceful shutdown initiated");
            let closed = state.close_all(Duration::from_secs(5)).await;
            tracing::info!(sessions = closed, "All sessions flushed");
        }
    }

    Ok(())
}
