// CHIRP host: discovery daemon and raw listen tool.

mod config;

use std::sync::Arc;

use chirp_core::{BroadcastReceiver, Manager, Message, RegisteredService, CHIRP_PORT};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("chirp-cli {} — CHIRP service discovery", VERSION);
    println!();
    println!("USAGE:");
    println!("    chirp-cli [OPTIONS] [listen]");
    println!();
    println!("MODES:");
    println!("    (default)        Run the discovery daemon: announce the configured");
    println!("                     services and log peers appearing and leaving");
    println!("    listen           Dump every CHIRP message seen on UDP {}", CHIRP_PORT);
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print this help message and exit");
    println!("    -V, --version    Print version and exit");
    println!();
    println!("CONFIGURATION:");
    println!("    Config file (optional, first found wins):");
    println!("      ~/.config/chirp/config.toml");
    println!("      /etc/chirp/config.toml");
    println!();
    println!("    Example config.toml:");
    println!("      group = \"lab\"");
    println!("      name = \"bench-1\"");
    println!("      broadcast_addr = \"192.168.1.255\"");
    println!();
    println!("      [[services]]");
    println!("      kind = \"control\"");
    println!("      port = 9001");
    println!();
    println!("ENVIRONMENT VARIABLES (override config file):");
    println!("    CHIRP_GROUP            Group name");
    println!("    CHIRP_NAME             Instance name");
    println!("    CHIRP_BROADCAST_ADDR   Broadcast destination address");
    println!("    CHIRP_ANY_ADDR         Receive bind address");
    println!();
    println!("    Stop with Ctrl+C or SIGTERM; registered services are withdrawn");
    println!("    with a LEAVING broadcast on the way out.");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut listen = false;
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("chirp-cli {}", VERSION);
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "listen" => listen = true,
            other => {
                eprintln!("chirp-cli: unknown option '{}'\n", other);
                print_help();
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load();
    let rt = tokio::runtime::Runtime::new()?;
    if listen {
        rt.block_on(run_listen(cfg))
    } else {
        rt.block_on(run_daemon(cfg))
    }
}

async fn run_daemon(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        group = %cfg.group,
        name = %cfg.name,
        broadcast = %cfg.broadcast_addr,
        "chirp daemon starting"
    );

    let manager = Manager::new(cfg.broadcast_addr, cfg.any_addr, &cfg.group, &cfg.name).await?;
    manager
        .register_callback(Arc::new(|service, departed| {
            if departed {
                tracing::info!(
                    peer = %service.name_hash,
                    kind = %service.identifier,
                    port = service.port,
                    "peer service departed"
                );
            } else {
                tracing::info!(
                    peer = %service.name_hash,
                    kind = %service.identifier,
                    port = service.port,
                    address = %service.address,
                    "peer service discovered"
                );
            }
        }))
        .await;
    manager.start();

    for entry in &cfg.services {
        match entry.identifier() {
            Some(identifier) => {
                let service = RegisteredService {
                    identifier,
                    port: entry.port,
                };
                if manager.register_service(service).await {
                    tracing::info!(kind = %identifier, port = entry.port, "registered service");
                }
            }
            None => tracing::warn!(kind = %entry.kind, "skipping service with unknown kind"),
        }
    }

    // Ask peers that announced before we were listening to re-announce.
    for kind in &cfg.watch {
        match kind.parse() {
            Ok(identifier) => manager.send_request(identifier).await,
            Err(_) => tracing::warn!(kind = %kind, "skipping watch with unknown kind"),
        }
    }

    shutdown_signal().await?;
    manager.shutdown().await;
    Ok(())
}

/// Dump every CHIRP message seen on the port, whatever the group.
async fn run_listen(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let receiver = BroadcastReceiver::bind(cfg.any_addr, CHIRP_PORT).await?;
    tracing::info!(port = CHIRP_PORT, "listening for CHIRP broadcasts");

    loop {
        let datagram = receiver.recv().await?;
        match Message::parse(&datagram.content) {
            Ok(msg) => {
                println!("-----------------------------------------");
                println!("Source:  {}", datagram.source);
                println!("Type:    {}", msg.kind);
                println!("Group:   {}", msg.group_hash);
                println!("Name:    {}", msg.name_hash);
                println!("Service: {}", msg.identifier);
                println!("Port:    {}", msg.port);
            }
            Err(e) => {
                tracing::debug!(source = %datagram.source, error = %e, "not a CHIRP message");
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
