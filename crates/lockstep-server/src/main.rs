use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use lockstep_core::Broker;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lockstep-server", about = "Peek-lock message broker", version)]
struct Args {
    /// Configuration file (default: lockstep.toml, then /etc/lockstep/lockstep.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lockstep_core::telemetry::init_tracing();

    let args = Args::parse();
    let config = lockstep_server::load_config(args.config.as_deref())?;
    let listen_addr = config.server.listen_addr.clone();
    let auth = config.auth.clone();

    let broker = Arc::new(Broker::new(config)?);

    let listener = TcpListener::bind(&listen_addr).await?;
    info!(addr = %listener.local_addr()?, "starting gRPC server");

    lockstep_server::serve(listener, Arc::clone(&broker), &auth, shutdown_signal()).await?;

    info!("gRPC server stopped, shutting down broker");

    // Drop impl stops the scheduler once the last handle is gone
    drop(broker);

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("received shutdown signal");
}
