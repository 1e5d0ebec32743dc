//! gRPC front end of the lockstep broker.

mod auth;
mod config;
mod error;
mod service;

use std::future::Future;
use std::sync::Arc;

use lockstep_core::broker::AuthConfig;
use lockstep_core::Broker;
use lockstep_proto::lockstep_service_server::LockstepServiceServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

pub use auth::{SharedKeyAuth, AUTHORIZATION, SCHEME};
pub use config::{load_config, ConfigLoadError, DEFAULT_CONFIG_PATHS};
pub use error::IntoStatus;
pub use service::{LockstepGrpc, DEFAULT_WAIT_MS, MAX_WAIT_MS};

/// Serve the broker on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    broker: Arc<Broker>,
    auth: &AuthConfig,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()> + Send,
{
    if auth.shared_keys.is_empty() {
        info!("shared key authentication disabled");
    }

    let service = LockstepServiceServer::with_interceptor(
        LockstepGrpc::new(broker),
        SharedKeyAuth::new(&auth.shared_keys),
    );

    Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
}
