use clap::Parser;
use edge_gateway::config::BrokerArgs;
use edge_gateway::identity::{self, BrokerState, OidcProvider};
use edge_gateway::shutdown::shutdown_signal;
use edge_gateway::telemetry;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = BrokerArgs::parse();
    telemetry::init(args.log_format);

    let provider = OidcProvider::new(&args)?;
    let state = Arc::new(BrokerState {
        provider: Arc::new(provider),
    });
    let app = identity::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Auth-service listening on port {}", args.port);
    info!(idp = %args.idp_url, realm = %args.realm, "using identity provider");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("identity broker stopped");
    Ok(())
}
