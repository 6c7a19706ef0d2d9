use clap::Parser;
use edge_gateway::config::GatewayArgs;
use edge_gateway::state::AppState;
use edge_gateway::shutdown::shutdown_signal;
use edge_gateway::{handlers, maintenance, telemetry};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // parse cli arguments
    let args = GatewayArgs::parse();
    telemetry::init(args.log_format);

    let state = Arc::new(AppState::from_args(&args)?);

    tokio::spawn(maintenance::sweeper(Arc::clone(&state), args.prune_interval()));

    let app = handlers::router(Arc::clone(&state));

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API Gateway listening on port {}", args.port);
    info!(broker = %args.broker_url, "verifying tokens against identity broker");
    for route in state.routes.routes() {
        info!(
            prefix = %route.prefix,
            target = %route.target,
            protected = route.protected,
            "route"
        );
    }
    info!(
        "Rate limit: {} requests per {} seconds, cache TTL: {} seconds",
        args.rate_limit, args.rate_window, args.cache_ttl
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("gateway stopped");
    Ok(())
}
