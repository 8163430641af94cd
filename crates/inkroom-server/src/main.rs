//! InkRoom WebSocket relay server binary.

use std::sync::Arc;

use inkroom_server::{AppState, LogMailer, ServerConfig, router};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkroom_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let addr = config.addr();
    let mailer = Arc::new(LogMailer::new(config.mail_from.clone()));
    let state = Arc::new(AppState::new(config, mailer));

    let app = router(state);

    info!("InkRoom relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws?sessionId=<id>&token=<credential>", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
