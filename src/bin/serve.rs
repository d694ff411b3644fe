use chess_arena::{router, ArenaConfig, ArenaService};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = ArenaConfig::parse();
    let service = ArenaService::new(config.clone())?;
    let app = router(service.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    log::info!("🚀 Chess arena v{} listening on {}", chess_arena::VERSION, config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for ctrl-c: {}", e);
            }
        })
        .await?;

    service.registry().shutdown().await;
    log::info!("👋 Chess arena stopped");
    Ok(())
}
