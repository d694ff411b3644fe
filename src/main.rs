use chess_arena::{router, ArenaConfig, ArenaService};

#[shuttle_runtime::main]
async fn main() -> shuttle_axum::ShuttleAxum {
    // Initialize logger
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }

    let service = ArenaService::new(ArenaConfig::default())
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let app = router(service);

    log::info!("Starting chess arena v{}", chess_arena::VERSION);

    Ok(app.into())
}
