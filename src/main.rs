use std::net::SocketAddr;
use std::sync::Arc;
use gallery_identity::utils::config::Config;
use gallery_identity::utils::logging;
use gallery_identity::{db, AppState};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();
    std::fs::create_dir_all(&cfg.data)?;
    let db_path = cfg.db_path();
    let pool = db::create_pool(&db_path, cfg.db_pool_size)?;
    info!("database at {} (eps={}, min_samples={})", db_path.display(), cfg.face_eps, cfg.face_min_samples);

    let state = Arc::new(AppState::new(cfg.clone(), pool));

    // Converge whatever state the database was left in before serving.
    {
        let pool = state.pool.clone();
        let engine = state.engine.clone();
        let startup = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let conn = pool.get()?;
            engine.resolve_identities(&conn)
        })
        .await?;
        if let Err(e) = startup {
            error!("startup identity resolution failed: {:#}", e);
        }
    }

    let app = gallery_identity::api::routes::router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}
