/**
 * FLEETWATCH KERNEL - Point d'entrée du serveur
 *
 * RÔLE : charge la config, ouvre le pool de sessions SQLite, câble l'agrégation
 * santé et sert l'API REST.
 */

use anyhow::{Context, Result};
use fleet_kernel::{build_router, build_state, load_config, SessionPool, SqliteStore};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("FLEETWATCH_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = load_config().await;
    if !cfg.store.path.exists() {
        anyhow::bail!("fleet database not found at {}", cfg.store.path.display());
    }

    let pool = SessionPool::new(&cfg.store);
    info!(
        path = %cfg.store.path.display(),
        max_sessions = cfg.store.max_sessions,
        "[kernel] store pool ready"
    );
    let app = build_router(build_state(&cfg, SqliteStore::new(pool.clone())));

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind))?;
    info!("[kernel] listening on http://{}", cfg.http.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("http server failed")?;

    pool.close();
    info!("[kernel] shutdown complete");
    Ok(())
}
