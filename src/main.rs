use std::sync::Arc;

use cachet::app::{self, AppState};
use cachet::config::AppConfig;
use cachet::database::JsonFileStore;
use cachet::server::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    info!(
        data_dir = %config.data_dir.display(),
        collection = %config.collection,
        cache_key = %config.cache_key,
        ttl_secs = config.cache_ttl.as_secs(),
        "starting cachet"
    );

    let store = Arc::new(JsonFileStore::new(&config.data_dir));
    let cache = app::cache_backend(&config).await;
    let pipeline = app::pipeline(Arc::new(AppState::new(&config, store, cache)));

    let server = Server::bind(config.bind_addr())
        .await?
        .max_request_bytes(config.max_request_bytes);

    server
        .run_with_shutdown(
            move |request| {
                let pipeline = pipeline.clone();
                async move { pipeline.handle(request).await }
            },
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "cannot listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
            },
        )
        .await?;

    info!("cachet stopped");
    Ok(())
}
