use relis::config::Config;
use relis::server;
use relis::store::Store;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_args(&args);

    // RUST_LOG wins over --loglevel when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_path = config.db_path();
    let store = match Store::open_with_timeout(&db_path, config.busy_timeout()) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open store at {db_path}: {e}");
            return Err(std::io::Error::other(e));
        }
    };
    info!("Using store at {db_path}");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    let result = server::run_server(store.clone(), config, shutdown).await;
    if let Err(e) = store.close() {
        error!("Failed to close store: {e}");
    }
    result
}
