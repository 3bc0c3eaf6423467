use std::process;

use metrics::counter;
use snapcache::{
    cache::{CacheKey, SnapshotError, SnapshotStore},
    config::{self, Command, WipeArgs},
    telemetry::{self, TelemetryError},
};
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] config::LoadError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Store(#[from] SnapshotError),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Wipe(args) => run_wipe(&settings, args).await,
    }
}

async fn run_wipe(settings: &config::Settings, args: WipeArgs) -> Result<(), AppError> {
    let store = SnapshotStore::open(settings.cache.directory.clone())?;

    match args.url.as_deref() {
        Some(url) => {
            let key = CacheKey::for_path(url);
            store.delete(&key).await?;
            info!(url, %key, "snapshot removed");
        }
        None => {
            store.delete_all().await?;
            info!(directory = %settings.cache.directory.display(), "page cache wiped");
        }
    }

    counter!("snapcache_wipe_total").increment(1);
    Ok(())
}
