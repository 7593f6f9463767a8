mod app;
mod cli;
mod error;
mod logging;
mod terminal;

use crate::app::Services;
use crate::cli::Cli;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use libra_api::{Client, RemoteHandle};
use libra_config::Config;
use libra_library::SessionStore;
use libra_store::{Database, Repository};
use libra_sync::SyncWorker;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "libra-link stopped");
            eprintln!("libra-link: {e:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.overrides()).or_raise(|| ErrorKind::Config)?;
    let books_dir = config.books_dir();
    std::fs::create_dir_all(&books_dir).or_raise(|| ErrorKind::DataDir(books_dir.display().to_string()))?;
    logging::init(&config.log_path(), &config.log_level)?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        api_base_url = %config.api_base_url,
        "starting libra-link"
    );

    let db = Database::connect(config.database_path()).await.or_raise(|| ErrorKind::Database)?;
    let repo = Repository::from(&db);
    let client = Client::new(&config.api_base_url, config.http_timeout()).or_raise(|| ErrorKind::Client)?;
    let remote: RemoteHandle = Arc::new(client);

    let cancel = CancellationToken::new();
    let worker = SyncWorker::new(repo.clone(), Arc::clone(&remote))
        .with_interval(config.sync_interval())
        .with_batch_size(config.sync_batch_size());
    let services = Services {
        remote,
        session: SessionStore::new(repo.clone(), config.session_path()),
        repo,
        books_dir,
        sync: worker.handle(),
        cancel: cancel.clone(),
    };
    let sync_task = tokio::spawn(worker.run(cancel.clone()));

    let mut tui = terminal::enter().or_raise(|| ErrorKind::Terminal)?;
    let outcome = app::run(&mut tui, &services, config.splash_min()).await;
    terminal::restore().or_raise(|| ErrorKind::Terminal)?;
    cancel.cancel();

    let result = match outcome {
        Ok(mut state) => {
            app::flush(&mut state, &services).await;
            Ok(())
        },
        Err(e) => Err(e).or_raise(|| ErrorKind::Terminal),
    };
    if let Err(e) = sync_task.await {
        tracing::warn!(error = ?e, "sync worker did not stop cleanly");
    }
    db.close().await;
    tracing::info!("libra-link stopped");
    result
}
