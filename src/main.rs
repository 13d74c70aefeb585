use clap::Parser;
use env_logger::{Builder, Env, Target};
use log::info;
use sfsearch::cli::{Cli, Commands};
use sfsearch::config::Config;
use sfsearch::error::{Result as SfsearchResult, SfsearchError};
use sfsearch::login::hash_password;
use sfsearch::metrics::Metrics;
use sfsearch::server::{AppState, Server};
use sfsearch::streamer::{NdjsonWriter, ResultStreamer, SearchStatus};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

fn main() -> SfsearchResult<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    let start_time = Instant::now();

    match &cli.command {
        Commands::HashPassword { password, cost } => {
            println!("{}", hash_password(password, *cost)?);
        }
        Commands::Search { query, root } => {
            let config = load_config(&cli, root.clone(), None)?;
            run_search(config, query)?;
        }
        Commands::Serve { root, bind } => {
            let config = load_config(&cli, root.clone(), bind.clone())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(config))?;
        }
    }

    info!(
        "Finished. Total elapsed time: {:.2?}",
        start_time.elapsed()
    );
    Ok(())
}

fn load_config(
    cli: &Cli,
    root: Option<PathBuf>,
    bind: Option<String>,
) -> SfsearchResult<Arc<Config>> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = root {
        config.search.root_dir = root;
    }
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    let config = config.finalize()?;
    info!("Serving files under {}", config.search.root_dir.display());
    Ok(Arc::new(config))
}

fn run_search(config: Arc<Config>, query: &str) -> SfsearchResult<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())
        .map_err(|e| SfsearchError::Other(format!("Failed to install Ctrl-C handler: {e}")))?;

    let streamer = ResultStreamer::new(config, Metrics::new()?);
    let mut sink = NdjsonWriter::new(io::stdout().lock());
    let outcome = streamer.stream(query, &mut sink, &cancel);

    match outcome.status {
        SearchStatus::Failed(message) => Err(SfsearchError::Other(message)),
        SearchStatus::Completed | SearchStatus::Cancelled => Ok(()),
    }
}

async fn serve(config: Arc<Config>) -> SfsearchResult<()> {
    if config.security.users.is_empty() {
        log::warn!("No users configured; add [security.users] entries to allow logins");
    }
    let state = Arc::new(AppState::new(config.clone())?);
    let server = Server::start(state, &config.server.bind).await?;
    info!("Press Ctrl-C to stop (listening on {})", server.addr());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    server.stop().await;
    Ok(())
}

fn setup_logging(cli: &Cli) -> SfsearchResult<()> {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    if let Some(log_path) = &cli.log {
        if let Some(parent_dir) = log_path.parent()
            && !parent_dir.as_os_str().is_empty()
            && !parent_dir.exists()
        {
            fs::create_dir_all(parent_dir)?;
        }
        let log_file = fs::File::create(log_path)?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder
        .try_init()
        .map_err(|e| SfsearchError::Other(e.to_string()))?;
    Ok(())
}
