use colored::Colorize;
use tokio::sync::mpsc;
use xcandle::{
    AppResult,
    cli::{Cli, Commands},
    config::Config,
    init_logging,
    market_data::{BinanceFeed, WindowKey},
    session::{CommandRouter, SessionManager},
    ui::{self, cli::CliRenderer},
};

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse_args();

    // Load configuration; warnings are reported once logging is up
    let (config, config_warnings) = Config::load_or_default(&cli.config_file);

    // Initialize logging; the guard flushes the log file on exit
    let log_guard = init_logging(
        &cli.effective_log_level(&config.log_level),
        &config.log.file_path,
    )?;

    for warning in &config_warnings {
        tracing::warn!("{}", warning);
        eprintln!("{} {}", "⚠".yellow(), warning);
    }

    tracing::info!("XCandle Market Data Monitor starting...");
    tracing::debug!("CLI arguments: {:?}", cli);

    match cli.command() {
        Commands::Config { action } => {
            Config::handle_command(&action, &cli.config_file)?;
        }
        Commands::History => {
            let key = cli.initial_key(&config)?;
            run_history(&config, key).await?;
        }
        Commands::Watch if cli.is_dry_run_mode() => {
            let key = cli.initial_key(&config)?;
            ui::display_welcome_page(&config, &key);
            println!("Dry-run mode configuration:");
            println!("Config file: {}", cli.config_file);
            config.display()?;
        }
        Commands::Watch => {
            let key = cli.initial_key(&config)?;
            run_watch(config, key).await?;

            // A pending stdin read would hold runtime shutdown until the next line
            drop(log_guard);
            std::process::exit(0);
        }
    }

    Ok(())
}

/// Live session: renderer, stdin commands and the session loop
async fn run_watch(config: Config, key: WindowKey) -> AppResult<()> {
    ui::display_welcome_page(&config, &key);

    let (render_tx, render_rx) = mpsc::unbounded_channel();
    let renderer = CliRenderer::new(config.ui.enable_colors).spawn(render_rx);

    let feed = BinanceFeed::from_config(&config);
    let mut session = SessionManager::new(config, feed).with_render_sender(render_tx);

    let input = CommandRouter::new(session.action_channel()).spawn_stdin_reader();

    let ctrl_c_events = session.action_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            let _ = ctrl_c_events.request_shutdown();
        }
    });

    session.start(key);
    session.run().await?;

    input.abort();
    drop(session);
    let _ = renderer.await;

    tracing::info!("XCandle stopped");
    Ok(())
}

/// One-shot history fetch printed to the terminal
async fn run_history(config: &Config, key: WindowKey) -> AppResult<()> {
    let feed = BinanceFeed::from_config(config);
    let fetcher = feed.fetcher();

    let renderer = CliRenderer::new(config.ui.enable_colors);
    match fetcher.fetch_history(key, fetcher.limit()).await {
        Ok(candles) => {
            println!("{} ({} candles)", key.to_string().bold(), candles.len());
            for candle in &candles {
                println!("  {}", renderer.format_candle(candle));
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} Failed to load history for {}: {}", "✗".red(), key, e);
            Err(e.into())
        }
    }
}
