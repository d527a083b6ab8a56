use clap::Parser;
use oracle_relay::cli::{Cli, Commands};
use oracle_relay::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration; without a file the environment alone may be enough
    let mut config = match Config::load_optional(&cli.config)? {
        Some(config) => config,
        None => {
            eprintln!("Warning: {} not found", cli.config);
            eprintln!("Using defaults and environment overrides");
            Config::default()
        }
    };
    config.apply_process_env()?;

    // Initialize telemetry
    let _telemetry = oracle_relay::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("Starting relay");
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Push: {} (origin {})", config.push.url, config.push.effective_origin());
            println!(
                "  Reconnect: {}s, heartbeat: {}s",
                config.push.reconnect_delay_secs, config.push.heartbeat_secs
            );
            match &config.poll {
                Some(poll) => println!(
                    "  Poll: {} every {}s, margin {}",
                    poll.rpc_url, poll.interval_secs, poll.safety_margin
                ),
                None => println!("  Poll: disabled"),
            }
            println!(
                "  Webhook: {} (secret {}, timeout {}s, rollup window {}s)",
                config.webhook.url,
                if config.webhook.secret.as_deref().is_some_and(|s| !s.is_empty()) {
                    "<redacted>"
                } else {
                    "unset"
                },
                config.webhook.timeout_secs,
                config.webhook.rollup_window_secs
            );
            println!("  Events: {} kind(s)", config.events.len());
            if let Some(chain) = &config.push.chain {
                println!("  Chain filter: {chain}");
            }
            if !config.push.oracles.is_empty() {
                println!("  Oracle filter: {}", config.push.oracles.join(", "));
            }
            println!("  Dedup: seen cap {}", config.dedup.seen_cap);
            if let Err(e) = config.validate() {
                println!("  Invalid: {e}");
            }
        }
        Commands::Sign(args) => {
            args.execute(&config)?;
        }
    }

    Ok(())
}
