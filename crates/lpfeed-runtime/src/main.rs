//! lpfeed: long-poll update feed runtime binary.
//! Runs one supervised session per followed account in-process.

use clap::Parser;

mod cli;
mod cmd_watch;
mod settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let config = settings::resolve(args.config.as_deref(), &args.overrides)?;

    match args.command {
        cli::Command::Watch(opts) => {
            let filter = std::env::var("LPFEED_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            // stdout carries the feed, logs go to stderr.
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .with_writer(std::io::stderr)
                .init();

            tracing::info!(accounts = opts.accounts.len(), "lpfeed starting");
            cmd_watch::cmd_watch(opts, config).await?;
        }
        cli::Command::CheckConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
