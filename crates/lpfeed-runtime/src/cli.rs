//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use lpfeed_core::AccountId;

#[derive(Parser)]
#[command(name = "lpfeed", about = "Long-poll update feed")]
pub struct Cli {
    /// TOML config file; flags and LPFEED_* variables override it
    #[arg(long, short = 'c', global = true, env = "LPFEED_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Follow accounts and print every batch as one JSON line
    Watch(WatchOpts),
    /// Print the effective configuration as TOML
    CheckConfig,
}

#[derive(Args, Default)]
pub struct ConfigOverrides {
    /// REST base used for server-descriptor calls
    #[arg(long, global = true, env = "LPFEED_API_BASE_URL")]
    pub api_base_url: Option<String>,

    /// Seconds the server may hold a poll open
    #[arg(long, global = true, env = "LPFEED_WAIT_SECS")]
    pub wait_secs: Option<u64>,

    /// Seconds to wait before retrying after a failure
    #[arg(long, global = true, env = "LPFEED_BACKOFF_SECS")]
    pub backoff_secs: Option<u64>,

    /// Idle window before a keep-alive ping, and again before teardown
    #[arg(long, global = true, env = "LPFEED_IDLE_WINDOW_SECS")]
    pub idle_window_secs: Option<u64>,
}

#[derive(Args)]
pub struct WatchOpts {
    /// Account to follow (negative for a community); repeatable
    #[arg(long = "account", short = 'a', required = true, allow_negative_numbers = true)]
    pub accounts: Vec<AccountId>,

    /// Access token, one per --account in the same order
    #[arg(
        long = "token",
        short = 't',
        env = "LPFEED_TOKEN",
        value_delimiter = ',',
        hide_env_values = true,
        required = true
    )]
    pub tokens: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_accepts_negative_accounts() {
        let cli = Cli::try_parse_from([
            "lpfeed", "watch", "-a", "100", "-a", "-42", "-t", "tok1", "-t", "tok2",
        ])
        .unwrap();
        let Command::Watch(opts) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(opts.accounts, vec![AccountId(100), AccountId(-42)]);
        assert_eq!(opts.tokens, vec!["tok1", "tok2"]);
    }

    #[test]
    fn tokens_split_on_comma() {
        let cli = Cli::try_parse_from(["lpfeed", "watch", "-a", "1", "-a", "2", "--token", "x,y"])
            .unwrap();
        let Command::Watch(opts) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(opts.tokens, vec!["x", "y"]);
    }

    #[test]
    fn overrides_are_global() {
        let cli = Cli::try_parse_from(["lpfeed", "check-config", "--wait-secs", "5"]).unwrap();
        assert!(matches!(cli.command, Command::CheckConfig));
        assert_eq!(cli.overrides.wait_secs, Some(5));
    }

    #[test]
    fn bad_account_rejected() {
        assert!(Cli::try_parse_from(["lpfeed", "watch", "-a", "abc", "-t", "x"]).is_err());
    }
}
