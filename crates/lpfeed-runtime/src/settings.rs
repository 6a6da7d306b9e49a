//! Effective configuration: file, then flags and environment.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, bail};

use lpfeed_core::{AccountId, FeedConfig};

use crate::cli::ConfigOverrides;

pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> anyhow::Result<FeedConfig> {
    let mut config = match path {
        Some(path) => FeedConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FeedConfig::default(),
    };
    apply(&mut config, overrides);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn apply(config: &mut FeedConfig, overrides: &ConfigOverrides) {
    if let Some(url) = &overrides.api_base_url {
        config.api_base_url = url.clone();
    }
    if let Some(wait) = overrides.wait_secs {
        config.wait_secs = wait;
    }
    if let Some(backoff) = overrides.backoff_secs {
        config.backoff_secs = backoff;
    }
    if let Some(window) = overrides.idle_window_secs {
        config.idle_window_secs = window;
    }
}

/// Pair accounts with tokens positionally.
pub fn token_map(
    accounts: &[AccountId],
    tokens: &[String],
) -> anyhow::Result<HashMap<AccountId, String>> {
    if accounts.len() != tokens.len() {
        bail!(
            "{} account(s) but {} token(s); pass one --token per --account",
            accounts.len(),
            tokens.len()
        );
    }
    Ok(accounts.iter().copied().zip(tokens.iter().cloned()).collect())
}
