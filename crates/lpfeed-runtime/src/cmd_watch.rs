//! `lpfeed watch`: follow accounts and print every batch as a JSON line.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::runtime::Handle;
use tokio_stream::StreamExt;

use lpfeed_core::{AccountId, FeedConfig, MessageAdded, UpdateBatch};
use lpfeed_manager::{LongpollManager, UpdateConsumer};
use lpfeed_session::{HttpLongpollApi, LongpollSessionFactory};

use crate::cli::WatchOpts;
use crate::settings;

/// Entry point for `lpfeed watch`.
pub async fn cmd_watch(opts: WatchOpts, config: FeedConfig) -> anyhow::Result<()> {
    let tokens = settings::token_map(&opts.accounts, &opts.tokens)?;
    let config = Arc::new(config);
    let api = HttpLongpollApi::new(Arc::clone(&config), Arc::new(tokens))
        .context("failed to build http client")?;
    let factory =
        LongpollSessionFactory::new(Arc::new(api), Arc::clone(&config), Handle::current());
    let manager = LongpollManager::new(Arc::new(factory), Arc::new(TracingConsumer), &config);

    let mut stdout = tokio::io::stdout();
    let written = run_keeper(&manager, &opts.accounts, &mut stdout, shutdown_signal()).await?;
    manager.shutdown();
    tracing::info!(batches = written, "lpfeed watch stopped");
    Ok(())
}

/// Start every account, answer each keep-alive ping with a renewal, and
/// write published batches to `out` until `shutdown` resolves.
pub async fn run_keeper<W, S>(
    manager: &LongpollManager,
    accounts: &[AccountId],
    out: &mut W,
    shutdown: S,
) -> anyhow::Result<u64>
where
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut updates = Box::pin(manager.observe());
    let mut pings = Box::pin(manager.observe_keep_alive());
    for &account_id in accounts {
        manager.keep_alive(account_id);
    }

    tokio::pin!(shutdown);
    let mut written = 0;
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            Some(account_id) = pings.next() => {
                tracing::debug!(account = %account_id, "keep-alive requested, renewing");
                manager.keep_alive(account_id);
            }
            Some(batch) = updates.next() => {
                write_batch(out, &batch).await?;
                written += 1;
            }
        }
    }
    Ok(written)
}

async fn write_batch<W: AsyncWrite + Unpin>(
    out: &mut W,
    batch: &UpdateBatch,
) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(batch)?;
    line.push(b'\n');
    out.write_all(&line).await?;
    out.flush().await?;
    Ok(())
}

/// Logs deduplicated additions; nothing is stored.
struct TracingConsumer;

#[async_trait]
impl UpdateConsumer for TracingConsumer {
    async fn on_messages_ready(&self, account_id: AccountId, messages: &[MessageAdded]) {
        tracing::debug!(account = %account_id, messages = messages.len(), "messages ready");
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpfeed_core::{ServerDescriptor, UpdateResponse};
    use lpfeed_manager::NoopConsumer;
    use lpfeed_session::LongpollApi;
    use lpfeed_session::testing::ScriptedApi;
    use serde_json::{Value, json};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn keeper_renews_and_prints() {
        let api = Arc::new(ScriptedApi::new());
        api.push_descriptor(Ok(ServerDescriptor::new("h", "k", 1_i64)));
        api.push_poll(Ok(UpdateResponse::from_value(json!({
            "ts": 2,
            "updates": [[80, 3, 0]]
        }))
        .unwrap()));

        let config = Arc::new(FeedConfig::default());
        let factory = LongpollSessionFactory::new(
            Arc::clone(&api) as Arc<dyn LongpollApi>,
            Arc::clone(&config),
            Handle::current(),
        );
        let manager = LongpollManager::new(Arc::new(factory), Arc::new(NoopConsumer), &config);

        let mut out: Vec<u8> = Vec::new();
        let written = run_keeper(
            &manager,
            &[AccountId(100)],
            &mut out,
            tokio::time::sleep(Duration::from_secs(100)),
        )
        .await
        .unwrap();

        assert_eq!(written, 1);
        let line: Value = serde_json::from_slice(out.trim_ascii_end()).unwrap();
        assert_eq!(line["account_id"], 100);
        assert_eq!(line["records"][0]["type"], "badge_count");

        // Pings at 30s and 60s were answered, so the session outlived 2T.
        assert_eq!(manager.active_accounts(), vec![AccountId(100)]);
        assert_eq!(api.descriptor_calls(AccountId(100)), 1);
    }

    #[tokio::test]
    async fn batch_is_one_line() {
        let batch = UpdateBatch::new(AccountId(-5), vec![]);
        let mut out: Vec<u8> = Vec::new();
        write_batch(&mut out, &batch).await.unwrap();
        assert_eq!(out.iter().filter(|b| **b == b'\n').count(), 1);
        assert!(out.ends_with(b"\n"));
    }
}
