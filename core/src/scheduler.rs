//! Periodic flush task.
//!
//! The next flush is armed only after the previous one has returned
//! (fixed delay), so a slow flush never overlaps with the next.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct FlushScheduler {
    handle: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl FlushScheduler {
    /// Spawns the flush loop on the current tokio runtime. `flush` runs on
    /// the blocking pool since it does file I/O.
    pub fn spawn<F>(interval: Duration, flush: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(flush_loop(interval, Arc::new(flush), cancel_token.clone()));

        Self {
            handle: Some(handle),
            cancel_token,
        }
    }

    /// Cancels the loop and waits for it to exit. A flush already in
    /// progress is allowed to finish.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel_token.cancel();

        if let Some(handle) = self.handle.take() {
            handle.await.context("flush scheduler task failed to join")
        } else {
            Ok(())
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn flush_loop<F>(interval: Duration, flush: Arc<F>, cancel_token: CancellationToken)
where
    F: Fn() + Send + Sync + 'static,
{
    info!("flush scheduler started (every {}s)", interval.as_secs_f64());

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let flush = Arc::clone(&flush);
                if let Err(err) = tokio::task::spawn_blocking(move || flush()).await {
                    error!("flush task panicked: {err}");
                }
            }
            _ = cancel_token.cancelled() => {
                info!("flush scheduler shutting down");
                break;
            }
        }
    }
}
