//! Background refresh of incoming orders.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::coordinator::SyncCoordinator;
use crate::session::Session;
use crate::table::RemoteTable;

/// Default time between order refreshes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Handle to a running refresh task.
#[derive(Debug)]
pub struct RefreshHandle {
    task: JoinHandle<()>,
    generation: watch::Receiver<u64>,
}

impl RefreshHandle {
    /// Receives the session's refresh generation after every successful
    /// refresh.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the task without waiting for it.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the task to end on its own (sign-out or rejected credential).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                tracing::error!("Order refresh task failed: {}", e);
            }
        }
    }
}

/// Refreshes orders every `interval` until the session ends.
///
/// The first refresh happens one interval after the call; callers load the
/// initial state themselves. Read failures are logged and retried on the next
/// tick, except for authentication failures, which stop the task.
pub fn spawn_order_refresh<T>(
    coordinator: Arc<SyncCoordinator<T>>,
    session: Arc<Session>,
    interval: Duration,
) -> RefreshHandle
where
    T: RemoteTable + 'static,
{
    let (tx, rx) = watch::channel(session.generation());

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if !session.is_active().await {
                tracing::info!("Session ended, stopping order refresh");
                break;
            }
            match coordinator.refresh_orders(&session).await {
                Ok(count) => {
                    tracing::debug!("Refreshed {} order(s)", count);
                    if tx.send(session.generation()).is_err() {
                        tracing::debug!("No one is watching order refreshes");
                    }
                }
                Err(e) if e.requires_sign_in() => {
                    tracing::warn!("Stopping order refresh: {}", e);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Order refresh failed, retrying next tick: {}", e);
                }
            }
        }
    });

    RefreshHandle {
        task,
        generation: rx,
    }
}
