//! A single-consumer action queue serializing cluster topology mutations.
//!
//! Producers (a MOVED reply, a periodic timer, an explicit refresh call)
//! enqueue actions from any task; exactly one background task drains the
//! queue and applies them, so topology mutation never needs a lock on the
//! producer side. Modeled on the per-connection background tasks the
//! health and message-processing loops spawn: one task, parked on a
//! channel, woken by new work.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::cluster::node::NodeEndpoint;
use crate::cluster::slot::Slot;
use crate::cluster::topology::ClusterTopology;

#[derive(Debug, Clone)]
pub enum Action {
  RefreshTopology { reason: &'static str },
  RecordMoved { slot: Slot, endpoint: NodeEndpoint },
  Shutdown,
}

/// A pluggable way to fetch a fresh topology; the real implementation
/// issues `CLUSTER SHARDS` over a connection, tests can stub it.
#[async_trait::async_trait]
pub trait TopologyFetcher: Send + Sync + 'static {
  async fn fetch(&self) -> crate::error::Result<ClusterTopology>;
}

pub struct ActionRunner {
  sender: mpsc::UnboundedSender<Action>,
  handle: Option<JoinHandle<()>>,
}

impl ActionRunner {
  pub fn spawn(topology: Arc<RwLock<ClusterTopology>>, fetcher: Arc<dyn TopologyFetcher>) -> Self {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Action>();
    let handle = tokio::spawn(async move {
      while let Some(mut action) = receiver.recv().await {
        // Coalesce back-to-back refreshes already sitting in the queue
        // rather than issuing a CLUSTER SHARDS call per one.
        while let Action::RefreshTopology { .. } = action {
          match receiver.try_recv() {
            Ok(next @ Action::RefreshTopology { .. }) => action = next,
            Ok(other) => {
              apply(&topology, &fetcher, action).await;
              action = other;
              continue;
            }
            Err(_) => break,
          }
        }
        if matches!(action, Action::Shutdown) {
          log::debug!("cluster action runner shutting down");
          break;
        }
        apply(&topology, &fetcher, action).await;
      }
    });
    Self { sender, handle: Some(handle) }
  }

  pub fn submit(&self, action: Action) {
    if self.sender.send(action).is_err() {
      log::warn!("cluster action runner is no longer accepting actions");
    }
  }

  pub async fn shutdown(mut self) {
    self.submit(Action::Shutdown);
    if let Some(handle) = self.handle.take() {
      let _ = handle.await;
    }
  }
}

async fn apply(topology: &Arc<RwLock<ClusterTopology>>, fetcher: &Arc<dyn TopologyFetcher>, action: Action) {
  match action {
    Action::RefreshTopology { reason } => {
      log::debug!("refreshing cluster topology: {reason}");
      match fetcher.fetch().await {
        Ok(fresh) => {
          *topology.write().await = fresh;
        }
        Err(e) => log::warn!("cluster topology refresh failed: {e}"),
      }
    }
    Action::RecordMoved { slot, endpoint } => {
      topology.write().await.record_moved(slot, endpoint);
    }
    Action::Shutdown => {}
  }
}
