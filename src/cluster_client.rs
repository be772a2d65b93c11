//! The cluster-aware client: routes keyed commands to slot owners, follows
//! MOVED/ASK redirects up to a configured budget, and refreshes topology
//! through the single-consumer action runner on repeated MOVED storms.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::client::Client;
use crate::cluster::{
  parse_redirect, route, slot_for_keys, Action, ActionRunner, ClusterTopology, NodeEndpoint, Redirect,
  TopologyFetcher,
};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::resp::token::Token;

/// Caller-supplied transport bring-up: dialing a node endpoint (TCP/TLS,
/// DNS resolution) is out of this crate's scope, so the cluster client is
/// generic over whatever connects one and performs the `HELLO 3`
/// handshake.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
  async fn connect(&self, endpoint: &NodeEndpoint) -> Result<Client>;
}

struct ClusterFetcher {
  pool: Arc<NodePool>,
}

#[async_trait::async_trait]
impl TopologyFetcher for ClusterFetcher {
  async fn fetch(&self) -> Result<ClusterTopology> {
    let client = self.pool.any_client().await?;
    let token = client.call_raw(&[b"CLUSTER", b"SHARDS"]).await?;
    let fresh = crate::cluster::discovery::parse_shards(token)?;
    self.pool.retire_stale(&fresh);
    Ok(fresh)
  }
}

/// A lazily-populated pool of connections to known cluster nodes.
struct NodePool {
  connector: Arc<dyn Connector>,
  clients: Mutex<HashMap<NodeEndpoint, Client>>,
  seeds: Vec<NodeEndpoint>,
}

impl NodePool {
  fn new(connector: Arc<dyn Connector>, seeds: Vec<NodeEndpoint>) -> Self {
    Self { connector, clients: Mutex::new(HashMap::new()), seeds }
  }

  async fn client_for(&self, endpoint: &NodeEndpoint) -> Result<Client> {
    if let Some(c) = self.clients.lock().unwrap().get(endpoint).cloned() {
      return Ok(c);
    }
    let client = self.connector.connect(endpoint).await?;
    self.clients.lock().unwrap().insert(endpoint.clone(), client.clone());
    Ok(client)
  }

  /// Any currently reachable client, preferring an already-open
  /// connection before falling back to a fresh seed dial.
  async fn any_client(&self) -> Result<Client> {
    if let Some(c) = self.clients.lock().unwrap().values().next().cloned() {
      return Ok(c);
    }
    for seed in &self.seeds {
      if let Ok(c) = self.client_for(seed).await {
        return Ok(c);
      }
    }
    Err(ClientError::ConnectionClosed)
  }

  /// Drop pooled connections for nodes no longer present in `topology`.
  fn retire_stale(&self, topology: &ClusterTopology) {
    let live: std::collections::HashSet<&NodeEndpoint> = topology.all_endpoints().into_iter().collect();
    self.clients.lock().unwrap().retain(|ep, _| live.contains(ep));
  }
}

/// Detects a burst of MOVED replies within a short rolling window and
/// triggers an unsolicited topology refresh during a live reshard.
struct MovedStormDetector {
  threshold: u32,
  window: Duration,
  count: AtomicU32,
  window_start: Mutex<Instant>,
}

impl MovedStormDetector {
  fn new(threshold: u32) -> Self {
    Self { threshold, window: Duration::from_secs(5), count: AtomicU32::new(0), window_start: Mutex::new(Instant::now()) }
  }

  /// Record one MOVED observation; returns true if the storm threshold
  /// was just crossed.
  fn observe(&self) -> bool {
    let mut start = self.window_start.lock().unwrap();
    if start.elapsed() > self.window {
      *start = Instant::now();
      self.count.store(0, Ordering::Relaxed);
    }
    let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
    n == self.threshold
  }
}

pub struct ClusterClient {
  topology: Arc<RwLock<ClusterTopology>>,
  pool: Arc<NodePool>,
  selector: crate::cluster::NodeSelector,
  config: ClientConfig,
  storm: MovedStormDetector,
  action_runner: ActionRunner,
}

impl ClusterClient {
  /// Connect to the first reachable seed, discover topology via
  /// `CLUSTER SHARDS`, and start the background action runner.
  pub async fn connect(seeds: Vec<NodeEndpoint>, connector: Arc<dyn Connector>, config: ClientConfig) -> Result<Self> {
    let pool = Arc::new(NodePool::new(connector, seeds));
    let seed_client = pool.any_client().await?;
    let topology_token = seed_client.call_raw(&[b"CLUSTER", b"SHARDS"]).await?;
    let topology = Arc::new(RwLock::new(crate::cluster::discovery::parse_shards(topology_token)?));

    let fetcher: Arc<dyn TopologyFetcher> = Arc::new(ClusterFetcher { pool: pool.clone() });
    let action_runner = ActionRunner::spawn(topology.clone(), fetcher);

    Ok(Self {
      topology,
      pool,
      selector: crate::cluster::NodeSelector::new(),
      storm: MovedStormDetector::new(config.moved_storm_threshold),
      config,
      action_runner,
    })
  }

  /// Explicitly request a topology refresh, e.g. after observing
  /// repeated connection failures against a previously-healthy node.
  pub fn request_refresh(&self, reason: &'static str) {
    self.action_runner.submit(Action::RefreshTopology { reason });
  }

  pub async fn shutdown(self) {
    self.action_runner.shutdown().await;
  }

  /// Send a command keyed by `keys`, routing to the slot owner and
  /// following MOVED/ASK redirects up to `ClientConfig::max_redirects`.
  pub async fn call_keyed(&self, keys: &[&[u8]], args: &[&[u8]], write: bool) -> Result<Token> {
    let slot = slot_for_keys(keys.iter().copied())?;
    let mut attempt = 0u32;
    let mut ask_target: Option<NodeEndpoint> = None;

    loop {
      if attempt > self.config.max_redirects {
        return Err(ClientError::RedirectBudgetExceeded);
      }

      let (endpoint, is_ask) = match ask_target.take() {
        Some(ep) => (ep, true),
        None => {
          let topology = self.topology.read().await;
          let node = route(&topology, &self.selector, slot, self.config.node_selection_policy, write)
            .ok_or(ClientError::ConnectionClosed)?;
          (node.endpoint.clone(), false)
        }
      };

      let client = self.pool.client_for(&endpoint).await?;
      if is_ask {
        // A one-shot ASK redirect: the target node requires an ASKING
        // prefix on the very next command and never updates the map.
        client.call_raw(&[b"ASKING"]).await?;
      }
      let result = client.call_raw(args).await;

      match result {
        Ok(token) => return Ok(token),
        Err(ClientError::CommandError(msg)) => match parse_redirect(&msg) {
          Some(Redirect::Moved { slot: moved_slot, endpoint }) => {
            self.topology.write().await.record_moved(moved_slot, endpoint);
            if self.storm.observe() {
              self.request_refresh("moved storm threshold crossed");
            }
            attempt += 1;
            continue;
          }
          Some(Redirect::Ask { endpoint, .. }) => {
            ask_target = Some(endpoint);
            attempt += 1;
            continue;
          }
          None => return Err(ClientError::CommandError(msg)),
        },
        Err(e) => return Err(e),
      }
    }
  }

  pub fn topology(&self) -> &Arc<RwLock<ClusterTopology>> {
    &self.topology
  }
}
