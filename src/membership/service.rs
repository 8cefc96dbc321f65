use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::handlers;
use super::protocol::{ENDPOINT_GET_SUCCESSOR, ENDPOINT_NOTIFY, ENDPOINT_PING, ENDPOINT_RING};
use super::types::{Lifecycle, NodeState};
use crate::config::NodeConfig;
use crate::error::StoreError;
use crate::hash::{Digest, Position};
use crate::ring::{Remote, Ring};
use crate::transport::{Switchboard, codec};

/// Where outbound packets would leave from; no traffic is sent.
const DISCOVERY_ADDR: &str = "8.8.8.8:80";

/// One member of the ring.
///
/// Owns its view of the ring and keeps it converging with the rest of the
/// cluster through two background loops: notifying its successor and pinging
/// its predecessor.
pub struct MembershipNode {
    config: NodeConfig,
    remote: RwLock<Remote>,
    predecessor: RwLock<Option<Remote>>,
    ring: Ring,
    switchboard: Arc<Switchboard>,
    exports: DashMap<String, Router>,
    lifecycle: Lifecycle,
    shutdown: watch::Sender<bool>,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl MembershipNode {
    pub fn new(config: NodeConfig, switchboard: Arc<Switchboard>) -> Result<Arc<Self>> {
        let pos = config.parsed_position()?.unwrap_or_default();
        let (shutdown, _) = watch::channel(false);
        Ok(Arc::new(Self {
            remote: RwLock::new(Remote::new(pos, config.addr.clone())),
            predecessor: RwLock::new(None),
            ring: Ring::new(config.redundancy),
            switchboard,
            exports: DashMap::new(),
            lifecycle: Lifecycle::new(),
            shutdown,
            server: Mutex::new(None),
            config,
        }))
    }

    /// Registers an extra RPC service served next to `Node.*`.
    ///
    /// Only allowed before `start`.
    pub fn export(&self, name: &str, router: Router) -> Result<()> {
        if self.lifecycle.get() != NodeState::Created {
            return Err(StoreError::State("services can only be exported before start").into());
        }
        self.exports.insert(name.to_string(), router);
        Ok(())
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if !self.lifecycle.advance(NodeState::Created, NodeState::Started) {
            return Err(StoreError::State("node already started").into());
        }

        let bind_addr = if self.config.addr.is_empty() {
            format!("{}:0", discover_ip().await?)
        } else {
            self.config.addr.clone()
        };
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("binding {}", bind_addr))?;
        let addr = advertised(listener.local_addr()?).await?;
        self.remote.write().addr = addr.clone();
        self.ring.add(self.remote());
        self.update_predecessor();

        let app = self.router();
        let mut stop = self.shutdown.subscribe();
        let server = tokio::spawn(async move {
            let shutdown = async move {
                let _ = stop.changed().await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("Server stopped with error: {}", e);
            }
        });
        *self.server.lock() = Some(server);

        info!("Node {} started at {}", self.position(), addr);

        let node = self.clone();
        tokio::spawn(async move {
            node.notify_loop().await;
        });
        let node = self.clone();
        tokio::spawn(async move {
            node.ping_loop().await;
        });

        Ok(())
    }

    /// Stops the server and the background loops. A stopped node answers every
    /// request with 503 and cannot be started again.
    pub async fn stop(&self) {
        if !self.lifecycle.advance(NodeState::Started, NodeState::Stopped) {
            return;
        }
        let _ = self.shutdown.send(true);
        let server = self.server.lock().take();
        if let Some(server) = server
            && tokio::time::timeout(self.config.rpc_timeout(), server)
                .await
                .is_err()
        {
            tracing::warn!("Server at {} did not drain in time", self.addr());
        }
        info!("Node {} stopped", self.addr());
    }

    pub fn state(&self) -> NodeState {
        self.lifecycle.get()
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle.get() == NodeState::Started
    }

    fn router(self: &Arc<Self>) -> Router {
        let mut app = handlers::router(self.clone());
        for entry in self.exports.iter() {
            tracing::debug!("Serving exported service {}", entry.key());
            app = app.merge(entry.value().clone());
        }
        app.layer(middleware::from_fn_with_state(self.clone(), require_started))
    }

    // ============================================================
    // VIEW
    // ============================================================

    pub fn remote(&self) -> Remote {
        self.remote.read().clone()
    }

    pub fn addr(&self) -> String {
        self.remote.read().addr.clone()
    }

    pub fn position(&self) -> Position {
        self.remote.read().pos
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    pub fn ring_hash(&self) -> Digest {
        self.ring.hash()
    }

    pub fn redundancy(&self) -> usize {
        self.ring.redundancy()
    }

    pub fn switchboard(&self) -> &Arc<Switchboard> {
        &self.switchboard
    }

    pub fn predecessor(&self) -> Option<Remote> {
        self.predecessor.read().clone()
    }

    pub fn successor(&self) -> Option<Remote> {
        self.ring.successor(&self.remote())
    }

    pub fn successor_of(&self, remote: &Remote) -> Option<Remote> {
        self.ring.successor(remote)
    }

    /// Moves this node to `pos`, keeping its address.
    pub fn set_position(&self, pos: Position) {
        let remote = {
            let mut remote = self.remote.write();
            remote.pos = pos;
            remote.clone()
        };
        if self.is_started() {
            self.ring.add(remote);
            self.update_predecessor();
        }
    }

    /// Forgets `remote` locally. Never removes this node itself or the last
    /// member.
    pub fn remove_node(&self, remote: &Remote) -> bool {
        if remote.addr == self.addr() || self.ring.len() < 2 || !self.ring.contains(&remote.addr) {
            return false;
        }
        self.ring.remove(remote);
        self.update_predecessor();
        tracing::warn!("Removed {} from ring of {}", remote, self.addr());
        true
    }

    fn update_predecessor(&self) {
        *self.predecessor.write() = self.ring.predecessor(&self.remote());
    }

    // ============================================================
    // PROTOCOL
    // ============================================================

    /// Server side of `Node.Notify`: learn about `caller` and hand back the
    /// resulting view.
    pub fn notify(&self, caller: Remote) -> Vec<Remote> {
        if !self.ring.contains(&caller.addr) {
            info!("{} learned about {}", self.addr(), caller);
        }
        self.ring.add(caller);
        self.update_predecessor();
        self.ring.nodes()
    }

    /// Owner of `pos` as far as this node knows.
    pub fn local_successor_for(&self, pos: &Position) -> Result<Remote> {
        let (_, at, successor) = self.ring.remotes(pos);
        at.or(successor)
            .ok_or_else(|| StoreError::Unavailable.into())
    }

    /// Resolves the owner of `pos`, asking predecessors along the way.
    ///
    /// A predecessor that cannot be reached is dropped from the local view and
    /// the resolution starts over.
    pub async fn get_successor_for(&self, pos: &Position) -> Result<Remote> {
        loop {
            let (predecessor, at, successor) = self.ring.remotes(pos);
            if let Some(at) = at {
                return Ok(at);
            }
            let (Some(predecessor), Some(successor)) = (predecessor, successor) else {
                return Err(StoreError::Unavailable.into());
            };
            if predecessor.addr == self.addr() {
                return Ok(successor);
            }

            match self
                .switchboard
                .call::<_, Remote>(&predecessor.addr, ENDPOINT_GET_SUCCESSOR, pos)
                .await
            {
                Ok(owner) => return Ok(owner),
                Err(e) => {
                    tracing::warn!("Failed to resolve {} via {}: {}", pos, predecessor, e);
                    if !self.remove_node(&predecessor) {
                        return Ok(successor);
                    }
                }
            }
        }
    }

    /// Enters the ring that `addr` is part of.
    ///
    /// A node without a position takes the middle of the widest gap in the
    /// bootstrap node's view.
    pub async fn join(&self, addr: &str) -> Result<()> {
        if !self.is_started() {
            return Err(StoreError::State("node must be started before joining").into());
        }

        if self.position().is_zero() {
            let nodes: Vec<Remote> = self.switchboard.call(addr, ENDPOINT_RING, &()).await?;
            if let Some(slot) = Ring::with_nodes(self.config.redundancy, nodes).get_slot() {
                self.set_position(slot);
            }
        }

        let me = self.remote();
        let nodes: Vec<Remote> = self.switchboard.call(addr, ENDPOINT_NOTIFY, &me).await?;
        self.ring.set_nodes(nodes);
        self.ring.add(me);
        self.update_predecessor();
        info!("{} joined via {}: {}", self.addr(), addr, self.ring.describe());
        Ok(())
    }

    // ============================================================
    // BACKGROUND LOOPS
    // ============================================================

    async fn notify_loop(self: Arc<Self>) {
        self.every(self.config.notify_interval(), |node| async move {
            node.notify_successor().await;
        })
        .await;
    }

    async fn ping_loop(self: Arc<Self>) {
        self.every(self.config.ping_interval(), |node| async move {
            node.ping_predecessor().await;
        })
        .await;
    }

    /// Runs `tick` every `period` until the node stops.
    async fn every<F, Fut>(self: &Arc<Self>, period: Duration, tick: F)
    where
        F: Fn(Arc<Self>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut stop = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = stop.changed() => break,
            }
            if !self.is_started() {
                break;
            }
            tick(self.clone()).await;
        }
    }

    /// One stabilization round.
    async fn notify_successor(&self) {
        let me = self.remote();
        let Some(successor) = self.ring.successor(&me) else {
            return;
        };
        if successor.addr == me.addr {
            return;
        }
        let predecessor = self.predecessor();
        let before = self.ring.hash();

        match self
            .switchboard
            .call::<_, Vec<Remote>>(&successor.addr, ENDPOINT_NOTIFY, &me)
            .await
        {
            Ok(nodes) => {
                self.ring.set_nodes(nodes);
                self.ring.add(me.clone());
                if let Some(predecessor) = predecessor
                    && predecessor.addr != me.addr
                {
                    self.ring.add(predecessor.clone());
                    self.ring.clean(&predecessor.pos, &me.pos);
                }
                self.update_predecessor();
                if self.ring.hash() != before {
                    tracing::debug!("Ring of {} is now {}", me.addr, self.ring.describe());
                }
            }
            Err(e) => {
                tracing::warn!("Failed to notify successor {}: {}", successor, e);
                self.remove_node(&successor);
            }
        }
    }

    async fn ping_predecessor(&self) {
        let Some(predecessor) = self.predecessor() else {
            self.update_predecessor();
            return;
        };
        if predecessor.addr != self.addr()
            && let Err(e) = self
                .switchboard
                .try_call::<_, ()>(&predecessor.addr, ENDPOINT_PING, &())
                .await
        {
            tracing::warn!("Predecessor {} did not answer ping: {}", predecessor, e);
            self.remove_node(&predecessor);
        }
        self.update_predecessor();
    }
}

async fn require_started(
    State(node): State<Arc<MembershipNode>>,
    request: Request,
    next: Next,
) -> Response {
    if !node.is_started() {
        return codec::stopped().into_response();
    }
    next.run(request).await
}

async fn discover_ip() -> Result<std::net::IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(DISCOVERY_ADDR).await?;
    Ok(socket.local_addr()?.ip())
}

/// The address other nodes should dial to reach a listener bound to `local`.
async fn advertised(local: SocketAddr) -> Result<String> {
    if local.ip().is_unspecified() {
        return Ok(SocketAddr::new(discover_ip().await?, local.port()).to_string());
    }
    Ok(local.to_string())
}
