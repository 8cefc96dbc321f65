use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, info, warn};

use super::handlers;
use super::protocol::{
    ENDPOINT_LOAD, ENDPOINT_POSITION_AT, ENDPOINT_READ, ENDPOINT_SLAVE_WRITE, ENDPOINT_WRITE,
    ReadRequest, ReadResponse,
};
use super::types::{Description, Item, Range, WriteKind, WriteRequest};
use crate::anti_entropy::{self, RemoteHashTree, SyncMark, TreeSync};
use crate::clock::{SystemClock, TimeSource, wall_nanos};
use crate::config::NodeConfig;
use crate::error::StoreError;
use crate::hash::{Digest, Position};
use crate::membership::MembershipNode;
use crate::ring::Remote;
use crate::transport::Switchboard;
use crate::tree::{Entry, Operation, OperationLog, SafeTree, Tree};

/// A node migrates only when one side of the pair holds more than this many
/// times the other's load.
const MIGRATE_HYSTERESIS: usize = 2;
/// Sync intervals that must pass without incoming syncs, ring changes or
/// migrations before the next migration.
const MIGRATE_WAIT_FACTOR: u32 = 2;

type RangeCount = fn(&Tree, Option<&[u8]>, Option<&[u8]>, bool, bool) -> usize;

/// Where a key lives in the local tree: its ring coordinate followed by the
/// key itself, so tree order is ring order.
pub fn stored_key(key: &[u8]) -> Vec<u8> {
    let mut stored = Position::of(key).0.to_vec();
    stored.extend_from_slice(key);
    stored
}

/// Routes reads and writes to key owners, replicates writes along the ring and
/// repairs replicas in the background.
pub struct Coordinator {
    config: NodeConfig,
    node: Arc<MembershipNode>,
    tree: Arc<SafeTree>,
    clock: Arc<dyn TimeSource>,
    log: Option<Arc<dyn OperationLog>>,
    sync_mark: Arc<SyncMark>,
    seen_ring: Mutex<Digest>,
    last_reroute: AtomicI64,
    last_migrate: AtomicI64,
}

impl Coordinator {
    pub fn new(config: NodeConfig) -> Result<Arc<Self>> {
        Self::with_parts(config, Arc::new(SystemClock::new()), None)
    }

    /// Builds a coordinator with an explicit time source and an optional sink
    /// for committed writes.
    pub fn with_parts(
        config: NodeConfig,
        clock: Arc<dyn TimeSource>,
        log: Option<Arc<dyn OperationLog>>,
    ) -> Result<Arc<Self>> {
        let switchboard = Switchboard::new(&config);
        let node = MembershipNode::new(config.clone(), switchboard)?;
        let tree = Arc::new(SafeTree::with_zombie_lifetime(
            config.zombie_lifetime_nanos(),
            clock.clone(),
        ));

        let coordinator = Arc::new(Self {
            config,
            node,
            tree,
            clock,
            log,
            sync_mark: Arc::new(SyncMark::default()),
            seen_ring: Mutex::new(Digest::default()),
            last_reroute: AtomicI64::new(0),
            last_migrate: AtomicI64::new(0),
        });
        coordinator
            .node
            .export("DHash", handlers::router(coordinator.clone()))?;
        coordinator
            .node
            .export(
                "HashTree",
                anti_entropy::handlers::router(coordinator.tree.clone(), coordinator.sync_mark.clone()),
            )?;
        Ok(coordinator)
    }

    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.node.start().await?;

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.sync_loop().await;
        });
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.clean_loop().await;
        });
        if self.config.migrate {
            let coordinator = self.clone();
            tokio::spawn(async move {
                coordinator.migrate_loop().await;
            });
        }

        Ok(())
    }

    pub async fn stop(&self) {
        self.node.stop().await;
    }

    pub async fn join(&self, addr: &str) -> Result<()> {
        self.node.join(addr).await
    }

    pub fn node(&self) -> &Arc<MembershipNode> {
        &self.node
    }

    pub fn tree(&self) -> &Arc<SafeTree> {
        &self.tree
    }

    // ============================================================
    // WRITES
    // ============================================================

    pub async fn put(self: &Arc<Self>, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(WriteRequest::put(key, value)).await
    }

    pub async fn del(self: &Arc<Self>, key: &[u8]) -> Result<()> {
        self.write(WriteRequest::del(key)).await
    }

    pub async fn sub_put(self: &Arc<Self>, key: &[u8], sub_key: &[u8], value: &[u8]) -> Result<()> {
        self.write(WriteRequest::sub_put(key, sub_key, value)).await
    }

    pub async fn sub_del(self: &Arc<Self>, key: &[u8], sub_key: &[u8]) -> Result<()> {
        self.write(WriteRequest::sub_del(key, sub_key)).await
    }

    pub async fn sub_clear(self: &Arc<Self>, key: &[u8]) -> Result<()> {
        self.write(WriteRequest::sub_clear(key)).await
    }

    /// Entry point for every client write.
    ///
    /// A non-owner forwards the request to the owner. The owner stamps it,
    /// applies it and pushes a copy with one less hop to its successor.
    pub async fn write(self: &Arc<Self>, request: WriteRequest) -> Result<()> {
        request.validate()?;
        if let Some(()) = self
            .route(&request.item.key, ENDPOINT_WRITE, &request)
            .await?
        {
            return Ok(());
        }

        let WriteRequest { kind, mut item } = request;
        item.ttl = self.node.redundancy();
        item.timestamp = self.clock.continuous_time();
        self.commit(kind, &item);
        self.replicate(kind, item).await
    }

    /// Applies a replica write exactly as stamped, then passes it on while
    /// hops remain.
    pub async fn slave_write(self: &Arc<Self>, request: WriteRequest) -> Result<()> {
        request.validate()?;
        let WriteRequest { kind, item } = request;
        self.commit(kind, &item);
        self.replicate(kind, item).await
    }

    async fn replicate(self: &Arc<Self>, kind: WriteKind, item: Item) -> Result<()> {
        if item.ttl <= 1 {
            return Ok(());
        }
        let sync = item.sync;
        let request = WriteRequest {
            kind,
            item: Item {
                ttl: item.ttl - 1,
                ..item
            },
        };

        if sync {
            return self.forward(request).await;
        }
        let coordinator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.forward(request).await {
                warn!("Replica write gave up: {}", e);
            }
        });
        Ok(())
    }

    /// Delivers a replica write to the current successor, dropping successors
    /// that fail and trying the next one.
    async fn forward(&self, request: WriteRequest) -> Result<()> {
        let mut failures = 0;
        loop {
            let Some(successor) = self.node.successor() else {
                return Ok(());
            };
            if successor.addr == self.node.addr() {
                return Ok(());
            }

            match self
                .node
                .switchboard()
                .call::<_, ()>(&successor.addr, ENDPOINT_SLAVE_WRITE, &request)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if let Some(StoreError::InvalidRequest(_)) = e.downcast_ref::<StoreError>() {
                        return Err(e);
                    }
                    warn!("Replica write to {} failed: {}", successor, e);
                    self.node.remove_node(&successor);
                    failures += 1;
                    if self.config.forward_attempts.is_some_and(|max| failures >= max) {
                        return Err(StoreError::Unavailable.into());
                    }
                }
            }
        }
    }

    /// Applies `item` to the local tree unless something newer is there.
    fn commit(&self, kind: WriteKind, item: &Item) {
        let stored = stored_key(&item.key);
        let timestamp = item.timestamp;

        let committed = self.tree.write(|tree| match (kind, &item.sub_key) {
            (WriteKind::SubClear, _) => tree.scoped_mut(Some(stored.as_slice()), |sub| {
                let mut live = Vec::new();
                sub.each(|k, _, t| {
                    if t < timestamp {
                        live.push(k.to_vec());
                    }
                    true
                });
                live.into_iter()
                    .filter(|k| sub.write_if_newer(k, None, timestamp))
                    .map(|k| Operation::del(&stored, Some(k.as_slice()), timestamp))
                    .collect::<Vec<_>>()
            }),
            (_, Some(sub_key)) => tree.scoped_mut(Some(stored.as_slice()), |sub| {
                if sub.write_if_newer(sub_key, item.payload(), timestamp) {
                    vec![operation(&stored, Some(sub_key.as_slice()), item)]
                } else {
                    Vec::new()
                }
            }),
            (_, None) => {
                if tree.write_if_newer(&stored, item.payload(), timestamp) {
                    vec![operation(&stored, None, item)]
                } else {
                    Vec::new()
                }
            }
        });

        debug!(
            "{:?} {} at {}: {} change(s)",
            kind,
            Position::of(&item.key),
            timestamp,
            committed.len()
        );
        if let Some(log) = &self.log {
            for op in &committed {
                log.record(op);
            }
        }
    }

    // ============================================================
    // READS
    // ============================================================

    /// Answers `request` from the owner of its key.
    pub async fn read(&self, request: ReadRequest) -> Result<ReadResponse> {
        if request.key().is_empty() {
            return Err(StoreError::invalid("empty key").into());
        }
        match self.route(request.key(), ENDPOINT_READ, &request).await? {
            Some(response) => Ok(response),
            None => Ok(self.read_local(&request)),
        }
    }

    /// Answers `request` from this node's tree, whoever owns the key.
    pub fn read_local(&self, request: &ReadRequest) -> ReadResponse {
        let stored = stored_key(request.key());
        self.tree.read(|tree| {
            let empty = Tree::new();
            let sub = tree.sub_tree(&stored).unwrap_or(&empty);
            match request {
                ReadRequest::Get { .. } => ReadResponse::Value(tree.get(&stored)),
                ReadRequest::SubGet { sub_key, .. } => ReadResponse::Value(sub.get(sub_key)),
                ReadRequest::Slice { range, .. } => ReadResponse::Entries(slice(sub, range, false)),
                ReadRequest::ReverseSlice { range, .. } => {
                    ReadResponse::Entries(slice(sub, range, true))
                }
                ReadRequest::SliceIndex { min, max, .. } => {
                    let mut out = Vec::new();
                    sub.each_between_index(*min, *max, |k, v, t, _| {
                        out.push((k.to_vec(), v.to_vec(), t));
                        true
                    });
                    ReadResponse::Entries(out)
                }
                ReadRequest::ReverseSliceIndex { min, max, .. } => {
                    let mut out = Vec::new();
                    sub.reverse_each_between_index(*min, *max, |k, v, t, _| {
                        out.push((k.to_vec(), v.to_vec(), t));
                        true
                    });
                    ReadResponse::Entries(out)
                }
                ReadRequest::SliceLen {
                    min, min_inc, len, ..
                } => {
                    let mut out = Vec::new();
                    if *len > 0 {
                        sub.each_between(min.as_deref(), None, *min_inc, true, |k, v, t| {
                            out.push((k.to_vec(), v.to_vec(), t));
                            out.len() < *len
                        });
                    }
                    ReadResponse::Entries(out)
                }
                ReadRequest::IndexOf { sub_key, .. } => {
                    let (index, existed) = sub.index_of(sub_key);
                    ReadResponse::Index { index, existed }
                }
                ReadRequest::ReverseIndexOf { sub_key, .. } => {
                    let (index, existed) = sub.reverse_index_of(sub_key);
                    ReadResponse::Index { index, existed }
                }
                ReadRequest::Count { range, .. } => ReadResponse::Count(sub.size_between(
                    range.min.as_deref(),
                    range.max.as_deref(),
                    range.min_inc,
                    range.max_inc,
                )),
                ReadRequest::SubSize { .. } => ReadResponse::Count(sub.size()),
                ReadRequest::First { .. } => ReadResponse::Entry(sub.first()),
                ReadRequest::Last { .. } => ReadResponse::Entry(sub.last()),
                ReadRequest::Next { sub_key, .. } => ReadResponse::Entry(sub.next(sub_key)),
                ReadRequest::Prev { sub_key, .. } => ReadResponse::Entry(sub.prev(sub_key)),
            }
        })
    }

    pub async fn get(&self, key: &[u8]) -> Result<Option<(Vec<u8>, i64)>> {
        match self.read(ReadRequest::Get { key: key.to_vec() }).await? {
            ReadResponse::Value(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn sub_get(&self, key: &[u8], sub_key: &[u8]) -> Result<Option<(Vec<u8>, i64)>> {
        let request = ReadRequest::SubGet {
            key: key.to_vec(),
            sub_key: sub_key.to_vec(),
        };
        match self.read(request).await? {
            ReadResponse::Value(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub async fn slice(&self, key: &[u8], range: Range) -> Result<Vec<Entry>> {
        self.entries(ReadRequest::Slice {
            key: key.to_vec(),
            range,
        })
        .await
    }

    pub async fn reverse_slice(&self, key: &[u8], range: Range) -> Result<Vec<Entry>> {
        self.entries(ReadRequest::ReverseSlice {
            key: key.to_vec(),
            range,
        })
        .await
    }

    /// Entries whose ordinal lies in `[min, max]`.
    pub async fn slice_index(&self, key: &[u8], min: Option<usize>, max: Option<usize>) -> Result<Vec<Entry>> {
        self.entries(ReadRequest::SliceIndex {
            key: key.to_vec(),
            min,
            max,
        })
        .await
    }

    pub async fn reverse_slice_index(
        &self,
        key: &[u8],
        min: Option<usize>,
        max: Option<usize>,
    ) -> Result<Vec<Entry>> {
        self.entries(ReadRequest::ReverseSliceIndex {
            key: key.to_vec(),
            min,
            max,
        })
        .await
    }

    /// Up to `len` entries starting at `min`.
    pub async fn slice_len(&self, key: &[u8], min: Option<&[u8]>, min_inc: bool, len: usize) -> Result<Vec<Entry>> {
        self.entries(ReadRequest::SliceLen {
            key: key.to_vec(),
            min: min.map(<[u8]>::to_vec),
            min_inc,
            len,
        })
        .await
    }

    pub async fn index_of(&self, key: &[u8], sub_key: &[u8]) -> Result<(usize, bool)> {
        self.index(ReadRequest::IndexOf {
            key: key.to_vec(),
            sub_key: sub_key.to_vec(),
        })
        .await
    }

    pub async fn reverse_index_of(&self, key: &[u8], sub_key: &[u8]) -> Result<(usize, bool)> {
        self.index(ReadRequest::ReverseIndexOf {
            key: key.to_vec(),
            sub_key: sub_key.to_vec(),
        })
        .await
    }

    pub async fn count(&self, key: &[u8], range: Range) -> Result<usize> {
        self.counted(ReadRequest::Count {
            key: key.to_vec(),
            range,
        })
        .await
    }

    pub async fn sub_size(&self, key: &[u8]) -> Result<usize> {
        self.counted(ReadRequest::SubSize { key: key.to_vec() }).await
    }

    pub async fn first(&self, key: &[u8]) -> Result<Option<Entry>> {
        self.entry(ReadRequest::First { key: key.to_vec() }).await
    }

    pub async fn last(&self, key: &[u8]) -> Result<Option<Entry>> {
        self.entry(ReadRequest::Last { key: key.to_vec() }).await
    }

    pub async fn next(&self, key: &[u8], sub_key: &[u8]) -> Result<Option<Entry>> {
        self.entry(ReadRequest::Next {
            key: key.to_vec(),
            sub_key: sub_key.to_vec(),
        })
        .await
    }

    pub async fn prev(&self, key: &[u8], sub_key: &[u8]) -> Result<Option<Entry>> {
        self.entry(ReadRequest::Prev {
            key: key.to_vec(),
            sub_key: sub_key.to_vec(),
        })
        .await
    }

    async fn entries(&self, request: ReadRequest) -> Result<Vec<Entry>> {
        match self.read(request).await? {
            ReadResponse::Entries(entries) => Ok(entries),
            other => Err(unexpected(other)),
        }
    }

    async fn entry(&self, request: ReadRequest) -> Result<Option<Entry>> {
        match self.read(request).await? {
            ReadResponse::Entry(entry) => Ok(entry),
            other => Err(unexpected(other)),
        }
    }

    async fn index(&self, request: ReadRequest) -> Result<(usize, bool)> {
        match self.read(request).await? {
            ReadResponse::Index { index, existed } => Ok((index, existed)),
            other => Err(unexpected(other)),
        }
    }

    async fn counted(&self, request: ReadRequest) -> Result<usize> {
        match self.read(request).await? {
            ReadResponse::Count(count) => Ok(count),
            other => Err(unexpected(other)),
        }
    }

    /// Sends `request` to the owner of `key`, or returns None when that is
    /// this node. Unreachable owners are dropped from the local ring and the
    /// owner is resolved again.
    async fn route<Req, Resp>(&self, key: &[u8], endpoint: &str, request: &Req) -> Result<Option<Resp>>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let pos = Position::of(key);
        let mut failures = 0;
        loop {
            let owner = self.node.get_successor_for(&pos).await?;
            if owner.addr == self.node.addr() {
                return Ok(None);
            }

            debug!("Routing {} for {} to {}", endpoint, pos, owner);
            match self.node.switchboard().call(&owner.addr, endpoint, request).await {
                Ok(response) => return Ok(Some(response)),
                Err(e) => {
                    if let Some(StoreError::InvalidRequest(_)) = e.downcast_ref::<StoreError>() {
                        return Err(e);
                    }
                    warn!("Owner {} of {} failed: {}", owner, pos, e);
                    failures += 1;
                    let exhausted = self.config.forward_attempts.is_some_and(|max| failures >= max);
                    if exhausted || !self.node.remove_node(&owner) {
                        return Err(StoreError::Unavailable.into());
                    }
                }
            }
        }
    }

    // ============================================================
    // REPAIR
    // ============================================================

    /// The arc this node owns as a half-open position range.
    fn owned_range(&self) -> Option<(Position, Position)> {
        let me = self.node.remote();
        let predecessor = self.node.predecessor()?;
        if predecessor.addr == me.addr {
            return None;
        }
        Some((predecessor.pos.next(), me.pos.next()))
    }

    /// Entries stored here whose position lies in `[from, to)`, as counted by
    /// `count` (one of the tree's ranged size functions).
    fn count_between(&self, from: &Position, to: &Position, count: RangeCount) -> usize {
        self.tree.read(|tree| {
            let (from, to) = (from.as_bytes(), to.as_bytes());
            if from < to {
                count(tree, Some(from), Some(to), true, false)
            } else {
                count(tree, Some(from), None, true, true) + count(tree, None, Some(to), true, false)
            }
        })
    }

    pub fn owned(&self) -> usize {
        match self.owned_range() {
            Some((from, to)) => self.count_between(&from, &to, Tree::live_size_between),
            None => self.held(),
        }
    }

    pub fn held(&self) -> usize {
        self.tree.size()
    }

    /// Top-level values in the owned arc. Sub-trees and tombstones do not
    /// count, so this is what [`position_at`](Self::position_at) indexes.
    pub fn load(&self) -> usize {
        match self.owned_range() {
            Some((from, to)) => self.count_between(&from, &to, Tree::size_between),
            None => self.tree.read(|tree| tree.size_between(None, None, true, true)),
        }
    }

    /// Ring position of the `index`-th value of the owned arc, counting from
    /// the predecessor.
    pub fn position_at(&self, index: usize) -> Option<Position> {
        let (from, _) = self.owned_range()?;
        if index >= self.load() {
            return None;
        }
        self.tree.read(|tree| {
            let total = tree.size_between(None, None, true, true);
            if total == 0 {
                return None;
            }
            // the arc is contiguous in tree order once the wrap is folded away
            let skip = tree.size_between(None, Some(from.as_bytes()), true, false);
            let ordinal = (skip + index) % total;
            let mut found = None;
            tree.each_between_index(Some(ordinal), Some(ordinal), |key, _, _, _| {
                found = Some(Position::from_prefix(key));
                false
            });
            found
        })
    }

    pub fn describe(&self) -> Description {
        Description {
            remote: self.node.remote(),
            predecessor: self.node.predecessor(),
            ring: self.node.ring().nodes(),
            redundancy: self.node.redundancy(),
            owned: self.owned(),
            held: self.held(),
            tree_hash: self.tree.hash(),
        }
    }

    async fn sync_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sync_interval());
        loop {
            interval.tick().await;
            if !self.node.is_started() {
                break;
            }
            self.sync_replicas().await;
        }
    }

    async fn clean_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sync_interval());
        loop {
            interval.tick().await;
            if !self.node.is_started() {
                break;
            }
            self.clean().await;
        }
    }

    async fn migrate_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sync_interval());
        loop {
            interval.tick().await;
            if !self.node.is_started() {
                break;
            }
            self.note_ring();
            if self.settled() {
                self.migrate().await;
            }
        }
    }

    /// Stamps `last_reroute` when the ring view changed since the last look.
    fn note_ring(&self) {
        let hash = self.node.ring_hash();
        let mut seen = self.seen_ring.lock();
        if *seen != hash {
            *seen = hash;
            self.last_reroute.store(wall_nanos(), Ordering::Relaxed);
        }
    }

    /// Whether nothing moved keys or members around for a while.
    fn settled(&self) -> bool {
        let wait = self.config.sync_interval() * MIGRATE_WAIT_FACTOR;
        let allowed = wall_nanos().saturating_sub(wait.as_nanos() as i64);
        let latest = self
            .sync_mark
            .last()
            .max(self.last_reroute.load(Ordering::Relaxed))
            .max(self.last_migrate.load(Ordering::Relaxed));
        allowed > latest
    }

    /// Moves this node's position so it and its successor carry similar
    /// loads: backwards to shed values, forwards into the successor's arc to
    /// take some.
    pub async fn migrate(&self) {
        let me = self.node.remote();
        let Some(successor) = self.node.successor() else {
            return;
        };
        if successor.addr == me.addr {
            return;
        }
        let switchboard = self.node.switchboard();
        let theirs = match switchboard.call::<_, usize>(&successor.addr, ENDPOINT_LOAD, &()).await {
            Ok(load) => load,
            Err(e) => {
                warn!("Load of {} unavailable: {}", successor, e);
                self.node.remove_node(&successor);
                return;
            }
        };
        let mine = self.load();

        let target = if mine > MIGRATE_HYSTERESIS * MIGRATE_HYSTERESIS
            && mine > theirs * MIGRATE_HYSTERESIS
        {
            let delta = (mine - theirs) / 2;
            self.position_at(mine - delta - 1)
        } else if theirs > MIGRATE_HYSTERESIS && theirs > mine * MIGRATE_HYSTERESIS {
            let delta = (theirs - mine) / 2;
            match switchboard
                .call::<_, Option<Position>>(&successor.addr, ENDPOINT_POSITION_AT, &(delta - 1))
                .await
            {
                Ok(pos) => pos,
                Err(e) => {
                    warn!("Position lookup on {} failed: {}", successor, e);
                    self.node.remove_node(&successor);
                    return;
                }
            }
        } else {
            None
        };

        if let Some(pos) = target {
            debug!("{} holds {}, successor {} holds {}", me.addr, mine, successor, theirs);
            self.change_position(pos);
        }
    }

    /// Takes `pos`, or the first free coordinate after it.
    fn change_position(&self, mut pos: Position) {
        let old = self.node.position();
        if pos == old {
            return;
        }
        while let (_, Some(_), _) = self.node.ring().remotes(&pos) {
            pos = pos.next();
        }
        self.node.set_position(pos);
        self.last_migrate.store(wall_nanos(), Ordering::Relaxed);
        info!("Migrated {} from {} to {}", self.node.addr(), old, pos);
    }

    /// Reconciles the owned arc with each of the `redundancy - 1` successors,
    /// in both directions.
    pub async fn sync_replicas(&self) {
        let Some((from, to)) = self.owned_range() else {
            return;
        };
        let me = self.node.remote();
        let mut replica = me.clone();
        for _ in 1..self.node.redundancy() {
            let Some(next) = self.node.successor_of(&replica) else {
                break;
            };
            if next.addr == me.addr {
                break;
            }
            let remote = RemoteHashTree::new(next.addr.clone(), self.node.switchboard().clone());

            let mut push = TreeSync::new(self.tree.as_ref(), &remote).range(from, to);
            let mut pull = TreeSync::new(&remote, self.tree.as_ref()).range(from, to);
            let result = match push.run().await {
                Ok(()) => pull.run().await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) if push.put_count() + pull.put_count() > 0 => info!(
                    "Synced {} with {}: {} pushed, {} pulled",
                    me.addr,
                    next,
                    push.put_count(),
                    pull.put_count()
                ),
                Ok(()) => {}
                Err(e) => warn!("Sync of {} with {} failed: {}", me.addr, next, e),
            }
            replica = next;
        }
    }

    /// Hands every key outside the arcs this node replicates to the member
    /// owning it, deleting the local copy once delivered.
    pub async fn clean(&self) {
        let me = self.node.remote();
        let ring = self.node.ring().clone();
        let mut boundary = me.clone();
        for _ in 0..ring.redundancy() {
            match ring.predecessor(&boundary) {
                Some(predecessor) => boundary = predecessor,
                None => return,
            }
        }
        if boundary.addr == me.addr {
            return;
        }

        // walk the foreign arc (me, boundary] one owner at a time
        let mut previous = me.clone();
        while previous.addr != boundary.addr {
            let Some(owner) = ring.successor(&previous) else {
                return;
            };
            if owner.addr == me.addr {
                return;
            }
            let (from, to) = (previous.pos.next(), owner.pos.next());
            if self.count_between(&from, &to, Tree::real_size_between) > 0 {
                self.hand_off(&owner, from, to).await;
            }
            previous = owner;
        }
    }

    async fn hand_off(&self, owner: &Remote, from: Position, to: Position) {
        let remote = RemoteHashTree::new(owner.addr.clone(), self.node.switchboard().clone());
        let mut handoff = TreeSync::new(self.tree.as_ref(), &remote)
            .range(from, to)
            .destroy();
        match handoff.run().await {
            Ok(()) => info!(
                "Handed {} key(s) in [{}, {}) from {} to {}",
                handoff.del_count(),
                from,
                to,
                self.node.addr(),
                owner
            ),
            Err(e) => warn!("Hand off to {} failed: {}", owner, e),
        }
    }
}

fn operation(stored: &[u8], sub_key: Option<&[u8]>, item: &Item) -> Operation {
    match item.payload() {
        Some(value) => Operation::put(stored, sub_key, &value, item.timestamp),
        None => Operation::del(stored, sub_key, item.timestamp),
    }
}

fn slice(tree: &Tree, range: &Range, reverse: bool) -> Vec<Entry> {
    let mut out = Vec::new();
    let collect = |k: &[u8], v: &[u8], t: i64| {
        out.push((k.to_vec(), v.to_vec(), t));
        true
    };
    let (min, max) = (range.min.as_deref(), range.max.as_deref());
    if reverse {
        tree.reverse_each_between(min, max, range.min_inc, range.max_inc, collect);
    } else {
        tree.each_between(min, max, range.min_inc, range.max_inc, collect);
    }
    out
}

fn unexpected(response: ReadResponse) -> anyhow::Error {
    anyhow!("unexpected read response {:?}", response)
}
