// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.9
// Author: Lukas Bower
// Date Modified: 2026-04-02

//! The worker: a single-threaded cooperative event loop over the local ray
//! queue, per-peer outbound queues, the pending queue, the inbound message
//! stream, and the peer/stats/diagnostics timers.
//!
//! Rays move between exactly these containers. After each trace step a ray
//! is either resident (back onto the local queue), owned by a known peer
//! (outbound queue), or blocked on an unknown owner (pending queue plus a
//! batched `GetWorker`).

pub mod tracing;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::io::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use swarm_model::{ObjectKey, ObjectKind, RayState, TreeletId, WorkerId};
use swarm_wire::{
    encode_ray,
    record::{push_inner_record, InnerRecords},
    ConnectRequest, ConnectResponse, ConnectTo, FinishedRay, GenerateRays, GetObjects, GetWorker,
    Hello, HelloAck, Message, MessageParser, OpCode, QueueSnapshot, FRAME_HEADER_LEN,
};

use crate::scene::shade::ShadeArena;
use crate::scene::{generate_camera_rays, SceneContext};
use crate::stats::WorkerStats;
use crate::storage::{open_backend, StorageBackend};
use crate::transport::{spawn_receiver, DatagramSender, UDP_MTU_BYTES};
use crate::worker::tracing::trace_ray_batch;

const PEER_CHECK_INTERVAL: Duration = Duration::from_millis(1_000);
const WORKER_STATS_INTERVAL: Duration = Duration::from_millis(500);
const WORKER_DIAGNOSTICS_INTERVAL: Duration = Duration::from_millis(2_000);

/// Finished samples are shipped once more than this many are waiting.
const FINISHED_FLUSH_THRESHOLD: usize = 1_000;

/// Finished samples per `FinishedRays` message when flushing.
const FINISHED_BATCH: usize = 2_000;

/// Environment variable carrying the invocation log-stream name.
pub const LOG_STREAM_ENVAR: &str = "SWARM_LOG_STREAM_NAME";

/// Worker configuration from the command line.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Master's control address.
    pub coordinator: SocketAddr,
    /// Storage backend URI.
    pub storage_uri: String,
    /// Ship ray packets reliably.
    pub send_reliably: bool,
    /// Scratch working directory.
    pub scratch_dir: PathBuf,
    /// Invocation log-stream name forwarded in the hello.
    pub log_stream: String,
    /// Seed for peer selection and the handshake seed; random when absent.
    pub seed: Option<u64>,
}

/// Handshake state of a known peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Introduction received, handshake incomplete.
    Connecting,
    /// Seeds exchanged and echoed.
    Connected,
}

/// A known remote worker (peer 0 is the master).
#[derive(Debug)]
pub struct Peer {
    /// Peer's worker id.
    pub id: WorkerId,
    /// Peer's datagram address.
    pub address: SocketAddr,
    /// Handshake state.
    pub state: PeerState,
    /// The peer's seed as learned from its messages.
    pub remote_seed: u32,
    /// Treelets the peer advertised.
    pub treelets: HashSet<TreeletId>,
    /// Handshake attempts made.
    pub attempts: u32,
}

struct Diagnostics {
    path: PathBuf,
    start: Instant,
    last_bytes_sent: u64,
    last_bytes_received: u64,
}

/// The worker process state.
pub struct Worker {
    cfg: WorkerConfig,
    id: Option<WorkerId>,
    my_seed: u32,

    control_tx: OwnedWriteHalf,
    control_rx: mpsc::UnboundedReceiver<Message>,
    udp: DatagramSender,
    udp_rx: mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>,

    backend: Arc<dyn StorageBackend>,
    scene: Option<SceneContext>,

    peers: HashMap<WorkerId, Peer>,
    treelet_owners: HashMap<TreeletId, Vec<WorkerId>>,

    ray_queue: VecDeque<RayState>,
    out_queue: BTreeMap<TreeletId, VecDeque<RayState>>,
    out_size: usize,
    pending: BTreeMap<TreeletId, VecDeque<RayState>>,
    pending_size: usize,
    finished: VecDeque<FinishedRay>,
    needed: BTreeSet<TreeletId>,
    requested: HashSet<TreeletId>,

    parsed: VecDeque<Message>,
    deferred: Vec<Message>,

    stats: WorkerStats,
    arena: ShadeArena,
    diagnostics: Diagnostics,
    stats_last_bytes: (u64, u64),
    rng: StdRng,
    done: bool,
}

fn spawn_control_reader(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
) -> mpsc::UnboundedReceiver<Message> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut parser = MessageParser::new();
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    if parser.parse(&buf[..n]).is_err() {
                        // Protocol violation; the closed channel is fatal
                        // upstream.
                        return;
                    }
                    while let Some(msg) = parser.pop() {
                        if tx.send(msg).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });
    rx
}

impl Worker {
    /// Connect to the master and bind the datagram socket.
    pub async fn connect(cfg: WorkerConfig) -> Result<Self> {
        std::fs::create_dir_all(&cfg.scratch_dir)
            .with_context(|| format!("create scratch dir {}", cfg.scratch_dir.display()))?;
        log::info!("starting worker in {}", cfg.scratch_dir.display());

        let backend = open_backend(&cfg.storage_uri)?;

        let stream = TcpStream::connect(cfg.coordinator)
            .await
            .with_context(|| format!("connect to coordinator {}", cfg.coordinator))?;
        stream.set_nodelay(true)?;
        let (read_half, control_tx) = stream.into_split();
        let control_rx = spawn_control_reader(read_half);

        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        let udp_rx = spawn_receiver(socket.clone());
        let udp = DatagramSender::new(socket);

        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let my_seed = loop {
            let seed: u32 = rng.gen();
            if seed != 0 {
                break seed;
            }
        };

        let diagnostics = Diagnostics {
            path: cfg.scratch_dir.join("worker.DIAG"),
            start: Instant::now(),
            last_bytes_sent: 0,
            last_bytes_received: 0,
        };

        Ok(Self {
            cfg,
            id: None,
            my_seed,
            control_tx,
            control_rx,
            udp,
            udp_rx,
            backend,
            scene: None,
            peers: HashMap::new(),
            treelet_owners: HashMap::new(),
            ray_queue: VecDeque::new(),
            out_queue: BTreeMap::new(),
            out_size: 0,
            pending: BTreeMap::new(),
            pending_size: 0,
            finished: VecDeque::new(),
            needed: BTreeSet::new(),
            requested: HashSet::new(),
            parsed: VecDeque::new(),
            deferred: Vec::new(),
            stats: WorkerStats::default(),
            arena: ShadeArena::new(),
            diagnostics,
            stats_last_bytes: (0, 0),
            rng,
            done: false,
        })
    }

    /// Run the event loop until `Bye` or a fatal error.
    pub async fn run(mut self) -> Result<()> {
        let mut peer_tick = interval(PEER_CHECK_INTERVAL);
        let mut stats_tick = interval(WORKER_STATS_INTERVAL);
        let mut diag_tick = interval(WORKER_DIAGNOSTICS_INTERVAL);
        for tick in [&mut peer_tick, &mut stats_tick, &mut diag_tick] {
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        self.send_control(Hello { log_stream: self.cfg.log_stream.clone() }.to_message())
            .await?;

        while !self.done {
            self.run_ready_handlers().await?;
            if self.done {
                break;
            }

            tokio::select! {
                biased;
                msg = self.control_rx.recv() => match msg {
                    Some(msg) => self.parsed.push_back(msg),
                    None => bail!("connection to coordinator closed"),
                },
                datagram = self.udp_rx.recv() => {
                    let (addr, bytes) = datagram.context("datagram socket closed")?;
                    let mut released = Vec::new();
                    self.udp.receive(addr, &bytes, &mut released).await?;
                    self.parsed.extend(released);
                }
                _ = peer_tick.tick(), if !self.peers.is_empty() => {
                    self.handle_peers().await?;
                }
                _ = stats_tick.tick() => self.handle_worker_stats().await?,
                _ = diag_tick.tick() => self.handle_diagnostics()?,
                _ = std::future::ready(()), if self.has_work() => {}
            }
        }

        self.upload_logs();
        Ok(())
    }

    fn has_work(&self) -> bool {
        !self.parsed.is_empty()
            || (!self.ray_queue.is_empty() && self.scene.is_some())
            || self.out_size > 0
            || self.finished.len() > FINISHED_FLUSH_THRESHOLD
            || !self.needed.is_empty()
    }

    async fn run_ready_handlers(&mut self) -> Result<()> {
        if !self.ray_queue.is_empty() && self.scene.is_some() {
            self.handle_ray_queue();
        }
        if self.out_size > 0 {
            self.handle_out_queue().await?;
        }
        if self.finished.len() > FINISHED_FLUSH_THRESHOLD {
            self.flush_finished(false).await?;
        }
        if !self.parsed.is_empty() {
            self.handle_messages().await?;
        }
        if !self.needed.is_empty() {
            self.handle_needed_treelets().await?;
        }
        Ok(())
    }

    async fn send_control(&mut self, msg: Message) -> Result<()> {
        self.control_tx
            .write_all(&msg.to_bytes())
            .await
            .context("write to coordinator")
    }

    fn push_ray(&mut self, ray: RayState) {
        self.stats.record_waiting_ray(ray.current_treelet());
        self.ray_queue.push_back(ray);
    }

    fn handle_ray_queue(&mut self) {
        let Some(ctx) = self.scene.as_ref() else { return };
        let routed = trace_ray_batch(
            ctx,
            &mut self.ray_queue,
            &mut self.arena,
            &mut self.stats,
            &mut self.finished,
        );
        for ray in routed {
            self.route_ray(ray);
        }
    }

    fn route_ray(&mut self, ray: RayState) {
        let treelet = ray.current_treelet();
        self.stats.record_demanded_ray(treelet);

        let resident = self
            .scene
            .as_ref()
            .is_some_and(|ctx| ctx.store.contains(treelet));
        if resident {
            self.push_ray(ray);
        } else if self.treelet_owners.contains_key(&treelet) {
            self.stats.record_sending_ray(treelet);
            self.out_queue.entry(treelet).or_default().push_back(ray);
            self.out_size += 1;
        } else {
            self.stats.record_pending_ray(treelet);
            self.needed.insert(treelet);
            self.pending.entry(treelet).or_default().push_back(ray);
            self.pending_size += 1;
        }
    }

    async fn handle_out_queue(&mut self) -> Result<()> {
        let treelets: Vec<TreeletId> = self.out_queue.keys().copied().collect();
        for treelet in treelets {
            let Some(mut queue) = self.out_queue.remove(&treelet) else { continue };
            if queue.is_empty() {
                continue;
            }
            let owners = self
                .treelet_owners
                .get(&treelet)
                .expect("outbound queue without owners");
            let peer_id = *owners
                .choose(&mut self.rng)
                .expect("outbound queue with empty owner list");
            let address = self.peers[&peer_id].address;

            let mut held: Option<Vec<u8>> = None;
            while !queue.is_empty() || held.is_some() {
                let mut payload = Vec::new();
                let mut packet_len = FRAME_HEADER_LEN;
                if let Some(record) = held.take() {
                    packet_len += 4 + record.len();
                    push_inner_record(&mut payload, &record);
                }
                while packet_len < UDP_MTU_BYTES {
                    let Some(ray) = queue.pop_front() else { break };
                    let record = encode_ray(&ray);
                    self.out_size -= 1;
                    self.stats.record_sent_ray(treelet);
                    if !payload.is_empty() && packet_len + 4 + record.len() > UDP_MTU_BYTES {
                        held = Some(record);
                        break;
                    }
                    packet_len += 4 + record.len();
                    push_inner_record(&mut payload, &record);
                }
                let msg = Message::new(OpCode::SendRays, payload);
                self.udp
                    .send(address, &msg, self.cfg.send_reliably)
                    .await?;
            }
        }
        Ok(())
    }

    async fn flush_finished(&mut self, all: bool) -> Result<()> {
        let keep = if all { 0 } else { FINISHED_FLUSH_THRESHOLD };
        while self.finished.len() > keep {
            let take = self.finished.len().min(FINISHED_BATCH);
            let mut payload = Vec::new();
            for sample in self.finished.drain(..take) {
                push_inner_record(&mut payload, &sample.encode());
            }
            self.send_control(Message::new(OpCode::FinishedRays, payload))
                .await?;
        }
        Ok(())
    }

    async fn handle_peers(&mut self) -> Result<()> {
        // Handshakes that raced ahead of their introduction get another look.
        let deferred: Vec<Message> = self.deferred.drain(..).collect();
        self.parsed.extend(deferred);

        self.udp.retransmit().await?;

        let Some(worker_id) = self.id else { return Ok(()) };
        let my_seed = self.my_seed;
        let requests: Vec<(SocketAddr, Message)> = self
            .peers
            .values_mut()
            .filter(|peer| peer.state == PeerState::Connecting)
            .map(|peer| {
                peer.attempts += 1;
                let req = ConnectRequest { worker_id, my_seed, your_seed: peer.remote_seed };
                (peer.address, req.to_message())
            })
            .collect();
        for (address, msg) in requests {
            self.udp.send(address, &msg, false).await?;
        }
        Ok(())
    }

    async fn handle_worker_stats(&mut self) -> Result<()> {
        // Ship whatever finished samples are waiting so the master's view of
        // the film and of our queue depths advances together.
        self.flush_finished(true).await?;

        let queue = QueueSnapshot {
            ray: self.ray_queue.len() as u64,
            finished: self.finished.len() as u64,
            pending: self.pending_size as u64,
            out: self.out_size as u64,
            connecting: self
                .peers
                .values()
                .filter(|p| p.state == PeerState::Connecting)
                .count() as u64,
            connected: self
                .peers
                .values()
                .filter(|p| p.state == PeerState::Connected)
                .count() as u64,
            outstanding: self.udp.outstanding() as u64,
        };
        let mut msg = self.stats.snapshot(queue);
        msg.bytes_sent = self.udp.bytes_sent - self.stats_last_bytes.0;
        msg.bytes_received = self.udp.bytes_received - self.stats_last_bytes.1;
        self.stats_last_bytes = (self.udp.bytes_sent, self.udp.bytes_received);
        self.send_control(msg.to_message()).await
    }

    fn handle_diagnostics(&mut self) -> Result<()> {
        let elapsed = self.diagnostics.start.elapsed().as_micros() as u64;
        let line = serde_json::json!({
            "ts": chrono::Utc::now().to_rfc3339(),
            "elapsed_us": elapsed,
            "bytes_sent": self.udp.bytes_sent - self.diagnostics.last_bytes_sent,
            "bytes_received": self.udp.bytes_received - self.diagnostics.last_bytes_received,
            "outstanding": self.udp.outstanding(),
            "rays": self.ray_queue.len(),
            "pending": self.pending_size,
        });
        self.diagnostics.last_bytes_sent = self.udp.bytes_sent;
        self.diagnostics.last_bytes_received = self.udp.bytes_received;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.diagnostics.path)
            .with_context(|| format!("open {}", self.diagnostics.path.display()))?;
        writeln!(file, "{line}").context("append diagnostics")?;
        Ok(())
    }

    async fn handle_messages(&mut self) -> Result<()> {
        while let Some(msg) = self.parsed.pop_front() {
            if !self.process_message(&msg).await? {
                self.deferred.push(msg);
            }
            if self.done {
                break;
            }
        }
        Ok(())
    }

    async fn handle_needed_treelets(&mut self) -> Result<()> {
        let needed = std::mem::take(&mut self.needed);
        for treelet in needed {
            if self.requested.contains(&treelet) {
                continue;
            }
            self.send_control(GetWorker { treelet }.to_message()).await?;
            self.requested.insert(treelet);
        }
        Ok(())
    }

    /// Handle one message. Returns `false` when the message must be retried
    /// later (a handshake from a peer the master has not introduced yet).
    async fn process_message(&mut self, msg: &Message) -> Result<bool> {
        match msg.opcode {
            OpCode::Hey => {
                let ack = HelloAck::decode(&msg.payload)?;
                self.id = Some(ack.worker_id);
                log::info!("worker-id={}", ack.worker_id);

                // Peer 0 is the master; the first request also reveals our
                // datagram address to it.
                let master = Peer {
                    id: 0,
                    address: self.cfg.coordinator,
                    state: PeerState::Connecting,
                    remote_seed: 0,
                    treelets: HashSet::new(),
                    attempts: 1,
                };
                let req = ConnectRequest {
                    worker_id: ack.worker_id,
                    my_seed: self.my_seed,
                    your_seed: 0,
                };
                self.udp.send(master.address, &req.to_message(), false).await?;
                self.peers.insert(0, master);
            }

            OpCode::Ping => {
                self.send_control(Message::empty(OpCode::Pong)).await?;
            }

            OpCode::Pong => {}

            OpCode::GetObjects => {
                let objects = GetObjects::decode(&msg.payload)?;
                self.fetch_objects(&objects.objects)?;
            }

            OpCode::GenerateRays => {
                let generate = GenerateRays::decode(&msg.payload)?;
                let ctx = self
                    .scene
                    .as_ref()
                    .context("GenerateRays before scene objects arrived")?;
                let mut fresh = Vec::new();
                generate_camera_rays(ctx, generate.bounds, &mut fresh);
                log::info!(
                    "generated {} camera rays for tile {:?}",
                    fresh.len(),
                    generate.bounds
                );
                for ray in fresh {
                    self.push_ray(ray);
                }
            }

            OpCode::ConnectTo => {
                let connect = ConnectTo::decode(&msg.payload)?;
                let address: SocketAddr = connect
                    .address
                    .parse()
                    .with_context(|| format!("peer address {:?}", connect.address))?;
                self.peers.entry(connect.worker_id).or_insert_with(|| Peer {
                    id: connect.worker_id,
                    address,
                    state: PeerState::Connecting,
                    remote_seed: 0,
                    treelets: HashSet::new(),
                    attempts: 0,
                });
            }

            OpCode::ConnectionRequest => {
                let req = ConnectRequest::decode(&msg.payload)?;
                let my_seed = self.my_seed;
                let worker_id = self.id.context("handshake before hello ack")?;
                let resident = self
                    .scene
                    .as_ref()
                    .map(|ctx| ctx.store.resident_ids())
                    .unwrap_or_default();
                let Some(peer) = self.peers.get_mut(&req.worker_id) else {
                    // Not introduced yet; retried on the peer tick.
                    return Ok(false);
                };
                peer.remote_seed = req.my_seed;
                let resp = ConnectResponse {
                    worker_id,
                    my_seed,
                    your_seed: req.my_seed,
                    treelets: resident,
                };
                let address = peer.address;
                self.udp.send(address, &resp.to_message(), false).await?;
            }

            OpCode::ConnectionResponse => {
                let resp = ConnectResponse::decode(&msg.payload)?;
                let my_seed = self.my_seed;
                let Some(peer) = self.peers.get_mut(&resp.worker_id) else {
                    return Ok(true);
                };
                peer.remote_seed = resp.my_seed;
                if peer.state != PeerState::Connected && resp.your_seed == my_seed {
                    peer.state = PeerState::Connected;
                    log::debug!("peer {} connected", resp.worker_id);
                    for treelet in resp.treelets {
                        peer.treelets.insert(treelet);
                        let owners = self.treelet_owners.entry(treelet).or_default();
                        if !owners.contains(&resp.worker_id) {
                            owners.push(resp.worker_id);
                        }
                        self.requested.remove(&treelet);
                        self.needed.remove(&treelet);

                        if let Some(mut parked) = self.pending.remove(&treelet) {
                            self.pending_size -= parked.len();
                            self.out_size += parked.len();
                            let out = self.out_queue.entry(treelet).or_default();
                            while let Some(ray) = parked.pop_front() {
                                self.stats.record_sending_ray(treelet);
                                out.push_back(ray);
                            }
                        }
                    }
                }
            }

            OpCode::SendRays => {
                let mut records = InnerRecords::new(&msg.payload);
                while let Some(record) = records.next_record()? {
                    let ray = swarm_wire::decode_ray(record)?;
                    self.stats.record_received_ray(ray.current_treelet());
                    self.push_ray(ray);
                }
            }

            OpCode::RequestDiagnostics => {
                self.handle_diagnostics()?;
                let mut stats = self.stats.snapshot(QueueSnapshot::default());
                stats.diagnostics = true;
                self.send_control(stats.to_message()).await?;
            }

            OpCode::Bye => {
                self.flush_finished(true).await?;
                self.handle_worker_stats().await?;
                self.done = true;
            }

            OpCode::FinishedRays | OpCode::WorkerStats | OpCode::GetWorker => {
                bail!("unexpected opcode {:?} at worker", msg.opcode)
            }
        }
        Ok(true)
    }

    fn fetch_objects(&mut self, keys: &[ObjectKey]) -> Result<()> {
        let mut objects = HashMap::new();
        for key in keys {
            if key.kind == ObjectKind::TriangleMesh {
                // Triangle meshes are packed into treelets.
                continue;
            }
            let bytes = self
                .backend
                .get(&key.storage_key())
                .with_context(|| format!("fetch {key}"))?;
            std::fs::write(self.cfg.scratch_dir.join(key.storage_key()), &bytes)
                .with_context(|| format!("stage {key}"))?;
            objects.insert(*key, bytes);
        }
        let ctx = SceneContext::from_objects(&objects)?;
        log::info!("scene initialized with treelets {:?}", ctx.store.resident_ids());
        self.scene = Some(ctx);
        Ok(())
    }

    fn upload_logs(&mut self) {
        let Some(id) = self.id else { return };
        if let Ok(diag) = std::fs::read(&self.diagnostics.path) {
            if let Err(e) = self.backend.put(&format!("logs/{id}.DIAG"), &diag) {
                log::warn!("diagnostics upload failed: {e}");
            }
        }
        let summary = format!("worker {id} done\n");
        if let Err(e) = self.backend.put(&format!("logs/{id}"), summary.as_bytes()) {
            log::warn!("log upload failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Event-loop integration is covered by the end-to-end tests; these
    // check the routing bookkeeping directly against a hand-built worker.
    struct TestRig {
        worker: Worker,
        _listener: tokio::net::TcpListener,
        _dir: tempfile::TempDir,
    }

    async fn test_worker() -> TestRig {
        let dir = tempfile::tempdir().unwrap();
        // A loopback listener keeps the control connection alive without a
        // master behind it.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cfg = WorkerConfig {
            coordinator: listener.local_addr().unwrap(),
            storage_uri: "mem://".into(),
            send_reliably: false,
            scratch_dir: dir.path().to_path_buf(),
            log_stream: String::new(),
            seed: Some(7),
        };
        let worker = Worker::connect(cfg).await.unwrap();
        TestRig { worker, _listener: listener, _dir: dir }
    }

    fn parked_ray(treelet: TreeletId) -> RayState {
        let mut ray = RayState::default();
        ray.to_visit.push(swarm_model::TreeletRef::new(treelet, 0));
        ray
    }

    #[tokio::test]
    async fn unknown_treelet_parks_the_ray_and_requests_once() {
        let mut rig = test_worker().await;
        let worker = &mut rig.worker;
        worker.route_ray(parked_ray(9));
        worker.route_ray(parked_ray(9));

        assert_eq!(worker.pending_size, 2);
        assert_eq!(worker.pending[&9].len(), 2);
        assert_eq!(worker.needed.iter().copied().collect::<Vec<_>>(), vec![9]);
        assert_eq!(worker.stats.aggregate.pending, 2);
        assert_eq!(worker.stats.aggregate.demanded, 2);

        // The batch collapses to one GetWorker, deduplicated thereafter.
        worker.handle_needed_treelets().await.unwrap();
        assert!(worker.requested.contains(&9));
        worker.needed.insert(9);
        worker.handle_needed_treelets().await.unwrap();
        assert_eq!(worker.requested.len(), 1);
    }

    #[tokio::test]
    async fn connection_response_drains_pending_into_outbound() {
        let mut rig = test_worker().await;
        let worker = &mut rig.worker;
        worker.id = Some(1);
        worker.route_ray(parked_ray(4));
        worker.route_ray(parked_ray(4));
        worker.requested.insert(4);

        worker.peers.insert(
            2,
            Peer {
                id: 2,
                address: "127.0.0.1:9999".parse().unwrap(),
                state: PeerState::Connecting,
                remote_seed: 0,
                treelets: HashSet::new(),
                attempts: 0,
            },
        );

        let resp = ConnectResponse {
            worker_id: 2,
            my_seed: 77,
            your_seed: worker.my_seed,
            treelets: vec![4],
        };
        let handled = worker
            .process_message(&resp.to_message())
            .await
            .unwrap();
        assert!(handled);

        assert_eq!(worker.peers[&2].state, PeerState::Connected);
        assert_eq!(worker.peers[&2].remote_seed, 77);
        assert_eq!(worker.pending_size, 0);
        assert_eq!(worker.out_size, 2);
        assert_eq!(worker.out_queue[&4].len(), 2);
        assert!(!worker.requested.contains(&4));
        assert_eq!(worker.treelet_owners[&4], vec![2]);
    }

    #[tokio::test]
    async fn mismatched_seed_echo_is_ignored() {
        let mut rig = test_worker().await;
        let worker = &mut rig.worker;
        worker.id = Some(1);
        worker.peers.insert(
            2,
            Peer {
                id: 2,
                address: "127.0.0.1:9999".parse().unwrap(),
                state: PeerState::Connecting,
                remote_seed: 0,
                treelets: HashSet::new(),
                attempts: 0,
            },
        );

        let resp = ConnectResponse {
            worker_id: 2,
            my_seed: 77,
            your_seed: worker.my_seed.wrapping_add(1),
            treelets: vec![4],
        };
        worker.process_message(&resp.to_message()).await.unwrap();
        assert_eq!(worker.peers[&2].state, PeerState::Connecting);
        assert!(worker.treelet_owners.is_empty());
    }

    #[tokio::test]
    async fn handshake_from_unknown_peer_is_deferred() {
        let mut rig = test_worker().await;
        let worker = &mut rig.worker;
        worker.id = Some(1);
        let req = ConnectRequest { worker_id: 5, my_seed: 9, your_seed: 0 };
        let handled = worker.process_message(&req.to_message()).await.unwrap();
        assert!(!handled);
    }
}
