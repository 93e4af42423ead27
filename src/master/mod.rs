// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.9
// Author: Lukas Bower
// Date Modified: 2026-04-02

//! The master control plane.
//!
//! Owns the authoritative treelet-to-worker map, the worker roster, the
//! film, and the termination condition. Accepts worker connections, hands
//! out assignments and tiles, brokers peer introductions, folds statistics
//! into the demand tracker, and accumulates finished samples.

pub mod assign;
pub mod tiles;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use swarm_model::{Bounds2i, ObjectKey, ObjectKind, TreeletId, WorkerId, ROOT_TREELET};
use swarm_wire::{
    record::InnerRecords, ConnectRequest, ConnectResponse, ConnectTo, FinishedRay, GenerateRays,
    GetObjects, GetWorker, Hello, HelloAck, Message, MessageParser, OpCode, WorkerStatsMsg,
};

use crate::film::Film;
use crate::master::assign::{
    load_static_assignment, uniform_leaf_treelets, Assignment, WORKER_FREE_SPACE,
};
use crate::master::tiles::get_tile;
use crate::scene::camera::Camera;
use crate::scene::manifest::Manifest;
use crate::scene::sampler::SamplerConfig;
use crate::stats::{DemandTracker, WorkerStats};
use crate::storage::open_backend;
use crate::transport::{spawn_receiver, DatagramSender};

const WORKER_REQUEST_INTERVAL: Duration = Duration::from_millis(250);
const STATUS_PRINT_INTERVAL: Duration = Duration::from_millis(1_000);
const WRITE_OUTPUT_INTERVAL: Duration = Duration::from_millis(10_000);

/// The master's fixed handshake seed on the datagram mesh.
const MASTER_SEED: u32 = 121_212;

/// Peer introductions wait until this share of the fleet has registered a
/// datagram address.
const REQUEST_GATE: f64 = 0.9;

/// Master configuration from the command line.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Output directory for the film and run artifacts.
    pub scene_path: PathBuf,
    /// Control/datagram listen port; 0 picks an ephemeral port.
    pub listen_port: u16,
    /// Public address advertised to workers, `ip` only.
    pub public_ip: String,
    /// Storage backend URI.
    pub storage_uri: String,
    /// Expected fleet size; 0 lets workers attach ad hoc.
    pub num_workers: u32,
    /// Cloud region the launcher starts workers in; recorded in logs.
    pub aws_region: String,
    /// Placement policy.
    pub assignment: Assignment,
    /// Print the per-treelet demand table on the status tick.
    pub treelet_stats: bool,
    /// Print the per-worker queue table on the status tick.
    pub worker_stats: bool,
    /// Collect a final diagnostics round before exiting.
    pub collect_diagnostics: bool,
    /// Eagerly introduce every pair of workers as they register.
    pub complete_topology: bool,
    /// Seed for owner selection; random when absent.
    pub seed: Option<u64>,
}

/// What the master knows about one stored scene object.
#[derive(Debug, Default, Clone)]
pub struct SceneObjectInfo {
    /// Serialized size in bytes.
    pub size: u64,
    /// Workers assigned this object.
    pub holders: BTreeSet<WorkerId>,
}

enum WorkerEvent {
    Message(Message),
    Closed,
}

#[derive(Debug)]
struct WorkerRecord {
    control: mpsc::UnboundedSender<Message>,
    udp_address: Option<SocketAddr>,
    objects: HashSet<ObjectKey>,
    free_space: u64,
    tile: Option<Bounds2i>,
    stats: WorkerStats,
}

/// End-of-run report.
pub struct Summary {
    /// The accumulated film.
    pub film: Film,
    /// Paths accounted finished.
    pub finished_paths: u64,
    /// Paths the job set out to trace.
    pub total_paths: u64,
    /// Workers that joined.
    pub workers: usize,
    /// Wall-clock duration.
    pub elapsed: Duration,
    /// Rays shipped between peers, from merged worker stats.
    pub sent_rays: u64,
    /// Rays received from peers, from merged worker stats.
    pub received_rays: u64,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pct = if self.total_paths == 0 {
            100.0
        } else {
            100.0 * self.finished_paths as f64 / self.total_paths as f64
        };
        write!(
            f,
            "finished paths: {}/{} ({pct:.1}%) | workers: {} | \u{2191} {} | \u{2193} {} | time: {:02}:{:02}",
            self.finished_paths,
            self.total_paths,
            self.workers,
            self.sent_rays,
            self.received_rays,
            self.elapsed.as_secs() / 60,
            self.elapsed.as_secs() % 60,
        )
    }
}

/// The master process state.
#[derive(Debug)]
pub struct Master {
    cfg: MasterConfig,
    listener: TcpListener,
    udp: DatagramSender,
    udp_rx: mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>,

    scene_objects: HashMap<ObjectKey, SceneObjectInfo>,
    treelet_ids: Vec<TreeletId>,
    treelet_deps: HashMap<TreeletId, Vec<ObjectKey>>,
    treelet_total_sizes: BTreeMap<TreeletId, u64>,
    static_assignments: Vec<Vec<TreeletId>>,

    sample_bounds: Bounds2i,
    total_paths: u64,
    film: Film,

    workers: BTreeMap<WorkerId, WorkerRecord>,
    initialized: BTreeSet<WorkerId>,
    next_worker_id: WorkerId,
    from_workers_tx: mpsc::UnboundedSender<(WorkerId, WorkerEvent)>,
    from_workers: mpsc::UnboundedReceiver<(WorkerId, WorkerEvent)>,

    pending_requests: VecDeque<(WorkerId, TreeletId)>,
    demand: DemandTracker,
    global_stats: WorkerStats,
    finished_paths: u64,
    diagnostics_received: usize,

    rng: StdRng,
    start: Instant,
}

/// Transitively flatten `key`'s dependency closure.
fn flatten_dependencies(
    edges: &HashMap<ObjectKey, Vec<ObjectKey>>,
    key: ObjectKey,
) -> BTreeSet<ObjectKey> {
    let mut out = BTreeSet::new();
    let mut stack: Vec<ObjectKey> = edges.get(&key).cloned().unwrap_or_default();
    while let Some(dep) = stack.pop() {
        if out.insert(dep) {
            if let Some(next) = edges.get(&dep) {
                stack.extend(next.iter().copied());
            }
        }
    }
    out
}

impl Master {
    /// Load the scene through storage, run Static packing if selected, and
    /// bind the listen sockets.
    pub async fn bind(cfg: MasterConfig) -> Result<Self> {
        let backend = open_backend(&cfg.storage_uri)?;

        let manifest: Manifest = serde_json::from_slice(
            &backend.get(&ObjectKey::new(ObjectKind::Manifest, 0).storage_key())?,
        )
        .context("parse scene manifest")?;
        let camera: Camera = serde_json::from_slice(
            &backend.get(&ObjectKey::new(ObjectKind::Camera, 0).storage_key())?,
        )
        .context("parse camera")?;
        let sampler: SamplerConfig = serde_json::from_slice(
            &backend.get(&ObjectKey::new(ObjectKind::Sampler, 0).storage_key())?,
        )
        .context("parse sampler")?;

        let mut scene_objects = HashMap::new();
        let mut treelet_ids = Vec::new();
        for entry in &manifest.objects {
            scene_objects.insert(
                entry.key,
                SceneObjectInfo { size: entry.size, holders: BTreeSet::new() },
            );
            if entry.key.kind == ObjectKind::Treelet {
                treelet_ids.push(entry.key.id as TreeletId);
            }
        }
        treelet_ids.sort_unstable();

        let edges: HashMap<ObjectKey, Vec<ObjectKey>> =
            manifest.dependencies.iter().cloned().collect();
        let mut treelet_deps = HashMap::new();
        let mut treelet_total_sizes = BTreeMap::new();
        for &tid in &treelet_ids {
            let key = ObjectKey::treelet(tid);
            let deps = flatten_dependencies(&edges, key);
            let mut total = scene_objects
                .get(&key)
                .map_or(0, |info| info.size);
            for dep in &deps {
                total += scene_objects.get(dep).map_or(0, |info| info.size);
            }
            treelet_deps.insert(tid, deps.into_iter().collect::<Vec<_>>());
            treelet_total_sizes.insert(tid, total);
        }

        let static_assignments = if cfg.assignment == Assignment::Static {
            let root_size = treelet_total_sizes.get(&ROOT_TREELET).copied().unwrap_or(0);
            let mut leaf_sizes = treelet_total_sizes.clone();
            leaf_sizes.remove(&ROOT_TREELET);
            load_static_assignment(
                &manifest.treelet_weights,
                &leaf_sizes,
                root_size,
                cfg.num_workers,
            )?
        } else {
            Vec::new()
        };

        let sample_bounds = camera.sample_bounds();
        let total_paths = sample_bounds.area() as u64 * u64::from(sampler.samples_per_pixel);

        let listener = TcpListener::bind(("0.0.0.0", cfg.listen_port))
            .await
            .with_context(|| format!("bind control listener on port {}", cfg.listen_port))?;
        let udp_port = listener.local_addr()?.port();
        let socket = Arc::new(UdpSocket::bind(("0.0.0.0", udp_port)).await?);
        let udp_rx = spawn_receiver(socket.clone());
        let udp = DatagramSender::new(socket);

        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let (from_workers_tx, from_workers) = mpsc::unbounded_channel();

        log::info!(
            "master listening on port {udp_port}; start workers with: \
             swarm-worker --ip {} --port {udp_port} --storage-backend {} (region {})",
            cfg.public_ip,
            cfg.storage_uri,
            cfg.aws_region,
        );

        Ok(Self {
            cfg,
            listener,
            udp,
            udp_rx,
            scene_objects,
            treelet_ids,
            treelet_deps,
            treelet_total_sizes,
            static_assignments,
            sample_bounds,
            total_paths,
            film: Film::new(sample_bounds),
            workers: BTreeMap::new(),
            initialized: BTreeSet::new(),
            next_worker_id: 1,
            from_workers_tx,
            from_workers,
            pending_requests: VecDeque::new(),
            demand: DemandTracker::new(),
            global_stats: WorkerStats::default(),
            finished_paths: 0,
            diagnostics_received: 0,
            rng,
            start: Instant::now(),
        })
    }

    /// The bound control address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run until the job completes or an interrupt arrives, then collect
    /// optional diagnostics, drain the fleet, and write the film.
    pub async fn run(mut self) -> Result<Summary> {
        let mut request_tick = interval(WORKER_REQUEST_INTERVAL);
        let mut status_tick = interval(STATUS_PRINT_INTERVAL);
        let mut flush_tick = interval(WRITE_OUTPUT_INTERVAL);
        for tick in [&mut request_tick, &mut status_tick, &mut flush_tick] {
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                biased;
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.context("accept worker")?;
                    self.handle_accept(stream, peer)?;
                }
                event = self.from_workers.recv() => {
                    let (id, event) = event.expect("master holds a sender");
                    match event {
                        WorkerEvent::Message(msg) => self.process_message(id, &msg)?,
                        WorkerEvent::Closed => bail!("worker died: {id}"),
                    }
                }
                datagram = self.udp_rx.recv() => {
                    let (addr, bytes) = datagram.context("master datagram socket closed")?;
                    let mut released = Vec::new();
                    self.udp.receive(addr, &bytes, &mut released).await?;
                    for msg in released {
                        self.handle_datagram(addr, &msg)?;
                    }
                }
                _ = request_tick.tick(), if !self.pending_requests.is_empty() => {
                    self.handle_worker_requests()?;
                }
                _ = status_tick.tick() => self.update_status(),
                _ = flush_tick.tick() => self.write_output()?,
                _ = tokio::signal::ctrl_c() => {
                    log::warn!("interrupted; shutting down");
                    break;
                }
            }

            if self.job_complete() {
                log::info!("all {} paths finished", self.total_paths);
                break;
            }
        }

        self.shutdown().await?;
        self.write_output()?;

        let elapsed = self.start.elapsed();
        Ok(Summary {
            finished_paths: self.finished_paths,
            total_paths: self.total_paths,
            workers: self.workers.len(),
            elapsed,
            sent_rays: self.global_stats.aggregate.sent,
            received_rays: self.global_stats.aggregate.received,
            film: self.film,
        })
    }

    /// The job is complete when every path has been accounted for and the
    /// fleet is quiescent: no worker reported rays in any queue and every
    /// shipped ray has been received, so nothing is left in flight.
    fn job_complete(&self) -> bool {
        if self.total_paths == 0 || self.finished_paths < self.total_paths {
            return false;
        }
        if self.global_stats.aggregate.sent != self.global_stats.aggregate.received {
            return false;
        }
        self.workers.values().all(|record| {
            let q = &record.stats.queue;
            q.ray + q.finished + q.pending + q.out + q.outstanding == 0
        })
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.cfg.collect_diagnostics && !self.workers.is_empty() {
            log::info!("waiting for diagnostics from {} workers", self.workers.len());
            self.broadcast(Message::empty(OpCode::RequestDiagnostics))?;
            while self.diagnostics_received < self.workers.len() {
                let (id, event) =
                    self.from_workers.recv().await.expect("master holds a sender");
                match event {
                    WorkerEvent::Message(msg) => self.process_message(id, &msg)?,
                    WorkerEvent::Closed => bail!("worker {id} died before diagnostics"),
                }
            }
        }

        self.broadcast(Message::empty(OpCode::Bye))?;
        let mut open = self.workers.len();
        while open > 0 {
            let (id, event) = self.from_workers.recv().await.expect("master holds a sender");
            match event {
                WorkerEvent::Message(msg) => self.process_message(id, &msg)?,
                WorkerEvent::Closed => open -= 1,
            }
        }
        Ok(())
    }

    fn broadcast(&mut self, msg: Message) -> Result<()> {
        let ids: Vec<WorkerId> = self.workers.keys().copied().collect();
        for id in ids {
            self.send_to_worker(id, msg.clone())?;
        }
        Ok(())
    }

    fn send_to_worker(&mut self, id: WorkerId, msg: Message) -> Result<()> {
        let record = self.workers.get(&id).context("send to unknown worker")?;
        if record.control.send(msg).is_err() {
            bail!("worker died: {id}");
        }
        Ok(())
    }

    fn handle_accept(&mut self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        log::info!("incoming connection from {peer}, worker {id}");
        stream.set_nodelay(true)?;

        let (mut read_half, mut write_half) = stream.into_split();
        let events = self.from_workers_tx.clone();
        tokio::spawn(async move {
            let mut parser = MessageParser::new();
            let mut buf = vec![0u8; 16 * 1024];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if parser.parse(&buf[..n]).is_err() {
                            break;
                        }
                        while let Some(msg) = parser.pop() {
                            if events.send((id, WorkerEvent::Message(msg))).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            let _ = events.send((id, WorkerEvent::Closed));
        });

        let (control, mut control_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                if write_half.write_all(&msg.to_bytes()).await.is_err() {
                    return;
                }
            }
        });

        let mut record = WorkerRecord {
            control,
            udp_address: None,
            objects: HashSet::new(),
            free_space: WORKER_FREE_SPACE,
            tile: None,
            stats: WorkerStats::default(),
        };

        // Baseline objects every worker needs.
        for kind in [ObjectKind::Scene, ObjectKind::Camera, ObjectKind::Sampler, ObjectKind::Lights]
        {
            self.assign_object(id, &mut record, ObjectKey::new(kind, 0));
        }

        match self.cfg.assignment {
            Assignment::Uniform => {
                self.assign_treelet(id, &mut record, ROOT_TREELET);
                for treelet in uniform_leaf_treelets(id, self.treelet_ids.len() as u32) {
                    self.assign_treelet(id, &mut record, treelet);
                }
            }
            Assignment::Static => {
                self.assign_treelet(id, &mut record, ROOT_TREELET);
                let index = (id - 1) as usize;
                let Some(treelets) = self.static_assignments.get(index).cloned() else {
                    bail!("worker {id} beyond the packed fleet of {}", self.cfg.num_workers);
                };
                for treelet in treelets {
                    self.assign_treelet(id, &mut record, treelet);
                }
            }
        }

        let tile_count = if self.cfg.num_workers == 0 { 4 } else { self.cfg.num_workers };
        let tile_index = (id - 1) as u32;
        if tile_index < tile_count {
            let tile = get_tile(tile_index, tile_count, self.sample_bounds)?;
            log::info!("worker {id} assigned tile {:?} of {:?}", tile, self.sample_bounds);
            record.tile = Some(tile);
        }

        self.workers.insert(id, record);
        Ok(())
    }

    fn assign_object(&mut self, id: WorkerId, record: &mut WorkerRecord, key: ObjectKey) {
        if record.objects.insert(key) {
            let info = self.scene_objects.entry(key).or_default();
            info.holders.insert(id);
            record.free_space = record.free_space.saturating_sub(info.size);
        }
    }

    fn assign_treelet(&mut self, id: WorkerId, record: &mut WorkerRecord, treelet: TreeletId) {
        self.assign_object(id, record, ObjectKey::treelet(treelet));
        if let Some(deps) = self.treelet_deps.get(&treelet).cloned() {
            for dep in deps {
                self.assign_object(id, record, dep);
            }
        }
    }

    fn process_message(&mut self, id: WorkerId, msg: &Message) -> Result<()> {
        match msg.opcode {
            OpCode::Hey => {
                let hello = Hello::decode(&msg.payload)?;
                if !hello.log_stream.is_empty() {
                    log::info!("worker {id} log stream: {}", hello.log_stream);
                }

                let record = self.workers.get(&id).context("hello from unknown worker")?;
                let mut objects: Vec<ObjectKey> = record.objects.iter().copied().collect();
                objects.sort_unstable();
                let tile = record.tile;

                self.send_to_worker(id, HelloAck { worker_id: id }.to_message())?;
                self.send_to_worker(id, GetObjects { objects }.to_message())?;
                if let Some(bounds) = tile {
                    self.send_to_worker(id, GenerateRays { bounds }.to_message())?;
                }
            }

            OpCode::GetWorker => {
                let req = GetWorker::decode(&msg.payload)?;
                self.pending_requests.push_back((id, req.treelet));
            }

            OpCode::WorkerStats => {
                let stats = WorkerStatsMsg::decode(&msg.payload)?;
                if stats.diagnostics {
                    self.diagnostics_received += 1;
                }
                self.demand.submit(id, &stats, Instant::now());
                self.finished_paths += stats.finished_paths;
                self.global_stats.merge_msg(&stats);
                if let Some(record) = self.workers.get_mut(&id) {
                    record.stats.merge_msg(&stats);
                }
            }

            OpCode::FinishedRays => {
                let mut records = InnerRecords::new(&msg.payload);
                while let Some(record) = records.next_record()? {
                    let sample = FinishedRay::decode(record)?;
                    self.film.add_sample(sample.p_film, sample.l, sample.weight);
                }
            }

            OpCode::Pong => {}

            other => bail!("unhandled message opcode {other:?} from worker {id}"),
        }
        Ok(())
    }

    fn handle_datagram(&mut self, addr: SocketAddr, msg: &Message) -> Result<()> {
        if msg.opcode != OpCode::ConnectionRequest {
            return Ok(());
        }
        let req = ConnectRequest::decode(&msg.payload)?;
        if !self.workers.contains_key(&req.worker_id) {
            bail!("unexpected worker id {} on the datagram socket", req.worker_id);
        }

        let newly_registered = {
            let record = self.workers.get_mut(&req.worker_id).expect("checked above");
            if record.udp_address != Some(addr) {
                record.udp_address = Some(addr);
                true
            } else {
                false
            }
        };
        if newly_registered {
            self.initialized.insert(req.worker_id);
            log::debug!("worker {} registered datagram address {addr}", req.worker_id);

            if self.cfg.complete_topology {
                let others: Vec<WorkerId> = self
                    .initialized
                    .iter()
                    .copied()
                    .filter(|&other| other != req.worker_id)
                    .collect();
                for other in others {
                    if !self.connect_workers(req.worker_id, other)? {
                        bail!("could not connect workers {} and {other}", req.worker_id);
                    }
                }
            }
        }

        let resp = ConnectResponse {
            worker_id: 0,
            my_seed: MASTER_SEED,
            your_seed: req.my_seed,
            treelets: Vec::new(),
        };
        self.send_to_worker(req.worker_id, resp.to_message())?;
        Ok(())
    }

    fn connect_workers(&mut self, a: WorkerId, b: WorkerId) -> Result<bool> {
        let Some(addr_a) = self.workers.get(&a).and_then(|w| w.udp_address) else {
            return Ok(false);
        };
        let Some(addr_b) = self.workers.get(&b).and_then(|w| w.udp_address) else {
            return Ok(false);
        };
        self.send_to_worker(
            a,
            ConnectTo { worker_id: b, address: addr_b.to_string() }.to_message(),
        )?;
        self.send_to_worker(
            b,
            ConnectTo { worker_id: a, address: addr_a.to_string() }.to_message(),
        )?;
        Ok(true)
    }

    fn handle_worker_requests(&mut self) -> Result<()> {
        if (self.initialized.len() as f64) < f64::from(self.cfg.num_workers) * REQUEST_GATE {
            return Ok(());
        }

        let mut unserved = VecDeque::new();
        while let Some((requester, treelet)) = self.pending_requests.pop_front() {
            let key = ObjectKey::treelet(treelet);
            let Some(info) = self.scene_objects.get(&key) else {
                bail!("worker {requester} asked for unknown treelet {treelet}");
            };
            let holders: Vec<WorkerId> = info.holders.iter().copied().collect();
            let served = match holders.choose(&mut self.rng) {
                Some(&owner) => self.connect_workers(requester, owner)?,
                None => false,
            };
            if !served {
                unserved.push_back((requester, treelet));
            }
        }
        self.pending_requests = unserved;
        Ok(())
    }

    fn update_status(&mut self) {
        let elapsed = self.start.elapsed().as_secs();
        let queue = &self.global_stats.queue;
        log::info!(
            "done paths: {}/{} | workers: {} ({}) | requests: {} | \u{2191} {} \u{2193} {} | \
             queues ray {} finished {} pending {} out {} | time {:02}:{:02}",
            self.finished_paths,
            self.total_paths,
            self.workers.len(),
            self.initialized.len(),
            self.pending_requests.len(),
            self.global_stats.aggregate.sent,
            self.global_stats.aggregate.received,
            queue.ray,
            queue.finished,
            queue.pending,
            queue.out,
            elapsed / 60,
            elapsed % 60,
        );

        if self.cfg.treelet_stats {
            let mut line = String::from("treelet demand (rays/s):");
            for &tid in &self.treelet_ids {
                let owners = self
                    .scene_objects
                    .get(&ObjectKey::treelet(tid))
                    .map_or(0, |info| info.holders.len());
                line.push_str(&format!(
                    " T{tid}={:.1}({owners})",
                    self.demand.treelet_demand(tid)
                ));
            }
            log::info!("{line}");
        }

        if self.cfg.worker_stats {
            for (id, record) in &self.workers {
                let q = &record.stats.queue;
                log::info!(
                    "worker {id}: demand {:.1} ray {} pending {} out {} connecting {} connected {}",
                    self.demand.worker_demand(*id),
                    q.ray,
                    q.pending,
                    q.out,
                    q.connecting,
                    q.connected,
                );
            }
        }
    }

    fn write_output(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.cfg.scene_path)
            .with_context(|| format!("create output dir {}", self.cfg.scene_path.display()))?;
        let path = self.cfg.scene_path.join("output.png");
        self.film.write_png(&path)?;
        Ok(())
    }
}
