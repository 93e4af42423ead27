// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Typed payload bodies for every control-plane opcode.
// Author: Lukas Bower

//! Typed message payloads.
//!
//! Each payload encodes to one field-tagged record; see [`crate::record`]
//! for the encoding. Decoders tolerate unknown fields and report missing
//! required ones.

use glam::{IVec2, Vec2};

use swarm_model::{Bounds2i, ObjectKey, ObjectKind, Rgb, TreeletId, WorkerId};

use crate::error::CodecError;
use crate::frame::{Message, OpCode};
use crate::record::{RecordReader, RecordWriter};

/// Worker hello: the body of the initial `Hey`, carrying the hosting
/// platform's log-stream name (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hello {
    /// Invocation log-stream name, or empty when not running on a platform
    /// that provides one.
    pub log_stream: String,
}

impl Hello {
    /// Encode into a `Hey` message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut w = RecordWriter::new();
        w.put_str(1, &self.log_stream);
        Message::new(OpCode::Hey, w.into_bytes())
    }

    /// Decode from a `Hey` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut out = Self::default();
        let mut r = RecordReader::new(payload);
        while let Some(f) = r.next()? {
            if f.number() == 1 {
                out.log_stream = f.str()?.to_owned();
            }
        }
        Ok(out)
    }
}

/// Master's `Hey` reply: the id assigned to the connecting worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloAck {
    /// Assigned worker id.
    pub worker_id: WorkerId,
}

impl HelloAck {
    /// Encode into a `Hey` message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut w = RecordWriter::new();
        w.put_u64(1, self.worker_id);
        Message::new(OpCode::Hey, w.into_bytes())
    }

    /// Decode from a `Hey` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut worker_id = None;
        let mut r = RecordReader::new(payload);
        while let Some(f) = r.next()? {
            if f.number() == 1 {
                worker_id = Some(f.u64()?);
            }
        }
        Ok(Self { worker_id: worker_id.ok_or(CodecError::MissingField(1))? })
    }
}

fn put_object_key(w: &mut RecordWriter, field: u32, key: &ObjectKey) {
    w.put_record(field, |k| {
        k.put_u32(1, key.kind.code());
        k.put_u64(2, key.id);
    });
}

fn read_object_key(mut r: RecordReader<'_>) -> Result<ObjectKey, CodecError> {
    let mut kind = None;
    let mut id = None;
    while let Some(f) = r.next()? {
        match f.number() {
            1 => {
                kind = Some(
                    ObjectKind::from_code(f.u32()?).ok_or(CodecError::InvalidValue(1))?,
                );
            }
            2 => id = Some(f.u64()?),
            _ => {}
        }
    }
    Ok(ObjectKey {
        kind: kind.ok_or(CodecError::MissingField(1))?,
        id: id.ok_or(CodecError::MissingField(2))?,
    })
}

/// The set of objects a worker must fetch from storage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetObjects {
    /// Keys to fetch, in assignment order.
    pub objects: Vec<ObjectKey>,
}

impl GetObjects {
    /// Encode into a `GetObjects` message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut w = RecordWriter::new();
        for key in &self.objects {
            put_object_key(&mut w, 1, key);
        }
        Message::new(OpCode::GetObjects, w.into_bytes())
    }

    /// Decode from a `GetObjects` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut out = Self::default();
        let mut r = RecordReader::new(payload);
        while let Some(f) = r.next()? {
            if f.number() == 1 {
                out.objects.push(read_object_key(f.record()?)?);
            }
        }
        Ok(out)
    }
}

fn put_bounds(w: &mut RecordWriter, field: u32, b: &Bounds2i) {
    w.put_record(field, |r| {
        r.put_i32(1, b.min.x);
        r.put_i32(2, b.min.y);
        r.put_i32(3, b.max.x);
        r.put_i32(4, b.max.y);
    });
}

fn read_bounds(mut r: RecordReader<'_>) -> Result<Bounds2i, CodecError> {
    let (mut x0, mut y0, mut x1, mut y1) = (0, 0, 0, 0);
    while let Some(f) = r.next()? {
        match f.number() {
            1 => x0 = f.i32()?,
            2 => y0 = f.i32()?,
            3 => x1 = f.i32()?,
            4 => y1 = f.i32()?,
            _ => {}
        }
    }
    Ok(Bounds2i::new(IVec2::new(x0, y0), IVec2::new(x1, y1)))
}

/// Instruct a worker to generate camera rays for its screen tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateRays {
    /// Tile rectangle in sample coordinates.
    pub bounds: Bounds2i,
}

impl GenerateRays {
    /// Encode into a `GenerateRays` message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut w = RecordWriter::new();
        put_bounds(&mut w, 1, &self.bounds);
        Message::new(OpCode::GenerateRays, w.into_bytes())
    }

    /// Decode from a `GenerateRays` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut r = RecordReader::new(payload);
        while let Some(f) = r.next()? {
            if f.number() == 1 {
                return Ok(Self { bounds: read_bounds(f.record()?)? });
            }
        }
        Err(CodecError::MissingField(1))
    }
}

/// Introduction to a peer: its id and datagram address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTo {
    /// The peer's worker id.
    pub worker_id: WorkerId,
    /// The peer's datagram address, `ip:port`.
    pub address: String,
}

impl ConnectTo {
    /// Encode into a `ConnectTo` message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut w = RecordWriter::new();
        w.put_u64(1, self.worker_id);
        w.put_str(2, &self.address);
        Message::new(OpCode::ConnectTo, w.into_bytes())
    }

    /// Decode from a `ConnectTo` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut worker_id = None;
        let mut address = None;
        let mut r = RecordReader::new(payload);
        while let Some(f) = r.next()? {
            match f.number() {
                1 => worker_id = Some(f.u64()?),
                2 => address = Some(f.str()?.to_owned()),
                _ => {}
            }
        }
        Ok(Self {
            worker_id: worker_id.ok_or(CodecError::MissingField(1))?,
            address: address.ok_or(CodecError::MissingField(2))?,
        })
    }
}

/// Handshake request sent over the datagram channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Sender's worker id.
    pub worker_id: WorkerId,
    /// Sender's handshake seed.
    pub my_seed: u32,
    /// The receiver's seed as known to the sender, 0 when unknown.
    pub your_seed: u32,
}

impl ConnectRequest {
    /// Encode into a `ConnectionRequest` message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut w = RecordWriter::new();
        w.put_u64(1, self.worker_id);
        w.put_u32(2, self.my_seed);
        w.put_u32(3, self.your_seed);
        Message::new(OpCode::ConnectionRequest, w.into_bytes())
    }

    /// Decode from a `ConnectionRequest` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut worker_id = None;
        let (mut my_seed, mut your_seed) = (0, 0);
        let mut r = RecordReader::new(payload);
        while let Some(f) = r.next()? {
            match f.number() {
                1 => worker_id = Some(f.u64()?),
                2 => my_seed = f.u32()?,
                3 => your_seed = f.u32()?,
                _ => {}
            }
        }
        Ok(Self { worker_id: worker_id.ok_or(CodecError::MissingField(1))?, my_seed, your_seed })
    }
}

/// Handshake reply advertising the responder's resident treelets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Responder's worker id.
    pub worker_id: WorkerId,
    /// Responder's handshake seed.
    pub my_seed: u32,
    /// Echo of the requester's seed; a mismatch invalidates the reply.
    pub your_seed: u32,
    /// Treelets resident at the responder.
    pub treelets: Vec<TreeletId>,
}

impl ConnectResponse {
    /// Encode into a `ConnectionResponse` message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut w = RecordWriter::new();
        w.put_u64(1, self.worker_id);
        w.put_u32(2, self.my_seed);
        w.put_u32(3, self.your_seed);
        for &t in &self.treelets {
            w.put_u32(4, t);
        }
        Message::new(OpCode::ConnectionResponse, w.into_bytes())
    }

    /// Decode from a `ConnectionResponse` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut worker_id = None;
        let (mut my_seed, mut your_seed) = (0, 0);
        let mut treelets = Vec::new();
        let mut r = RecordReader::new(payload);
        while let Some(f) = r.next()? {
            match f.number() {
                1 => worker_id = Some(f.u64()?),
                2 => my_seed = f.u32()?,
                3 => your_seed = f.u32()?,
                4 => treelets.push(f.u32()?),
                _ => {}
            }
        }
        Ok(Self {
            worker_id: worker_id.ok_or(CodecError::MissingField(1))?,
            my_seed,
            your_seed,
            treelets,
        })
    }
}

/// Request for the datagram address of some worker holding a treelet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetWorker {
    /// The treelet an owner is needed for.
    pub treelet: TreeletId,
}

impl GetWorker {
    /// Encode into a `GetWorker` message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut w = RecordWriter::new();
        w.put_u32(1, self.treelet);
        Message::new(OpCode::GetWorker, w.into_bytes())
    }

    /// Decode from a `GetWorker` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut r = RecordReader::new(payload);
        while let Some(f) = r.next()? {
            if f.number() == 1 {
                return Ok(Self { treelet: f.u32()? });
            }
        }
        Err(CodecError::MissingField(1))
    }
}

/// Per-treelet counters for the seven categories of ray movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RayCounters {
    /// Rays pushed onto the local queue.
    pub waiting: u64,
    /// Rays popped for processing.
    pub processed: u64,
    /// Rays shipped to a peer.
    pub sent: u64,
    /// Rays received from a peer.
    pub received: u64,
    /// Rays that named this treelet as their next target.
    pub demanded: u64,
    /// Rays enqueued for sending.
    pub sending: u64,
    /// Rays parked awaiting owner resolution.
    pub pending: u64,
}

impl RayCounters {
    /// Fold `other` into this counter set.
    pub fn merge(&mut self, other: &RayCounters) {
        self.waiting += other.waiting;
        self.processed += other.processed;
        self.sent += other.sent;
        self.received += other.received;
        self.demanded += other.demanded;
        self.sending += other.sending;
        self.pending += other.pending;
    }

    fn encode_into(&self, w: &mut RecordWriter, field: u32) {
        w.put_record(field, |c| {
            c.put_u64(1, self.waiting);
            c.put_u64(2, self.processed);
            c.put_u64(3, self.sent);
            c.put_u64(4, self.received);
            c.put_u64(5, self.demanded);
            c.put_u64(6, self.sending);
            c.put_u64(7, self.pending);
        });
    }

    fn decode_from(mut r: RecordReader<'_>) -> Result<Self, CodecError> {
        let mut out = Self::default();
        while let Some(f) = r.next()? {
            match f.number() {
                1 => out.waiting = f.u64()?,
                2 => out.processed = f.u64()?,
                3 => out.sent = f.u64()?,
                4 => out.received = f.u64()?,
                5 => out.demanded = f.u64()?,
                6 => out.sending = f.u64()?,
                7 => out.pending = f.u64()?,
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Instantaneous queue depths at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueSnapshot {
    /// Local ray queue depth.
    pub ray: u64,
    /// Finished queue depth.
    pub finished: u64,
    /// Pending queue depth.
    pub pending: u64,
    /// Outbound queue depth across all peers.
    pub out: u64,
    /// Peers still handshaking.
    pub connecting: u64,
    /// Peers fully connected.
    pub connected: u64,
    /// Datagrams awaiting acknowledgement.
    pub outstanding: u64,
}

impl QueueSnapshot {
    fn encode_into(&self, w: &mut RecordWriter, field: u32) {
        w.put_record(field, |q| {
            q.put_u64(1, self.ray);
            q.put_u64(2, self.finished);
            q.put_u64(3, self.pending);
            q.put_u64(4, self.out);
            q.put_u64(5, self.connecting);
            q.put_u64(6, self.connected);
            q.put_u64(7, self.outstanding);
        });
    }

    fn decode_from(mut r: RecordReader<'_>) -> Result<Self, CodecError> {
        let mut out = Self::default();
        while let Some(f) = r.next()? {
            match f.number() {
                1 => out.ray = f.u64()?,
                2 => out.finished = f.u64()?,
                3 => out.pending = f.u64()?,
                4 => out.out = f.u64()?,
                5 => out.connecting = f.u64()?,
                6 => out.connected = f.u64()?,
                7 => out.outstanding = f.u64()?,
                _ => {}
            }
        }
        Ok(out)
    }
}

/// One stats-tick snapshot shipped to the master.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkerStatsMsg {
    /// Paths completed since the previous snapshot.
    pub finished_paths: u64,
    /// Counters aggregated across all treelets.
    pub aggregate: RayCounters,
    /// Queue depths at snapshot time.
    pub queue: QueueSnapshot,
    /// Counters scoped by the treelet current at event time.
    pub per_treelet: Vec<(TreeletId, RayCounters)>,
    /// Datagram bytes sent since the previous snapshot.
    pub bytes_sent: u64,
    /// Datagram bytes received since the previous snapshot.
    pub bytes_received: u64,
    /// Set on the final snapshot answering `RequestDiagnostics`.
    pub diagnostics: bool,
}

impl WorkerStatsMsg {
    /// Encode into a `WorkerStats` message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut w = RecordWriter::new();
        w.put_u64(1, self.finished_paths);
        self.aggregate.encode_into(&mut w, 2);
        self.queue.encode_into(&mut w, 3);
        for (treelet, counters) in &self.per_treelet {
            w.put_record(4, |e| {
                e.put_u32(1, *treelet);
                counters.encode_into(e, 2);
            });
        }
        w.put_u64(5, self.bytes_sent);
        w.put_u64(6, self.bytes_received);
        w.put_bool(7, self.diagnostics);
        Message::new(OpCode::WorkerStats, w.into_bytes())
    }

    /// Decode from a `WorkerStats` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut out = Self::default();
        let mut r = RecordReader::new(payload);
        while let Some(f) = r.next()? {
            match f.number() {
                1 => out.finished_paths = f.u64()?,
                2 => out.aggregate = RayCounters::decode_from(f.record()?)?,
                3 => out.queue = QueueSnapshot::decode_from(f.record()?)?,
                4 => {
                    let mut entry = f.record()?;
                    let mut treelet = None;
                    let mut counters = RayCounters::default();
                    while let Some(e) = entry.next()? {
                        match e.number() {
                            1 => treelet = Some(e.u32()?),
                            2 => counters = RayCounters::decode_from(e.record()?)?,
                            _ => {}
                        }
                    }
                    out.per_treelet
                        .push((treelet.ok_or(CodecError::MissingField(1))?, counters));
                }
                5 => out.bytes_sent = f.u64()?,
                6 => out.bytes_received = f.u64()?,
                7 => out.diagnostics = f.bool()?,
                _ => {}
            }
        }
        Ok(out)
    }
}

/// One finished radiance sample, streamed inside a `FinishedRays` payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishedRay {
    /// Film position of the sample.
    pub p_film: Vec2,
    /// Radiance contribution.
    pub l: Rgb,
    /// Camera sample weight.
    pub weight: f32,
}

impl FinishedRay {
    /// Encode as one inner record.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = RecordWriter::new();
        w.put_f32(1, self.p_film.x);
        w.put_f32(2, self.p_film.y);
        w.put_f32(3, self.l.r);
        w.put_f32(4, self.l.g);
        w.put_f32(5, self.l.b);
        w.put_f32(6, self.weight);
        w.into_bytes()
    }

    /// Decode one inner record.
    pub fn decode(record: &[u8]) -> Result<Self, CodecError> {
        let mut out =
            Self { p_film: Vec2::ZERO, l: Rgb::ZERO, weight: 0.0 };
        let mut r = RecordReader::new(record);
        while let Some(f) = r.next()? {
            match f.number() {
                1 => out.p_film.x = f.f32()?,
                2 => out.p_film.y = f.f32()?,
                3 => out.l.r = f.f32()?,
                4 => out.l.g = f.f32()?,
                5 => out.l.b = f.f32()?,
                6 => out.weight = f.f32()?,
                _ => {}
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trip() {
        let hello = Hello { log_stream: "2026/02/14/[$LATEST]abcdef".into() };
        let msg = hello.to_message();
        assert_eq!(msg.opcode, OpCode::Hey);
        assert_eq!(Hello::decode(&msg.payload).unwrap(), hello);

        let ack = HelloAck { worker_id: 17 };
        assert_eq!(HelloAck::decode(&ack.to_message().payload).unwrap(), ack);
    }

    #[test]
    fn get_objects_round_trip() {
        let msg = GetObjects {
            objects: vec![
                ObjectKey::new(ObjectKind::Scene, 0),
                ObjectKey::new(ObjectKind::Camera, 0),
                ObjectKey::treelet(5),
            ],
        };
        assert_eq!(GetObjects::decode(&msg.to_message().payload).unwrap(), msg);
    }

    #[test]
    fn generate_rays_round_trip_negative_bounds() {
        let msg = GenerateRays {
            bounds: Bounds2i::new(IVec2::new(-4, 0), IVec2::new(12, 9)),
        };
        assert_eq!(GenerateRays::decode(&msg.to_message().payload).unwrap(), msg);
    }

    #[test]
    fn handshake_round_trips() {
        let req = ConnectRequest { worker_id: 3, my_seed: 0xDEAD_BEEF, your_seed: 0 };
        assert_eq!(ConnectRequest::decode(&req.to_message().payload).unwrap(), req);

        let resp = ConnectResponse {
            worker_id: 3,
            my_seed: 11,
            your_seed: 0xDEAD_BEEF,
            treelets: vec![0, 4, 9],
        };
        assert_eq!(ConnectResponse::decode(&resp.to_message().payload).unwrap(), resp);
    }

    #[test]
    fn worker_stats_round_trip() {
        let mut msg = WorkerStatsMsg {
            finished_paths: 12,
            bytes_sent: 4096,
            bytes_received: 1024,
            diagnostics: true,
            ..Default::default()
        };
        msg.aggregate.processed = 300;
        msg.queue.ray = 7;
        msg.per_treelet.push((0, RayCounters { demanded: 5, ..Default::default() }));
        msg.per_treelet.push((3, RayCounters { sent: 2, pending: 1, ..Default::default() }));
        assert_eq!(WorkerStatsMsg::decode(&msg.to_message().payload).unwrap(), msg);
    }

    #[test]
    fn finished_ray_round_trip() {
        let ray = FinishedRay {
            p_film: Vec2::new(3.5, 0.25),
            l: Rgb::new(0.1, 0.9, 0.3),
            weight: 1.0,
        };
        assert_eq!(FinishedRay::decode(&ray.encode()).unwrap(), ray);
    }

    #[test]
    fn missing_required_field_is_an_error() {
        assert_eq!(HelloAck::decode(&[]), Err(CodecError::MissingField(1)));
        assert_eq!(GetWorker::decode(&[]), Err(CodecError::MissingField(1)));
    }
}
