// CLASSIFICATION: COMMUNITY
// Filename: transport.rs v0.7
// Author: Lukas Bower
// Date Modified: 2026-04-02

//! Sequenced datagram transport.
//!
//! Every packet carries a 9-byte header (`seq` u64 LE, `flags` u8) below the
//! message frame. Reliable packets use a contiguous per-destination
//! sequence: the sender holds them in a bounded retransmission buffer until
//! acked and re-sends them on the peer tick, and the receiver acks, drops
//! duplicates, and releases messages in send order through a reordering
//! buffer. Unreliable packets are fire-and-forget and may arrive in any
//! order or not at all. The opcode namespace never sees any of this.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use swarm_wire::{CodecError, Message};

/// Bytes of transport header per datagram.
pub const DATAGRAM_HEADER_LEN: usize = 9;

/// MTU budget for a `SendRays` payload, including the 5-byte message frame.
pub const UDP_MTU_BYTES: usize = 1_400;

/// Retransmission buffer cap per peer; the oldest packet is dropped beyond
/// this, abandoning that ray path as the design allows.
const MAX_UNACKED_PER_PEER: usize = 512;

const FLAG_RELIABLE: u8 = 0b0000_0001;
const FLAG_ACK: u8 = 0b0000_0010;

/// Error raised by the datagram layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket failure; fatal to the process.
    #[error("datagram socket: {0}")]
    Io(#[from] io::Error),
    /// Malformed packet from a trusted peer; fatal.
    #[error("datagram codec: {0}")]
    Codec(#[from] CodecError),
    /// Packet shorter than the transport header.
    #[error("short datagram ({0} bytes)")]
    ShortPacket(usize),
}

fn encode_packet(seq: u64, flags: u8, frame: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(DATAGRAM_HEADER_LEN + frame.len());
    out.extend_from_slice(&seq.to_le_bytes());
    out.push(flags);
    out.extend_from_slice(frame);
    out
}

/// Receiver-side ordering state for one sender's reliable stream.
#[derive(Debug, Default)]
struct ReliableInbox {
    next: u64,
    held: BTreeMap<u64, Message>,
}

impl ReliableInbox {
    /// Accept `seq`, releasing every message that is now in order.
    /// Duplicates release nothing. A gap that outlives the sender's
    /// retransmission window is abandoned so the stream cannot wedge on a
    /// packet that will never arrive.
    fn accept(&mut self, seq: u64, message: Message, out: &mut Vec<Message>) {
        if seq < self.next || self.held.contains_key(&seq) {
            return;
        }
        self.held.insert(seq, message);
        if self.held.len() > MAX_UNACKED_PER_PEER {
            if let Some((&lowest, _)) = self.held.iter().next() {
                self.next = lowest;
            }
        }
        while let Some(message) = self.held.remove(&self.next) {
            out.push(message);
            self.next += 1;
        }
    }
}

/// Sending and reliability state over one shared UDP socket.
#[derive(Debug)]
pub struct DatagramSender {
    socket: Arc<UdpSocket>,
    unreliable_seq: u64,
    reliable_seq: HashMap<SocketAddr, u64>,
    unacked: HashMap<SocketAddr, BTreeMap<u64, Vec<u8>>>,
    inbox: HashMap<SocketAddr, ReliableInbox>,
    /// Payload bytes sent since construction.
    pub bytes_sent: u64,
    /// Payload bytes received since construction.
    pub bytes_received: u64,
}

impl DatagramSender {
    /// Wrap a bound socket.
    #[must_use]
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self {
            socket,
            unreliable_seq: 0,
            reliable_seq: HashMap::new(),
            unacked: HashMap::new(),
            inbox: HashMap::new(),
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send one framed message to `addr`. Reliable packets take the next
    /// slot of the per-destination sequence and are remembered until acked.
    pub async fn send(
        &mut self,
        addr: SocketAddr,
        message: &Message,
        reliable: bool,
    ) -> Result<(), TransportError> {
        let (seq, flags) = if reliable {
            let seq = self.reliable_seq.entry(addr).or_insert(0);
            let current = *seq;
            *seq += 1;
            (current, FLAG_RELIABLE)
        } else {
            let seq = self.unreliable_seq;
            self.unreliable_seq += 1;
            (seq, 0)
        };
        let packet = encode_packet(seq, flags, &message.to_bytes());
        self.socket.send_to(&packet, addr).await?;
        self.bytes_sent += packet.len() as u64;
        if reliable {
            let buffer = self.unacked.entry(addr).or_default();
            buffer.insert(seq, packet);
            while buffer.len() > MAX_UNACKED_PER_PEER {
                buffer.pop_first();
            }
        }
        Ok(())
    }

    /// Process one raw datagram received on the socket, appending any
    /// messages it releases to `out` in delivery order. Acks settle the
    /// retransmission buffer; reliable packets are acked, deduplicated and
    /// reordered; unreliable packets pass straight through.
    pub async fn receive(
        &mut self,
        addr: SocketAddr,
        packet: &[u8],
        out: &mut Vec<Message>,
    ) -> Result<(), TransportError> {
        if packet.len() < DATAGRAM_HEADER_LEN {
            return Err(TransportError::ShortPacket(packet.len()));
        }
        self.bytes_received += packet.len() as u64;
        let seq = u64::from_le_bytes(packet[..8].try_into().expect("8 bytes"));
        let flags = packet[8];

        if flags & FLAG_ACK != 0 {
            if let Some(buffer) = self.unacked.get_mut(&addr) {
                buffer.remove(&seq);
                if buffer.is_empty() {
                    self.unacked.remove(&addr);
                }
            }
            return Ok(());
        }

        let message = Message::from_datagram(&packet[DATAGRAM_HEADER_LEN..])?;
        if flags & FLAG_RELIABLE != 0 {
            let ack = encode_packet(seq, FLAG_ACK, &[]);
            self.socket.send_to(&ack, addr).await?;
            self.bytes_sent += ack.len() as u64;
            self.inbox.entry(addr).or_default().accept(seq, message, out);
        } else {
            out.push(message);
        }
        Ok(())
    }

    /// Re-send every unacked packet; called on the peer tick.
    pub async fn retransmit(&mut self) -> Result<(), TransportError> {
        for (addr, buffer) in &self.unacked {
            for packet in buffer.values() {
                self.socket.send_to(packet, *addr).await?;
                self.bytes_sent += packet.len() as u64;
            }
        }
        Ok(())
    }

    /// Packets awaiting acknowledgement across all peers.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.unacked.values().map(BTreeMap::len).sum()
    }
}

/// Spawn a task that forwards raw datagrams from `socket` into a channel.
/// The channel closes when the socket fails, which callers treat as fatal.
pub fn spawn_receiver(
    socket: Arc<UdpSocket>,
) -> mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65_536];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((n, addr)) => {
                    if tx.send((addr, buf[..n].to_vec())).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    log::error!("datagram socket failed: {e}");
                    return;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use swarm_wire::OpCode;

    use super::*;

    async fn pair() -> (DatagramSender, DatagramSender) {
        let a = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let b = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        (DatagramSender::new(a), DatagramSender::new(b))
    }

    async fn recv_raw(s: &DatagramSender) -> (SocketAddr, Vec<u8>) {
        let mut buf = vec![0u8; 65_536];
        let (n, addr) = s.socket.recv_from(&mut buf).await.unwrap();
        (addr, buf[..n].to_vec())
    }

    #[tokio::test]
    async fn unreliable_round_trip() {
        let (mut a, mut b) = pair().await;
        let msg = Message::new(OpCode::SendRays, vec![7; 32]);
        a.send(b.local_addr().unwrap(), &msg, false).await.unwrap();

        let (from, packet) = recv_raw(&b).await;
        let mut out = Vec::new();
        b.receive(from, &packet, &mut out).await.unwrap();
        assert_eq!(out, vec![msg]);
        assert_eq!(a.outstanding(), 0);
    }

    #[tokio::test]
    async fn reliable_packets_are_acked_and_deduplicated() {
        let (mut a, mut b) = pair().await;
        let msg = Message::new(OpCode::ConnectionRequest, vec![1, 2, 3]);
        a.send(b.local_addr().unwrap(), &msg, true).await.unwrap();
        assert_eq!(a.outstanding(), 1);

        let (from, packet) = recv_raw(&b).await;
        let mut out = Vec::new();
        b.receive(from, &packet, &mut out).await.unwrap();
        assert_eq!(out.len(), 1);

        // Simulated retransmission of the same packet is dropped but
        // re-acked.
        out.clear();
        b.receive(from, &packet, &mut out).await.unwrap();
        assert!(out.is_empty());

        // Both acks settle the sender.
        let (from_b, ack) = recv_raw(&a).await;
        let mut none = Vec::new();
        a.receive(from_b, &ack, &mut none).await.unwrap();
        assert!(none.is_empty());
        assert_eq!(a.outstanding(), 0);
    }

    #[tokio::test]
    async fn reliable_messages_are_released_in_send_order() {
        let (mut a, mut b) = pair().await;
        let dest = b.local_addr().unwrap();
        let msgs: Vec<Message> =
            (0..3).map(|i| Message::new(OpCode::SendRays, vec![i])).collect();
        for msg in &msgs {
            a.send(dest, msg, true).await.unwrap();
        }

        let mut packets = Vec::new();
        for _ in 0..3 {
            packets.push(recv_raw(&b).await);
        }
        // Deliver 2, 0, 1: nothing is released until the gap at 0 fills,
        // and everything comes out in send order.
        let mut out = Vec::new();
        let (from, p2) = &packets[2];
        b.receive(*from, p2, &mut out).await.unwrap();
        assert!(out.is_empty());
        let (from, p0) = &packets[0];
        b.receive(*from, p0, &mut out).await.unwrap();
        assert_eq!(out.len(), 1);
        let (from, p1) = &packets[1];
        b.receive(*from, p1, &mut out).await.unwrap();
        assert_eq!(out, msgs);
    }

    #[tokio::test]
    async fn retransmit_repeats_unacked_packets() {
        let (mut a, b) = pair().await;
        let msg = Message::empty(OpCode::Ping);
        a.send(b.local_addr().unwrap(), &msg, true).await.unwrap();
        a.retransmit().await.unwrap();

        let (_, first) = recv_raw(&b).await;
        let (_, second) = recv_raw(&b).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn short_packets_are_rejected() {
        let (mut a, _b) = pair().await;
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            a.receive(addr, &[0u8; 4], &mut out).await,
            Err(TransportError::ShortPacket(4))
        ));
    }

    #[test]
    fn inbox_abandons_a_gap_beyond_the_window() {
        let mut inbox = ReliableInbox::default();
        let mut out = Vec::new();
        // seq 0 never arrives; once the hold exceeds the sender's window the
        // stream skips past it instead of wedging.
        for i in 1..=(MAX_UNACKED_PER_PEER as u64 + 1) {
            inbox.accept(i, Message::empty(OpCode::Ping), &mut out);
        }
        assert_eq!(out.len(), MAX_UNACKED_PER_PEER + 1);
    }

    #[test]
    fn inbox_ignores_duplicates_below_the_watermark() {
        let mut inbox = ReliableInbox::default();
        let mut out = Vec::new();
        let msg = |i: u8| Message::new(OpCode::SendRays, vec![i]);
        inbox.accept(0, msg(0), &mut out);
        inbox.accept(1, msg(1), &mut out);
        assert_eq!(out.len(), 2);
        inbox.accept(0, msg(0), &mut out);
        inbox.accept(1, msg(9), &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(inbox.next, 2);
    }
}
