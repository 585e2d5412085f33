//! Shared data-pump helpers (§4.5): UDP packet header framing and the UDP
//! send-pacing interval computation. The control-flow shells that call these
//! (one per role, one per direction) live in [`crate::server`] and
//! [`crate::client`] since the two roles multiplex a different pair of
//! sockets and react to different commands.

use crate::clock::{Clock, TICKS_PER_SEC};
use crate::error::{Iperf3Error, Result};
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

/// First 12 bytes of every UDP datagram: seconds, microseconds, sequence id
/// (§3).
pub const UDP_HEADER_SIZE: usize = 12;

/// Waits out a `stats.max_dt_ms()` pacing timeout (§4.3): a non-negative
/// value sleeps that many milliseconds, while the `-1` sentinel ("not
/// running yet", meaning "block indefinitely" per §5/§6's poll primitive)
/// parks forever instead, so the select loop blocks on the control socket
/// rather than spinning a `sleep(0)` every iteration.
pub async fn pacing_timeout(max_dt_ms: i64) {
    match u64::try_from(max_dt_ms) {
        Ok(ms) => tokio::time::sleep(std::time::Duration::from_millis(ms)).await,
        Err(_) => std::future::pending().await,
    }
}

/// `udp_interval = TICKS_PER_SEC * 8 * len / bandwidth` (§4.5). Saturates to
/// `0` rather than panicking when `bandwidth` is large enough to make the
/// true interval sub-tick, so the sender still makes progress one packet per
/// event tick (§8 boundary behavior).
pub fn udp_interval_ticks(len: u32, bandwidth: u64) -> u64 {
    if bandwidth == 0 {
        return 0;
    }
    (TICKS_PER_SEC as u128 * 8 * len as u128 / bandwidth as u128) as u64
}

/// Packs `(seconds, micros, packet_id)` into the first 12 bytes of `buf` as
/// three big-endian u32s.
pub fn pack_udp_header(buf: &mut [u8], now_ticks: u64, packet_id: u32) {
    let seconds = (now_ticks / TICKS_PER_SEC) as u32;
    let micros = ((now_ticks % TICKS_PER_SEC) / 1000) as u32;
    buf[0..4].copy_from_slice(&seconds.to_be_bytes());
    buf[4..8].copy_from_slice(&micros.to_be_bytes());
    buf[8..12].copy_from_slice(&packet_id.to_be_bytes());
}

/// Parses the first 12 bytes of a received UDP datagram; returns
/// `(seconds, micros, packet_id)`.
pub fn unpack_udp_header(buf: &[u8]) -> (u32, u32, u32) {
    let seconds = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let micros = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    let packet_id = u32::from_be_bytes(buf[8..12].try_into().unwrap());
    (seconds, micros, packet_id)
}

/// Sequence tracker for UDP reverse receive: compares each incoming packet
/// id against the expected next id and reports the size of any gap (§4.5,
/// §8 scenario 4).
#[derive(Debug, Default)]
pub struct LossTracker {
    last_seen_id: u32,
}

impl LossTracker {
    /// Returns the number of packets to report lost (0 if none) and updates
    /// internal state to `incoming_id`.
    pub fn observe(&mut self, incoming_id: u32) -> u64 {
        let expected = self.last_seen_id + 1;
        let lost = if incoming_id > expected {
            (incoming_id - expected) as u64
        } else {
            0
        };
        self.last_seen_id = incoming_id;
        lost
    }
}

/// The data channel, opened at `CREATE_STREAMS` (§4.4) and dropped at run
/// end. Variant chosen once per run, by the negotiated protocol.
pub enum DataSocket {
    Tcp(TcpStream),
    /// Always a "connected" socket (§4.4): the peer address is fixed after
    /// the handshake, so send/recv need no explicit address.
    Udp(UdpSocket),
}

/// Drives one direction of one run's data plane: the working buffer, UDP
/// pacing/sequencing state, and the single `next_event` used as a
/// `tokio::select!` branch by both role drivers (§4.5, §5).
pub struct PumpState {
    clock: Clock,
    buf: Vec<u8>,
    is_sender: bool,
    udp: bool,
    udp_interval: u64,
    udp_last_send: u64,
    udp_packet_id: u32,
    loss: LossTracker,
}

impl PumpState {
    /// `is_sender`: true if this role transmits on the data socket this run
    /// (forward-mode client, or reverse-mode server); false if it receives.
    pub fn new(clock: Clock, len: u32, bandwidth: u64, is_sender: bool, udp: bool) -> Self {
        let mut buf = vec![0u8; len as usize];
        if is_sender {
            rand::thread_rng().fill_bytes(&mut buf);
        }
        let udp_interval = udp_interval_ticks(len, bandwidth);
        PumpState {
            clock,
            buf,
            is_sender,
            udp,
            udp_interval,
            udp_last_send: clock.now().wrapping_sub(udp_interval),
            udp_packet_id: 0,
            loss: LossTracker::default(),
        }
    }

    /// Seeds `udp_last_send` so the very first pacing tick fires
    /// immediately, per §4.4 client `TEST_RUNNING` handler
    /// (`udp_last_send = start - udp_interval`).
    pub fn seed_udp_pacing(&mut self, start: u64) {
        self.udp_last_send = start.wrapping_sub(self.udp_interval);
    }

    /// Produces the next data-plane event: `(bytes, lost)`, where `bytes` is
    /// the size to pass to `stats.add_bytes` and `lost` is the gap size (0
    /// unless this is a UDP receiver that just detected a sequence gap) to
    /// pass to `stats.add_lost_packets`.
    ///
    /// Cancel-safety: each branch either performs exactly one atomic
    /// transfer (UDP) or awaits `tokio::time::sleep_until` before doing so
    /// (UDP sender), so dropping this future on cancellation never leaves a
    /// partially-consumed datagram; TCP uses `read_exact`/`write_all` which
    /// are only ever raced against the control-socket branch that itself
    /// resolves to end the pump, at which point the data socket is dropped
    /// too, so a lost partial TCP transfer has no observable effect on
    /// accounting already reported.
    pub async fn next_event(&mut self, data: &mut DataSocket) -> Result<(u64, u64)> {
        match (data, self.udp, self.is_sender) {
            (DataSocket::Tcp(stream), false, true) => {
                stream.write_all(&self.buf).await?;
                Ok((self.buf.len() as u64, 0))
            }
            (DataSocket::Tcp(stream), false, false) => {
                stream.read_exact(&mut self.buf).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        Iperf3Error::PeerClosed
                    } else {
                        Iperf3Error::from(e)
                    }
                })?;
                Ok((self.buf.len() as u64, 0))
            }
            (DataSocket::Udp(socket), true, true) => {
                let due_at = self.udp_last_send.wrapping_add(self.udp_interval);
                wait_until_tick(self.clock, due_at).await;
                let now = self.clock.now();
                self.udp_last_send = self.udp_last_send.wrapping_add(self.udp_interval);
                self.udp_packet_id += 1;
                pack_udp_header(&mut self.buf, now, self.udp_packet_id);
                let n = socket.send(&self.buf).await?;
                Ok((n as u64, 0))
            }
            (DataSocket::Udp(socket), true, false) => {
                let n = socket.recv(&mut self.buf).await?;
                if n < UDP_HEADER_SIZE {
                    return Err(Iperf3Error::protocol("UDP datagram shorter than header"));
                }
                let (_secs, _micros, id) = unpack_udp_header(&self.buf);
                let lost = self.loss.observe(id);
                Ok((n as u64, lost))
            }
            (DataSocket::Tcp(_), true, _) | (DataSocket::Udp(_), false, _) => {
                unreachable!("data socket protocol must match negotiated parameters")
            }
        }
    }
}

/// Sleeps until `due_at` ticks on `clock`, or returns immediately if that
/// instant has already passed.
async fn wait_until_tick(clock: Clock, due_at: u64) {
    let now = clock.now();
    let remaining = clock.diff(due_at, now);
    if remaining > 0 {
        tokio::time::sleep(std::time::Duration::from_nanos(remaining as u64)).await;
    }
}
