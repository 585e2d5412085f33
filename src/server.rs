//! Server role driver (§4.4 "Server", §4.6): accepts one control connection,
//! negotiates parameters, opens the data channel, pumps data until
//! `TEST_END`, exchanges results, and tears down. Exactly one run per call,
//! per §6's "exit by normal return when IPERF_DONE has been sent/received";
//! `main` loops over calls to [`server`] to serve successive clients, per
//! §7's restart policy.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::codec::{self, Command, COOKIE_SIZE};
use crate::error::{Iperf3Error, Result};
use crate::params::{Parameters, Results, StreamResult};
use crate::pump::{DataSocket, PumpState};
use crate::stats::Stats;

pub const DEFAULT_PORT: u16 = 5201;

/// The 4-byte UDP handshake constants (§6).
const UDP_CLIENT_HELLO: u32 = 123_456_789;
const UDP_SERVER_REPLY: [u8; 4] = [0x12, 0x34, 0x56, 0x78];

pub async fn server(debug: bool) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", DEFAULT_PORT)).await?;
    info!(port = DEFAULT_PORT, "server listening");

    let (mut ctrl, peer) = listener.accept().await?;
    info!(%peer, "accepted control connection");

    let mut cookie = [0u8; COOKIE_SIZE];
    codec::read_exact_or_protocol(&mut ctrl, &mut cookie).await?;

    codec::write_cmd(&mut ctrl, Command::ParamExchange).await?;
    let params: Parameters = codec::read_json_blob(&mut ctrl).await?;
    let udp = params.is_udp()?;
    if debug {
        debug!(?params, "received parameters");
    }

    codec::write_cmd(&mut ctrl, Command::CreateStreams).await?;
    let mut data = open_data_channel(listener, udp).await?;

    codec::write_cmd(&mut ctrl, Command::TestStart).await?;
    codec::write_cmd(&mut ctrl, Command::TestRunning).await?;

    let clock = Clock::new();
    let mut stats = Stats::new(clock, &params, udp);
    stats.start();

    // Server sends in reverse mode, receives in forward mode (mirror of the
    // client, §4.5 "TCP reverse ... mirror image").
    let mut pump = PumpState::new(clock, params.resolved_len()?, params.bandwidth, params.reverse, udp);

    let pump_result = run_data_pump(&mut ctrl, &mut data, &mut pump, &mut stats).await;
    stats.stop();

    match pump_result {
        Ok(()) => {}
        Err(e) if e.is_peer_closed() && params.reverse => {
            // §7/§9: a BrokenPipeError-equivalent during reverse-send is a
            // normal termination signal, swallowed here but logged at debug
            // so operators can still see it with RUST_LOG=debug.
            debug!(error = %e, "peer closed data connection during reverse-send, treating as normal end");
        }
        Err(e) => return Err(e),
    }

    codec::write_cmd(&mut ctrl, Command::ExchangeResults).await?;
    let client_results: Results = codec::read_json_blob(&mut ctrl).await?;
    let server_results = build_results(&stats, client_results.streams.first());
    codec::write_json_blob(&mut ctrl, &server_results).await?;

    codec::write_cmd(&mut ctrl, Command::DisplayResults).await?;
    let done = codec::read_cmd(&mut ctrl).await?;
    if Command::from_byte(done) != Some(Command::IperfDone) {
        return Err(Iperf3Error::protocol(format!(
            "expected IPERF_DONE, got command byte {done}"
        )));
    }

    drop(data);
    drop(ctrl);
    info!("session complete");
    Ok(())
}

/// §4.4 server step 3: TCP accepts a second connection on the same
/// listening socket and reads its cookie; UDP closes the listener, binds a
/// datagram socket on the same local address, and completes the handshake.
async fn open_data_channel(listener: TcpListener, udp: bool) -> Result<DataSocket> {
    if udp {
        let local_addr = listener.local_addr()?;
        drop(listener);

        let socket = UdpSocket::bind(local_addr).await?;
        let mut hello = [0u8; 4];
        let (n, peer_addr) = socket.recv_from(&mut hello).await?;
        if n != 4 || u32::from_le_bytes(hello) != UDP_CLIENT_HELLO {
            return Err(Iperf3Error::protocol("malformed UDP handshake datagram"));
        }
        socket.send_to(&UDP_SERVER_REPLY, peer_addr).await?;
        socket.connect(peer_addr).await?;
        Ok(DataSocket::Udp(socket))
    } else {
        let (mut stream, _addr): (TcpStream, SocketAddr) = listener.accept().await?;
        let mut cookie = [0u8; COOKIE_SIZE];
        // §4.4 step 3 / §8 scenario 5: received but never validated.
        codec::read_exact_or_protocol(&mut stream, &mut cookie).await?;
        Ok(DataSocket::Tcp(stream))
    }
}

/// The single-threaded cooperative poll loop of §4.5/§5: one
/// `tokio::select!` over the control socket (always read) and the data
/// socket (read or write depending on role), bounded by `stats.max_dt_ms()`.
async fn run_data_pump(
    ctrl: &mut TcpStream,
    data: &mut DataSocket,
    pump: &mut PumpState,
    stats: &mut Stats,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;

            cmd = codec::read_cmd(ctrl) => {
                let cmd = cmd?;
                if Command::from_byte(cmd) == Some(Command::TestEnd) {
                    return Ok(());
                }
                debug!(cmd, "ignoring command during data pump");
            }

            event = pump.next_event(data) => {
                let (bytes, lost) = event?;
                if lost > 0 {
                    stats.add_lost_packets(lost);
                }
                stats.add_bytes(bytes);
            }

            _ = crate::pump::pacing_timeout(stats.max_dt_ms()) => {}
        }

        stats.update(false);
    }
}

/// Builds this side's `EXCHANGE_RESULTS` payload (§3, §9 CPU/jitter
/// placeholders).
fn build_results(stats: &Stats, _peer_stream: Option<&StreamResult>) -> Results {
    Results {
        cpu_util_total: 1.0,
        cpu_util_user: 0.5,
        cpu_util_system: 0.5,
        sender_has_retransmits: 1,
        congestion_used: "cubic".to_string(),
        streams: vec![StreamResult {
            id: 1,
            bytes: stats.nb0_snapshot(),
            retransmits: 0,
            jitter: 0.0,
            errors: stats.nm0_snapshot(),
            packets: stats.np0_snapshot(),
            start_time: 0.0,
            end_time: stats.elapsed_secs(),
        }],
    }
}
