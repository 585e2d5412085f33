//! Client role driver (§4.4 "Client", §4.6): connects, reacts to the
//! server's command sequence, drives the data plane concurrently with that
//! reaction loop via a single poll set (§4.4 step 3), and determines the
//! test's own termination by elapsed time rather than a peer signal.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info};

use crate::clock::{Clock, TICKS_PER_SEC};
use crate::codec::{self, Command};
use crate::error::Result;
use crate::params::{Parameters, Results, StreamResult};
use crate::pump::{DataSocket, PumpState};
use crate::stats::Stats;

const UDP_CLIENT_HELLO: u32 = 123_456_789;

#[allow(clippy::too_many_arguments)]
pub async fn client(
    host: &str,
    debug: bool,
    udp: bool,
    reverse: bool,
    bandwidth: u64,
    length: Option<u32>,
    time: u64,
) -> Result<()> {
    let params = Parameters::new_for_client(udp, reverse, bandwidth, length, time);
    let clock = Clock::new();

    let mut ctrl = TcpStream::connect((host, crate::server::DEFAULT_PORT)).await?;
    info!(%host, "connected");
    let cookie = codec::make_cookie();
    ctrl.write_all(&cookie).await?;

    let mut data: Option<DataSocket> = None;
    let mut pump: Option<PumpState> = None;
    let mut stats = Stats::new(clock, &params, udp);
    let ticks_end = params.time * TICKS_PER_SEC;

    let mut seen_test_start = false;
    let mut seen_test_running = false;
    // Set once at the state transition that makes this role's data plane
    // live (TEST_START for reverse, TEST_RUNNING for forward, §4.4/§4.5);
    // unlike `stats.is_running()` it never reverts to false once `stop()`
    // runs, so reverse mode keeps draining the data socket after `ended`.
    let mut data_plane_active = false;
    let mut ended = false;

    loop {
        let pump_ready = pump.is_some() && data.is_some() && data_plane_active && (!ended || reverse);

        tokio::select! {
            biased;

            cmd = codec::read_cmd(&mut ctrl) => {
                let cmd = cmd?;
                match Command::from_byte(cmd) {
                    Some(Command::ParamExchange) => {
                        codec::write_json_blob(&mut ctrl, &params).await?;
                    }
                    Some(Command::CreateStreams) => {
                        let (opened, ps) = open_data_channel(host, &params, udp, reverse, bandwidth, clock).await?;
                        data = Some(opened);
                        pump = Some(ps);
                    }
                    Some(Command::TestStart) => {
                        seen_test_start = true;
                        if reverse {
                            stats.start();
                            data_plane_active = true;
                        }
                    }
                    Some(Command::TestRunning) => {
                        seen_test_running = true;
                        if !reverse {
                            stats.start();
                            if udp {
                                if let Some(ps) = pump.as_mut() {
                                    ps.seed_udp_pacing(stats.t0());
                                }
                            }
                            data_plane_active = true;
                        }
                    }
                    Some(Command::ExchangeResults) => {
                        data = None;
                        pump = None;
                        let client_results = build_results(&stats);
                        codec::write_json_blob(&mut ctrl, &client_results).await?;
                        let server_results: Results = codec::read_json_blob(&mut ctrl).await?;
                        stats.report_receiver(&server_results);
                    }
                    Some(Command::DisplayResults) => {
                        codec::write_cmd(&mut ctrl, Command::IperfDone).await?;
                        drop(ctrl);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        return Ok(());
                    }
                    _ => {
                        if debug {
                            debug!(cmd, "ignoring unexpected command");
                        }
                    }
                }
            }

            event = pump_event(&mut pump, &mut data), if pump_ready => {
                let (bytes, lost) = event?;
                if lost > 0 {
                    stats.add_lost_packets(lost);
                }
                stats.add_bytes(bytes);

                if !ended && seen_test_start && seen_test_running && stats.is_running() {
                    let now = clock.now();
                    if clock.diff(now, stats.t0()) > ticks_end as i64 {
                        codec::write_cmd(&mut ctrl, Command::TestEnd).await?;
                        stats.stop();
                        ended = true;
                    }
                }
            }

            _ = crate::pump::pacing_timeout(stats.max_dt_ms()) => {}
        }

        stats.update(false);
    }
}

async fn pump_event(pump: &mut Option<PumpState>, data: &mut Option<DataSocket>) -> Result<(u64, u64)> {
    match (pump.as_mut(), data.as_mut()) {
        (Some(pump), Some(data)) => pump.next_event(data).await,
        _ => std::future::pending().await,
    }
}

/// §4.4 client `CREATE_STREAMS` handler: opens the data channel and
/// allocates the working buffer.
async fn open_data_channel(
    host: &str,
    params: &Parameters,
    udp: bool,
    reverse: bool,
    bandwidth: u64,
    clock: Clock,
) -> Result<(DataSocket, PumpState)> {
    let socket = if udp {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect((host, crate::server::DEFAULT_PORT)).await?;
        socket.send(&UDP_CLIENT_HELLO.to_le_bytes()).await?;
        let mut reply = [0u8; 4];
        socket.recv(&mut reply).await?;
        DataSocket::Udp(socket)
    } else {
        let mut stream = TcpStream::connect((host, crate::server::DEFAULT_PORT)).await?;
        let cookie = codec::make_cookie();
        stream.write_all(&cookie).await?;
        DataSocket::Tcp(stream)
    };

    // Client is the sender in forward mode, the receiver in reverse mode.
    let pump = PumpState::new(clock, params.resolved_len()?, bandwidth, !reverse, udp);
    Ok((socket, pump))
}

fn build_results(stats: &Stats) -> Results {
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
