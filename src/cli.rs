//! Command-line surface (§10.3): a thin `clap` layer over the two role
//! entry points from §6, mirroring `client(host, *, debug, udp, reverse,
//! bandwidth=10*1024*1024, length=None, time=10)` one keyword at a time.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "iperf3rs", author, version, about = "A wire-compatible iperf3 client/server subset", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub role: Role,
}

#[derive(Debug, Subcommand)]
pub enum Role {
    /// Run as a server, accepting one client run per invocation.
    Server {
        /// Enable verbose debug logging (also controllable via RUST_LOG).
        #[arg(short, long)]
        debug: bool,
    },
    /// Run as a client against a server's control-channel host.
    Client {
        /// Server hostname or address.
        host: String,

        /// Enable verbose debug logging (also controllable via RUST_LOG).
        #[arg(short, long)]
        debug: bool,

        /// Use UDP instead of TCP for the data channel.
        #[arg(short, long)]
        udp: bool,

        /// Reverse mode: the server sends, the client receives.
        #[arg(short = 'R', long)]
        reverse: bool,

        /// Target bandwidth in bits/sec (UDP pacing only); default 10 Mbit/s.
        #[arg(short, long, default_value_t = 10 * 1024 * 1024)]
        bandwidth: u64,

        /// Data payload length in bytes; defaults to 3000 (TCP) or 1458 (UDP).
        #[arg(short, long)]
        length: Option<u32>,

        /// Test duration in seconds.
        #[arg(short, long, default_value_t = 10)]
        time: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn client_defaults_match_spec() {
        let cli = Cli::parse_from(["iperf3rs", "client", "10.0.0.1"]);
        match cli.role {
            Role::Client { bandwidth, time, length, udp, reverse, .. } => {
                assert_eq!(bandwidth, 10 * 1024 * 1024);
                assert_eq!(time, 10);
                assert_eq!(length, None);
                assert!(!udp);
                assert!(!reverse);
            }
            _ => panic!("expected Client role"),
        }
    }
}
