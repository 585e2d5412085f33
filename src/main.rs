use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use iperf3rs::cli::{Cli, Role};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let debug = match &cli.role {
        Role::Server { debug } => *debug,
        Role::Client { debug, .. } => *debug,
    };

    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    // §5 "Cancellation": a Ctrl-C causes an orderly shutdown of the current
    // run rather than a mid-loop abort inside the pump itself.
    let run = run_role(cli.role);
    tokio::pin!(run);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
        result = &mut run => {
            if let Err(e) = result {
                eprintln!("iperf3rs: {e}");
                std::process::exit(1);
            }
        }
    }
}

async fn run_role(role: Role) -> iperf3rs::error::Result<()> {
    match role {
        Role::Server { debug } => loop {
            if let Err(e) = iperf3rs::server::server(debug).await {
                eprintln!("iperf3rs: {e}");
            }
        },
        Role::Client {
            host,
            debug,
            udp,
            reverse,
            bandwidth,
            length,
            time,
        } => iperf3rs::client::client(&host, debug, udp, reverse, bandwidth, length, time).await,
    }
}
