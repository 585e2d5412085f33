//! A wire-compatible reimplementation of the iperf3 control protocol and
//! data pump, restricted to single-stream TCP/UDP, forward/reverse, one
//! test run per process invocation.
//!
//! ```no_run
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> iperf3rs::error::Result<()> {
//!     iperf3rs::server::server(false).await
//! }
//! ```

pub mod clock;
pub mod codec;
pub mod error;
pub mod params;
pub mod pump;
pub mod stats;

pub mod client;
pub mod server;

pub mod cli;

pub use error::{Iperf3Error, Result};
