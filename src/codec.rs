//! Wire framing primitives: command bytes, length-prefixed JSON blobs, cookies.

use crate::error::{Iperf3Error, Result};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const COOKIE_SIZE: usize = 37;
const COOKIE_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Command tags exchanged on the control channel (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    TestStart = 1,
    TestRunning = 2,
    TestEnd = 4,
    ParamExchange = 9,
    CreateStreams = 10,
    ExchangeResults = 13,
    DisplayResults = 14,
    IperfDone = 16,
}

impl Command {
    pub fn from_byte(b: u8) -> Option<Command> {
        match b {
            1 => Some(Command::TestStart),
            2 => Some(Command::TestRunning),
            4 => Some(Command::TestEnd),
            9 => Some(Command::ParamExchange),
            10 => Some(Command::CreateStreams),
            13 => Some(Command::ExchangeResults),
            14 => Some(Command::DisplayResults),
            16 => Some(Command::IperfDone),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Generates a 37-byte cookie: 36 bytes drawn from the base32-ish alphabet,
/// one uniformly random 5-bit draw each, plus a trailing NUL (§3).
pub fn make_cookie() -> [u8; COOKIE_SIZE] {
    let mut cookie = [0u8; COOKIE_SIZE];
    let mut rng = rand::thread_rng();
    for b in cookie.iter_mut().take(COOKIE_SIZE - 1) {
        let idx = rng.gen_range(0..COOKIE_ALPHABET.len());
        *b = COOKIE_ALPHABET[idx];
    }
    // cookie[COOKIE_SIZE - 1] stays 0x00.
    cookie
}

/// Reads a single command byte from the control channel.
pub async fn read_cmd<R: AsyncReadExt + Unpin>(r: &mut R) -> Result<u8> {
    r.read_u8()
        .await
        .map_err(|e| Iperf3Error::protocol(format!("short read on command byte: {e}")))
}

/// Writes a single command byte to the control channel.
pub async fn write_cmd<W: AsyncWriteExt + Unpin>(w: &mut W, cmd: Command) -> Result<()> {
    w.write_u8(cmd.to_byte())
        .await
        .map_err(Iperf3Error::from)?;
    w.flush().await.map_err(Iperf3Error::from)
}

/// Reads a 4-byte big-endian length prefix followed by that many ASCII bytes
/// of JSON, and parses it as `T`.
pub async fn read_json_blob<R, T>(r: &mut R) -> Result<T>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let len = r
        .read_u32()
        .await
        .map_err(|e| Iperf3Error::protocol(format!("short read on blob length: {e}")))?;
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)
        .await
        .map_err(|e| Iperf3Error::protocol(format!("short read on blob body: {e}")))?;
    serde_json::from_slice(&buf).map_err(|e| Iperf3Error::protocol(format!("malformed JSON: {e}")))
}

/// Serializes `value` to JSON and writes it as a 4-byte big-endian
/// length-prefixed blob.
pub async fn write_json_blob<W, T>(w: &mut W, value: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)?;
    w.write_u32(body.len() as u32).await.map_err(Iperf3Error::from)?;
    w.write_all(&body).await.map_err(Iperf3Error::from)?;
    w.flush().await.map_err(Iperf3Error::from)
}

/// Reads exactly `buf.len()` bytes, treating a short read as `ProtocolError`.
pub async fn read_exact_or_protocol<R: AsyncReadExt + Unpin>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf)
        .await
        .map(|_| ())
        .map_err(|e| Iperf3Error::protocol(format!("short read: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_shape() {
        let cookie = make_cookie();
        assert_eq!(cookie.len(), COOKIE_SIZE);
        assert_eq!(cookie[COOKIE_SIZE - 1], 0);
        for &b in &cookie[..COOKIE_SIZE - 1] {
            assert!(
                (b'a'..=b'z').contains(&b) || (b'2'..=b'7').contains(&b),
                "byte {b} not in a-z2-7"
            );
        }
    }

    #[test]
    fn command_round_trip() {
        for &cmd in &[
            Command::TestStart,
            Command::TestRunning,
            Command::TestEnd,
            Command::ParamExchange,
            Command::CreateStreams,
            Command::ExchangeResults,
            Command::DisplayResults,
            Command::IperfDone,
        ] {
            let byte = cmd.to_byte();
            assert_eq!(Command::from_byte(byte), Some(cmd));
        }
        assert_eq!(Command::from_byte(0), None);
        assert_eq!(Command::from_byte(255), None);
    }

    #[tokio::test]
    async fn json_blob_round_trips() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Sample {
            a: u32,
            b: String,
        }
        let value = Sample { a: 7, b: "hi".into() };
        let mut buf = Vec::new();
        write_json_blob(&mut buf, &value).await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded: Sample = read_json_blob(&mut cursor).await.unwrap();
        assert_eq!(decoded, value);
    }
}
