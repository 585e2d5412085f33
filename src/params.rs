//! Structured representation of the `PARAM_EXCHANGE` and `EXCHANGE_RESULTS`
//! JSON objects (§3). Parsed permissively (unknown keys ignored, missing
//! fields defaulted); serialized strictly to the fields listed in §3 (§9
//! "Dynamic JSON at the protocol boundary").

use crate::error::{Iperf3Error, Result};
use serde::{Deserialize, Serialize};

fn default_client_version() -> String {
    "3.6".to_string()
}
fn default_omit() -> u32 {
    0
}
fn default_parallel() -> u32 {
    1
}
fn default_pacing_timer() -> u64 {
    1000
}
fn default_time() -> u64 {
    10
}
fn default_bandwidth() -> u64 {
    10 * 1024 * 1024
}
fn default_false() -> bool {
    false
}

/// Default TCP payload length (§3): 3000 bytes.
pub const DEFAULT_LEN_TCP: u32 = 3000;
/// Default UDP payload length (§3): `1500 - 42 = 1458` bytes.
pub const DEFAULT_LEN_UDP: u32 = 1500 - 42;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Parameters {
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default = "default_omit")]
    pub omit: u32,
    #[serde(default = "default_parallel")]
    pub parallel: u32,
    #[serde(default = "default_pacing_timer")]
    pub pacing_timer: u64,
    #[serde(default = "default_time")]
    pub time: u64,
    #[serde(default = "default_bandwidth")]
    pub bandwidth: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp: Option<bool>,
    #[serde(default = "default_false")]
    pub reverse: bool,
    /// Missing on the wire when a peer doesn't carry an explicit block size;
    /// §3 assigns it a protocol-specific default, resolved on demand by
    /// [`Parameters::resolved_len`] once `tcp`/`udp` is known (§9 "parse
    /// permissively ... supply defaults for missing ones").
    #[serde(default)]
    pub len: Option<u32>,
}

impl Parameters {
    /// Builds the parameters the client side sends, choosing the correct
    /// default `len` for the protocol per §3.
    pub fn new_for_client(udp: bool, reverse: bool, bandwidth: u64, len: Option<u32>, time: u64) -> Self {
        let default_len = if udp { DEFAULT_LEN_UDP } else { DEFAULT_LEN_TCP };
        Parameters {
            client_version: default_client_version(),
            omit: default_omit(),
            parallel: default_parallel(),
            pacing_timer: default_pacing_timer(),
            time,
            bandwidth,
            tcp: if udp { None } else { Some(true) },
            udp: if udp { Some(true) } else { None },
            reverse,
            len: Some(len.unwrap_or(default_len)),
        }
    }

    /// True if this is a UDP test; validates that exactly one of `tcp`/`udp`
    /// is set, per §7 `ConfigError`.
    pub fn is_udp(&self) -> Result<bool> {
        match (self.tcp.unwrap_or(false), self.udp.unwrap_or(false)) {
            (true, false) => Ok(false),
            (false, true) => Ok(true),
            _ => Err(Iperf3Error::config(
                "parameters must set exactly one of `tcp` or `udp`",
            )),
        }
    }

    /// Resolves `len` to the protocol-specific default (§3) when the peer's
    /// `PARAM_EXCHANGE` blob omitted it.
    pub fn resolved_len(&self) -> Result<u32> {
        let udp = self.is_udp()?;
        Ok(self
            .len
            .unwrap_or(if udp { DEFAULT_LEN_UDP } else { DEFAULT_LEN_TCP }))
    }
}

/// A single stream's result, as exchanged in `EXCHANGE_RESULTS` (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamResult {
    pub id: u32,
    pub bytes: u64,
    pub retransmits: u64,
    pub jitter: f64,
    pub errors: u64,
    pub packets: u64,
    pub start_time: f64,
    pub end_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Results {
    pub cpu_util_total: f64,
    pub cpu_util_user: f64,
    pub cpu_util_system: f64,
    pub sender_has_retransmits: u32,
    pub congestion_used: String,
    pub streams: Vec<StreamResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_round_trip() {
        let params = Parameters::new_for_client(false, false, 10 * 1024 * 1024, None, 10);
        let json = serde_json::to_string(&params).unwrap();
        let decoded: Parameters = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn client_params_pick_protocol_specific_default_len() {
        let tcp = Parameters::new_for_client(false, false, 1, None, 10);
        assert_eq!(tcp.len, Some(DEFAULT_LEN_TCP));
        let udp = Parameters::new_for_client(true, false, 1, None, 10);
        assert_eq!(udp.len, Some(DEFAULT_LEN_UDP));
    }

    #[test]
    fn resolved_len_defaults_per_protocol_when_omitted_on_the_wire() {
        let tcp = r#"{"tcp": true}"#;
        let decoded: Parameters = serde_json::from_str(tcp).unwrap();
        assert_eq!(decoded.len, None);
        assert_eq!(decoded.resolved_len().unwrap(), DEFAULT_LEN_TCP);

        let udp = r#"{"udp": true}"#;
        let decoded: Parameters = serde_json::from_str(udp).unwrap();
        assert_eq!(decoded.len, None);
        assert_eq!(decoded.resolved_len().unwrap(), DEFAULT_LEN_UDP);
    }

    #[test]
    fn is_udp_requires_exactly_one_flag() {
        let mut p = Parameters::new_for_client(false, false, 1, None, 10);
        assert_eq!(p.is_udp().unwrap(), false);
        p.tcp = None;
        assert!(p.is_udp().is_err());
        p.udp = Some(true);
        assert_eq!(p.is_udp().unwrap(), true);
        p.tcp = Some(true);
        assert!(p.is_udp().is_err());
    }

    #[test]
    fn unknown_fields_are_ignored_and_missing_fields_default() {
        let json = r#"{"len": 1200, "tcp": true, "made_up_field": 42}"#;
        let decoded: Parameters = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.len, Some(1200));
        assert_eq!(decoded.client_version, "3.6");
        assert_eq!(decoded.parallel, 1);
    }
}
