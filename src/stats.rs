//! Online statistics accumulator (§4.3): cumulative and interval-scoped
//! tallies of bytes/packets/lost-packets, driven by a pacing timer, with the
//! iperf3-style tabular console report.

use crate::clock::{Clock, TICKS_PER_SEC};
use crate::params::{Parameters, Results};

/// Formats `v` as a 7-character right-aligned magnitude with a unit prefix
/// from `{'', 'K', 'M', 'G'}`, switching prefixes once the value reaches 1000
/// in the current prefix (§4.3).
pub fn fmt_size(v: f64, div: f64) -> String {
    let mut value = v;
    let mut unit = "";
    for candidate in ["K", "M", "G"] {
        if value < 1000.0 {
            break;
        }
        value /= div;
        unit = candidate;
    }
    format!("{value:6.2}{unit}")
}

/// Online tally of bytes, packets, and lost packets, sliced into a running
/// cumulative total and an interval scoped to the current pacing-timer
/// window (§3, §4.3).
pub struct Stats {
    clock: Clock,
    pacing_timer_ticks: u64,
    udp: bool,
    reverse: bool,
    running: bool,

    t0: u64,
    t1: u64,
    t3: u64,

    nb0: u64,
    np0: u64,
    nm0: u64,
    nb1: u64,
    np1: u64,
    nm1: u64,
}

impl Stats {
    /// Captures the pacing timer (converted from microseconds to ticks) and
    /// role flags from `params`.
    pub fn new(clock: Clock, params: &Parameters, udp: bool) -> Self {
        let pacing_timer_ticks = params.pacing_timer * (TICKS_PER_SEC / 1_000_000);
        Stats {
            clock,
            pacing_timer_ticks: pacing_timer_ticks.max(1),
            udp,
            reverse: params.reverse,
            running: false,
            t0: 0,
            t1: 0,
            t3: 0,
            nb0: 0,
            np0: 0,
            nm0: 0,
            nb1: 0,
            np1: 0,
            nm1: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn t0(&self) -> u64 {
        self.t0
    }

    /// Cumulative bytes transferred so far (`nb0`), for building the
    /// `EXCHANGE_RESULTS` payload (§3).
    pub fn nb0_snapshot(&self) -> u64 {
        self.nb0
    }

    /// Cumulative packet count so far (`np0`).
    pub fn np0_snapshot(&self) -> u64 {
        self.np0
    }

    /// Cumulative lost-packet count so far (`nm0`).
    pub fn nm0_snapshot(&self) -> u64 {
        self.nm0
    }

    /// Elapsed test time in seconds, `(t3 - t0) / TICKS_PER_SEC` once
    /// `stop()` has run; `(now - t0) / TICKS_PER_SEC` otherwise.
    pub fn elapsed_secs(&self) -> f64 {
        let end = if self.running { self.clock.now() } else { self.t3 };
        self.clock.diff(end, self.t0) as f64 / TICKS_PER_SEC as f64
    }

    /// Records `t0 = t1 = now()`, clears counters, prints the header row.
    pub fn start(&mut self) {
        self.t0 = self.clock.now();
        self.t1 = self.t0;
        self.nb0 = 0;
        self.np0 = 0;
        self.nm0 = 0;
        self.nb1 = 0;
        self.np1 = 0;
        self.nm1 = 0;
        self.running = true;

        if self.udp && self.reverse {
            println!("Interval           Transfer     Bitrate         Jitter  Lost/Total Datagrams");
        } else if self.udp {
            println!("Interval           Transfer     Bitrate         Total Datagrams");
        } else {
            println!("Interval           Transfer     Bitrate");
        }
    }

    /// Milliseconds until the next pacing-timer boundary; `-1` (the sentinel
    /// for "block indefinitely") when not running.
    pub fn max_dt_ms(&self) -> i64 {
        if !self.running {
            return -1;
        }
        let now = self.clock.now();
        let elapsed = self.clock.diff(now, self.t1).max(0) as u64;
        let remaining = self.pacing_timer_ticks.saturating_sub(elapsed);
        (remaining * 1000 / TICKS_PER_SEC) as i64
    }

    /// Increments byte/packet counters by `n`/`1` iff running.
    pub fn add_bytes(&mut self, n: u64) {
        if !self.running {
            return;
        }
        self.nb0 += n;
        self.nb1 += n;
        self.np0 += 1;
        self.np1 += 1;
    }

    /// Increments loss counters by `n` iff running.
    pub fn add_lost_packets(&mut self, n: u64) {
        if !self.running {
            return;
        }
        self.np0 += n;
        self.np1 += n;
        self.nm0 += n;
        self.nm1 += n;
    }

    /// Emits an interval row when `final` or the pacing timer has elapsed
    /// since `t1`, then resets the interval counters.
    pub fn update(&mut self, final_: bool) {
        if !self.running {
            return;
        }
        let now = self.clock.now();
        let elapsed = self.clock.diff(now, self.t1);
        if !final_ && elapsed < self.pacing_timer_ticks as i64 {
            return;
        }
        self.print_line(self.t1, now, self.nb1, self.np1, self.nm1, None);
        self.t1 = now;
        self.nb1 = 0;
        self.np1 = 0;
        self.nm1 = 0;
    }

    /// Finalizes the run: calls `update(true)`, records `t3`, prints the
    /// cumulative sender row.
    pub fn stop(&mut self) {
        self.update(true);
        self.t3 = self.clock.now();
        self.running = false;
        println!("{}", "- ".repeat(30).trim_end());
        self.print_line(self.t0, self.t3, self.nb0, self.np0, self.nm0, Some("sender"));
    }

    /// Prints a cumulative receiver row derived from the peer's single
    /// stream result.
    pub fn report_receiver(&self, results: &Results) {
        if let Some(stream) = results.streams.first() {
            let start_ticks = (stream.start_time * TICKS_PER_SEC as f64) as u64;
            let end_ticks = (stream.end_time * TICKS_PER_SEC as f64) as u64;
            self.print_line(
                self.t0 + start_ticks,
                self.t0 + end_ticks,
                stream.bytes,
                stream.packets,
                stream.errors,
                Some("receiver"),
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn print_line(&self, from: u64, to: u64, bytes: u64, packets: u64, lost: u64, label: Option<&str>) {
        let from_s = self.clock.diff(from, self.t0) as f64 / TICKS_PER_SEC as f64;
        let to_s = self.clock.diff(to, self.t0) as f64 / TICKS_PER_SEC as f64;
        let dt_s = (to_s - from_s).max(1e-9);
        let bits_per_sec = bytes as f64 * 8.0 / dt_s;

        let mut line = format!(
            "[  5] {from_s:5.2}-{to_s:<5.2} sec {}Bytes {}bits/sec",
            fmt_size(bytes as f64, 1024.0),
            fmt_size(bits_per_sec, 1000.0),
        );

        if self.udp {
            if self.reverse {
                line.push_str(&format!("  0.000 ms  {lost}/{packets} ({:.1}%)", loss_pct(lost, packets)));
            } else {
                line.push_str(&format!("  {packets}"));
            }
        }

        if let Some(label) = label {
            line.push_str(&format!("  {label}"));
        }

        println!("{line}");
    }
}

fn loss_pct(lost: u64, packets: u64) -> f64 {
    if packets == 0 {
        0.0
    } else {
        lost as f64 * 100.0 / packets as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameters;

    fn tcp_params() -> Parameters {
        Parameters::new_for_client(false, false, 10 * 1024 * 1024, None, 10)
    }

    #[test]
    fn add_bytes_increments_both_running_and_interval_counters() {
        let mut s = Stats::new(Clock::new(), &tcp_params(), false);
        s.start();
        s.add_bytes(100);
        assert_eq!(s.nb0, 100);
        assert_eq!(s.nb1, 100);
        assert_eq!(s.np0, 1);
        assert_eq!(s.np1, 1);
        s.add_bytes(50);
        assert_eq!(s.nb0, 150);
        assert_eq!(s.nb1, 150);
        assert_eq!(s.np0, 2);
    }

    #[test]
    fn add_bytes_is_noop_when_not_running() {
        let mut s = Stats::new(Clock::new(), &tcp_params(), false);
        s.add_bytes(100);
        assert_eq!(s.nb0, 0);
        assert_eq!(s.np0, 0);
    }

    #[test]
    fn update_with_no_bytes_is_a_noop_on_counters() {
        let mut s = Stats::new(Clock::new(), &tcp_params(), false);
        s.start();
        s.update(false);
        assert_eq!(s.nb0, 0);
        assert_eq!(s.nb1, 0);
    }

    #[test]
    fn stop_after_explicit_final_update_matches_plain_stop() {
        let mut a = Stats::new(Clock::new(), &tcp_params(), false);
        a.start();
        a.add_bytes(1000);
        a.update(true);
        a.t3 = a.clock.now();
        let totals_a = (a.nb0, a.np0, a.nm0);

        let mut b = Stats::new(Clock::new(), &tcp_params(), false);
        b.start();
        b.add_bytes(1000);
        b.stop();
        let totals_b = (b.nb0, b.np0, b.nm0);

        assert_eq!(totals_a, totals_b);
    }

    #[test]
    fn fmt_size_is_monotonic_within_and_across_units() {
        assert!(fmt_size(100.0, 1024.0) < fmt_size(900.0, 1024.0));
        let at_1000 = fmt_size(1000.0, 1024.0);
        assert!(at_1000.ends_with('K'));
    }

    #[test]
    fn max_dt_ms_is_sentinel_when_not_running() {
        let s = Stats::new(Clock::new(), &tcp_params(), false);
        assert_eq!(s.max_dt_ms(), -1);
    }

    #[test]
    fn max_dt_ms_never_negative_other_than_sentinel() {
        let mut s = Stats::new(Clock::new(), &tcp_params(), false);
        s.start();
        assert!(s.max_dt_ms() >= 0);
    }
}
