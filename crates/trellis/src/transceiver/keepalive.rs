// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Echo keepalive bookkeeping.
//!
//! Probes carry the wall-clock send time as nanoseconds since the UNIX epoch
//! (u64, big-endian), so the reply alone is enough to measure latency.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Length of the timestamp carried in a probe.
pub const PROBE_PAYLOAD_LEN: usize = 8;

/// Per-connection keepalive state.
#[derive(Debug)]
pub struct Keepalive {
    last_activity: Instant,
    missed_echoes: u32,
    latency: Option<Duration>,
}

impl Keepalive {
    pub fn new(now: Instant) -> Self {
        Self {
            last_activity: now,
            missed_echoes: 0,
            latency: None,
        }
    }

    /// Record traffic in either direction. Probes themselves are not traffic.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// True when the connection has been idle for at least `interval`.
    pub fn should_probe(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= interval
    }

    /// Count a probe as outstanding; returns the number now unanswered.
    pub fn on_probe_sent(&mut self) -> u32 {
        self.missed_echoes = self.missed_echoes.saturating_add(1);
        self.missed_echoes
    }

    /// Handle an ECHO_REPLY payload.
    ///
    /// Returns the measured latency when the payload carries a timestamp.
    pub fn on_reply(&mut self, payload: &[u8], now: SystemTime) -> Option<Duration> {
        let sent = decode_timestamp(payload)?;
        let now_nanos = now.duration_since(UNIX_EPOCH).ok()?.as_nanos();
        let latency = Duration::from_nanos(now_nanos.saturating_sub(u128::from(sent)) as u64);
        self.missed_echoes = 0;
        self.latency = Some(latency);
        Some(latency)
    }

    pub fn missed_echoes(&self) -> u32 {
        self.missed_echoes
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }
}

/// Payload for an ECHO_REQUEST sent at `now`.
pub fn probe_payload(now: SystemTime) -> Vec<u8> {
    let nanos = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    nanos.to_be_bytes().to_vec()
}

fn decode_timestamp(payload: &[u8]) -> Option<u64> {
    let bytes: [u8; PROBE_PAYLOAD_LEN] = payload.get(..PROBE_PAYLOAD_LEN)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(30);

    #[test]
    fn test_one_probe_per_idle_interval() {
        let t0 = Instant::now();
        let mut ka = Keepalive::new(t0);

        assert!(!ka.should_probe(t0 + INTERVAL / 2, INTERVAL));

        // Ticker fires once per interval. Sending a probe does not count as
        // traffic, so each idle tick yields exactly one probe.
        let mut probes = 0;
        for tick in 1..=3 {
            if ka.should_probe(t0 + INTERVAL * tick, INTERVAL) {
                ka.on_probe_sent();
                probes += 1;
            }
        }
        assert_eq!(probes, 3);
        assert_eq!(ka.missed_echoes(), 3);
    }

    #[test]
    fn test_traffic_suppresses_probe() {
        let t0 = Instant::now();
        let mut ka = Keepalive::new(t0);
        ka.touch(t0 + Duration::from_secs(20));
        assert!(!ka.should_probe(t0 + INTERVAL, INTERVAL));
        assert!(ka.should_probe(t0 + Duration::from_secs(50), INTERVAL));
    }

    #[test]
    fn test_reply_measures_latency_and_resets_misses() {
        let mut ka = Keepalive::new(Instant::now());
        ka.on_probe_sent();
        ka.on_probe_sent();

        let sent = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let payload = probe_payload(sent);
        let now = sent + Duration::from_millis(12);

        assert_eq!(ka.on_reply(&payload, now), Some(Duration::from_millis(12)));
        assert_eq!(ka.latency(), Some(Duration::from_millis(12)));
        assert_eq!(ka.missed_echoes(), 0);
    }

    #[test]
    fn test_reply_without_timestamp_is_ignored() {
        let mut ka = Keepalive::new(Instant::now());
        ka.on_probe_sent();
        assert_eq!(ka.on_reply(&[1, 2, 3], SystemTime::now()), None);
        assert_eq!(ka.missed_echoes(), 1);
        assert_eq!(ka.latency(), None);
    }

    #[test]
    fn test_clock_skew_clamps_to_zero() {
        let mut ka = Keepalive::new(Instant::now());
        let now = UNIX_EPOCH + Duration::from_secs(100);
        let payload = probe_payload(now + Duration::from_secs(1));
        assert_eq!(ka.on_reply(&payload, now), Some(Duration::ZERO));
    }
}
