use std::sync::atomic::{AtomicU64, Ordering};

use crate::direction::Direction;

/// Per-session counters, updated from the capture loop and readable from
/// any thread.
#[derive(Default)]
pub struct ListenerStats {
    frames: AtomicU64,
    client_packets: AtomicU64,
    client_bytes: AtomicU64,
    server_packets: AtomicU64,
    server_bytes: AtomicU64,
    malformed: AtomicU64,
    unrelated: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub client_packets: u64,
    pub client_bytes: u64,
    pub server_packets: u64,
    pub server_bytes: u64,
    pub malformed: u64,
    pub unrelated: u64,
}

impl ListenerStats {
    pub fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self, direction: Direction, bytes: usize) {
        let (packets, total) = match direction {
            Direction::FromClient => (&self.client_packets, &self.client_bytes),
            Direction::FromServer => (&self.server_packets, &self.server_bytes),
            Direction::NotRelated => return,
        };
        packets.fetch_add(1, Ordering::Relaxed);
        total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrelated(&self) {
        self.unrelated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            client_packets: self.client_packets.load(Ordering::Relaxed),
            client_bytes: self.client_bytes.load(Ordering::Relaxed),
            server_packets: self.server_packets.load(Ordering::Relaxed),
            server_bytes: self.server_bytes.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unrelated: self.unrelated.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    pub fn forwarded(&self) -> u64 {
        self.client_packets + self.server_packets
    }

    pub fn dropped(&self) -> u64 {
        self.malformed + self.unrelated
    }
}
