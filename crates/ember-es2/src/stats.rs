//! Telemetry counters for the RHI.
//!
//! Cheap to bump on the render thread, safe to snapshot from another thread
//! when forwarded to an in-game stats overlay.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RhiStats {
    draw_calls: AtomicU64,
    draw_calls_up: AtomicU64,
    primitives_drawn: AtomicU64,
    invalid_meshes: AtomicU64,
    program_changes: AtomicU64,
    programs_compiled: AtomicU64,
    program_cache_hits: AtomicU64,
    program_cache_misses: AtomicU64,
    uniform_bytes_uploaded: AtomicU64,
    driver_errors: AtomicU64,
    presents: AtomicU64,
    suspends: AtomicU64,
    resumes: AtomicU64,
}

impl RhiStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_draw_calls(&self) {
        self.draw_calls.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_draw_calls_up(&self) {
        self.draw_calls_up.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_primitives_drawn(&self, n: u64) {
        self.primitives_drawn.fetch_add(n, Ordering::Relaxed);
    }
    pub fn inc_invalid_meshes(&self) {
        self.invalid_meshes.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_program_changes(&self) {
        self.program_changes.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_programs_compiled(&self) {
        self.programs_compiled.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_program_cache_hits(&self) {
        self.program_cache_hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_program_cache_misses(&self) {
        self.program_cache_misses.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_uniform_bytes_uploaded(&self, bytes: u64) {
        self.uniform_bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }
    pub fn inc_driver_errors(&self) {
        self.driver_errors.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_presents(&self) {
        self.presents.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_suspends(&self) {
        self.suspends.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_resumes(&self) {
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RhiStatsSnapshot {
        RhiStatsSnapshot {
            draw_calls: self.draw_calls.load(Ordering::Relaxed),
            draw_calls_up: self.draw_calls_up.load(Ordering::Relaxed),
            primitives_drawn: self.primitives_drawn.load(Ordering::Relaxed),
            invalid_meshes: self.invalid_meshes.load(Ordering::Relaxed),
            program_changes: self.program_changes.load(Ordering::Relaxed),
            programs_compiled: self.programs_compiled.load(Ordering::Relaxed),
            program_cache_hits: self.program_cache_hits.load(Ordering::Relaxed),
            program_cache_misses: self.program_cache_misses.load(Ordering::Relaxed),
            uniform_bytes_uploaded: self.uniform_bytes_uploaded.load(Ordering::Relaxed),
            driver_errors: self.driver_errors.load(Ordering::Relaxed),
            presents: self.presents.load(Ordering::Relaxed),
            suspends: self.suspends.load(Ordering::Relaxed),
            resumes: self.resumes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RhiStatsSnapshot {
    pub draw_calls: u64,
    pub draw_calls_up: u64,
    pub primitives_drawn: u64,
    pub invalid_meshes: u64,
    pub program_changes: u64,
    pub programs_compiled: u64,
    pub program_cache_hits: u64,
    pub program_cache_misses: u64,
    pub uniform_bytes_uploaded: u64,
    pub driver_errors: u64,
    pub presents: u64,
    pub suspends: u64,
    pub resumes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = RhiStats::new();
        stats.inc_draw_calls();
        stats.inc_draw_calls();
        stats.add_primitives_drawn(12);
        stats.inc_invalid_meshes();
        let snap = stats.snapshot();
        assert_eq!(snap.draw_calls, 2);
        assert_eq!(snap.primitives_drawn, 12);
        assert_eq!(snap.invalid_meshes, 1);
        assert_eq!(snap.presents, 0);
    }
}
