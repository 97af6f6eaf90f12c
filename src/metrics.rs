use serde::Serialize;
use std::io::{stderr, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant};

/// Resolver counters, shared between lookup tasks and the progress reporter.
#[derive(Default, Debug)]
pub struct Metrics {
    pub total: AtomicU64,
    pub finished: AtomicU64,
    pub resolved: AtomicU64,
    pub no_address: AtomicU64,
    pub timeouts: AtomicU64,
    pub errors: AtomicU64,
    pub inflight: AtomicU64,
    pub peak_inflight: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub(crate) fn start_lookup(&self) {
        let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_inflight.fetch_max(now, Ordering::SeqCst);
    }

    pub(crate) fn finish_lookup(&self) {
        self.inflight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            no_address: self.no_address.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::SeqCst),
            peak_inflight: self.peak_inflight.load(Ordering::SeqCst),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub finished: u64,
    pub resolved: u64,
    pub no_address: u64,
    pub timeouts: u64,
    pub errors: u64,
    pub inflight: u64,
    pub peak_inflight: u64,
}

impl MetricsSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total > 0 { (self.finished as f64 / self.total as f64) * 100.0 } else { 0.0 }
    }
}

/// Periodically redraw a single progress line on stderr. Abort the handle
/// once resolution is over.
pub fn spawn_reporter(m: Arc<Metrics>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now();
        let mut last_finished = 0u64;
        let mut tick = interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tick.tick().await;
            let s = m.snapshot();
            let d_fin = s.finished.saturating_sub(last_finished);
            last_finished = s.finished;
            let rate = d_fin as f64 / (interval_secs.max(1) as f64);
            let remain = s.total.saturating_sub(s.finished) as f64;
            let eta_secs = if rate > 0.0 { (remain / rate) as u64 } else { 0 };
            let mut err = stderr();
            let _ = write!(
                err,
                "\r[stat] {:>5.1}% | total={} fin={} inflight={} ok={} no-ip={} timeouts={} errors={} rate/s={:.0} ETA={}s elapsed={}s",
                s.percent(), s.total, s.finished, s.inflight, s.resolved, s.no_address, s.timeouts, s.errors, rate, eta_secs,
                start.elapsed().as_secs()
            );
            let _ = err.flush();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_tracks_high_water_mark() {
        let m = Metrics::new();
        m.start_lookup();
        m.start_lookup();
        m.finish_lookup();
        m.start_lookup();
        m.finish_lookup();
        m.finish_lookup();
        let s = m.snapshot();
        assert_eq!(s.peak_inflight, 2);
        assert_eq!(s.inflight, 0);
        assert_eq!(s.finished, 3);
    }

    #[test]
    fn percent_handles_empty_total() {
        let m = Metrics::new();
        assert_eq!(m.snapshot().percent(), 0.0);
        m.total.store(4, Ordering::Relaxed);
        m.finished.store(1, Ordering::Relaxed);
        assert_eq!(m.snapshot().percent(), 25.0);
    }
}
