//! The discovery → normalize → resolve → classify → aggregate pipeline.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

use crate::classify::EdgeRanges;
use crate::ct::CtDiscoverer;
use crate::discovery::Wordlist;
use crate::domain::normalize_domain;
use crate::error::ScanError;
use crate::metrics::Metrics;
use crate::normalize::{merge, Candidate};
use crate::report::{build_report, ScanReport};
use crate::resolver::Resolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Normalize,
    Resolve,
    Aggregate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Discovery => "discovery",
            Phase::Normalize => "normalize",
            Phase::Resolve => "resolve",
            Phase::Aggregate => "aggregate",
        })
    }
}

/// Immutable pipeline configuration. Each `scan` call owns its own
/// candidates, records and report, so one `Scanner` may serve concurrent
/// scans.
pub struct Scanner {
    ct: Option<CtDiscoverer>,
    wordlist: Wordlist,
    resolver: Resolver,
    ranges: EdgeRanges,
}

impl Scanner {
    /// `ct: None` skips certificate transparency entirely.
    pub fn new(ct: Option<CtDiscoverer>, wordlist: Wordlist, resolver: Resolver, ranges: EdgeRanges) -> Self {
        Self { ct, wordlist, resolver, ranges }
    }

    pub fn ranges(&self) -> &EdgeRanges {
        &self.ranges
    }

    pub async fn scan(&self, domain: &str) -> Result<ScanReport, ScanError> {
        self.scan_with(domain, Metrics::new()).await
    }

    /// Like [`Scanner::scan`], reporting resolver progress into `metrics`.
    pub async fn scan_with(&self, domain: &str, metrics: Arc<Metrics>) -> Result<ScanReport, ScanError> {
        let domain = normalize_domain(domain)?;
        if self.resolver.concurrency() == 0 {
            return Err(ScanError::InvalidConcurrency);
        }
        let span = info_span!("scan", domain = %domain);
        self.run(domain, metrics).instrument(span).await
    }

    async fn run(&self, domain: String, metrics: Arc<Metrics>) -> Result<ScanReport, ScanError> {
        let candidates = self.candidates(&domain).await;

        let hosts: Vec<String> = candidates.iter().map(|c| c.hostname().to_string()).collect();
        info!(phase = %Phase::Resolve, candidates = hosts.len(), concurrency = self.resolver.concurrency(), "resolving");
        let records = self.resolver.resolve_all_with(&hosts, metrics).await?;

        let report = build_report(&domain, &candidates, records, &self.ranges, Utc::now())?;
        info!(
            phase = %Phase::Aggregate,
            total = report.stats.total,
            cloudflare = report.stats.cloudflare,
            no_ip = report.stats.no_ip,
            "report ready"
        );
        Ok(report)
    }

    /// Discovery and normalization for an already validated root domain.
    pub async fn candidates(&self, domain: &str) -> Vec<Candidate> {
        let ct_hosts = match &self.ct {
            Some(ct) => ct.discover(domain).await,
            None => Vec::new(),
        };
        let word_hosts = self.wordlist.generate(domain);
        info!(phase = %Phase::Discovery, ct = ct_hosts.len(), wordlist = word_hosts.len(), "candidates discovered");

        let candidates = merge(ct_hosts, word_hosts);
        info!(phase = %Phase::Normalize, unique = candidates.len(), "candidates normalized");
        candidates
    }
}
