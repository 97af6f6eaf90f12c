use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};
use trust_dns_resolver::config::{LookupIpStrategy, NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::TokioAsyncResolver;

use crate::error::{LookupError, ScanError};
use crate::metrics::Metrics;

/// Addresses found for one candidate. A family that failed to resolve is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRecord {
    subdomain: String,
    ipv4: Option<Ipv4Addr>,
    ipv6: Option<Ipv6Addr>,
}

impl ResolutionRecord {
    pub fn new(subdomain: impl Into<String>, ipv4: Option<Ipv4Addr>, ipv6: Option<Ipv6Addr>) -> Self {
        Self { subdomain: subdomain.into(), ipv4, ipv6 }
    }

    pub fn unresolved(subdomain: impl Into<String>) -> Self {
        Self::new(subdomain, None, None)
    }

    pub fn subdomain(&self) -> &str { &self.subdomain }
    pub fn ipv4(&self) -> Option<Ipv4Addr> { self.ipv4 }
    pub fn ipv6(&self) -> Option<Ipv6Addr> { self.ipv6 }
}

/// One address family lookup per call; implementations return the first
/// address of the answer.
#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn ipv4(&self, host: &str) -> Result<Ipv4Addr, LookupError>;
    async fn ipv6(&self, host: &str) -> Result<Ipv6Addr, LookupError>;
}

/// `AddressLookup` backed by trust-dns.
pub struct SystemLookup {
    resolver: TokioAsyncResolver,
}

impl SystemLookup {
    /// Use the platform resolver configuration (`/etc/resolv.conf` and friends).
    pub fn from_system_conf() -> Result<Self, ResolveError> {
        Ok(Self { resolver: TokioAsyncResolver::tokio_from_system_conf()? })
    }

    /// Query the given name servers on port 53 instead of the system ones.
    pub fn with_nameservers(ips: &[IpAddr], per_query: Duration) -> Result<Self, ResolveError> {
        let group = NameServerConfigGroup::from_ips_clear(ips, 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let mut opts = ResolverOpts::default();
        opts.ip_strategy = LookupIpStrategy::Ipv4thenIpv6;
        opts.timeout = per_query;
        opts.attempts = 1;
        Ok(Self { resolver: TokioAsyncResolver::tokio(config, opts)? })
    }
}

/// Trailing dot keeps resolv.conf `search` suffixes out of the query.
fn fully_qualified(host: &str) -> String {
    if host.ends_with('.') { host.to_string() } else { format!("{}.", host) }
}

fn lookup_error(e: ResolveError) -> LookupError {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => LookupError::NoRecords,
        ResolveErrorKind::Timeout => LookupError::Timeout,
        _ => LookupError::Failed(e.to_string()),
    }
}

#[async_trait]
impl AddressLookup for SystemLookup {
    async fn ipv4(&self, host: &str) -> Result<Ipv4Addr, LookupError> {
        let lookup = self.resolver.ipv4_lookup(fully_qualified(host).as_str()).await.map_err(lookup_error)?;
        lookup.iter().next().copied().ok_or(LookupError::NoRecords)
    }

    async fn ipv6(&self, host: &str) -> Result<Ipv6Addr, LookupError> {
        let lookup = self.resolver.ipv6_lookup(fully_qualified(host).as_str()).await.map_err(lookup_error)?;
        lookup.iter().next().copied().ok_or(LookupError::NoRecords)
    }
}

/// Resolves candidates with at most `concurrency` lookups in flight. A slot
/// is reused as soon as its candidate finishes.
#[derive(Clone)]
pub struct Resolver {
    lookup: Arc<dyn AddressLookup>,
    concurrency: usize,
    timeout: Duration,
}

impl Resolver {
    /// `concurrency` above the semaphore's permit ceiling is clamped to it.
    pub fn new(lookup: Arc<dyn AddressLookup>, concurrency: usize, timeout: Duration) -> Self {
        Self { lookup, concurrency: concurrency.min(Semaphore::MAX_PERMITS), timeout }
    }

    pub fn concurrency(&self) -> usize { self.concurrency }

    pub async fn resolve_all(&self, hosts: &[String]) -> Result<Vec<ResolutionRecord>, ScanError> {
        self.resolve_all_with(hosts, Metrics::new()).await
    }

    /// Returns one record per host, in input order.
    pub async fn resolve_all_with(&self, hosts: &[String], metrics: Arc<Metrics>) -> Result<Vec<ResolutionRecord>, ScanError> {
        if self.concurrency == 0 {
            return Err(ScanError::InvalidConcurrency);
        }
        metrics.total.store(hosts.len() as u64, Ordering::Relaxed);
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = FuturesUnordered::new();

        for (idx, host) in hosts.iter().enumerate() {
            let permit = sem.clone().acquire_owned().await
                .map_err(|_| ScanError::Internal("resolver semaphore closed".into()))?;
            let lookup = self.lookup.clone();
            let metrics_task = metrics.clone();
            let host = host.clone();
            let limit = self.timeout;
            let handle = tokio::spawn(async move {
                let _p = permit;
                metrics_task.start_lookup();
                let record = resolve_one(lookup.as_ref(), host, limit, &metrics_task).await;
                metrics_task.finish_lookup();
                record
            });
            tasks.push(async move { (idx, handle.await) });
        }

        let mut out: Vec<Option<ResolutionRecord>> = (0..hosts.len()).map(|_| None).collect();
        while let Some((idx, res)) = tasks.next().await {
            let record = match res {
                Ok(r) => r,
                Err(e) => {
                    warn!(host = %hosts[idx], error = %e, "lookup task failed");
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    ResolutionRecord::unresolved(hosts[idx].clone())
                }
            };
            out[idx] = Some(record);
        }

        out.into_iter()
            .zip(hosts)
            .map(|(r, h)| r.ok_or_else(|| ScanError::Internal(format!("missing resolution record for {}", h))))
            .collect()
    }
}

async fn resolve_one(lookup: &dyn AddressLookup, host: String, limit: Duration, m: &Metrics) -> ResolutionRecord {
    let (v4, v6) = tokio::join!(
        timeout(limit, lookup.ipv4(&host)),
        timeout(limit, lookup.ipv6(&host)),
    );
    let ipv4 = settle(&host, v4.unwrap_or(Err(LookupError::Timeout)), m);
    let ipv6 = settle(&host, v6.unwrap_or(Err(LookupError::Timeout)), m);
    if ipv4.is_some() || ipv6.is_some() {
        m.resolved.fetch_add(1, Ordering::Relaxed);
    } else {
        m.no_address.fetch_add(1, Ordering::Relaxed);
    }
    ResolutionRecord { subdomain: host, ipv4, ipv6 }
}

fn settle<T>(host: &str, res: Result<T, LookupError>, m: &Metrics) -> Option<T> {
    match res {
        Ok(addr) => Some(addr),
        Err(LookupError::NoRecords) => None,
        Err(LookupError::Timeout) => {
            m.timeouts.fetch_add(1, Ordering::Relaxed);
            None
        }
        Err(LookupError::Failed(e)) => {
            debug!(host, error = %e, "lookup failed");
            m.errors.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}
