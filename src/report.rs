use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::classify::EdgeRanges;
use crate::error::ScanError;
use crate::normalize::{Candidate, Source};
use crate::resolver::ResolutionRecord;

/// One subdomain in the report. Only `subdomain`, `ip` and `cloudflare`
/// are part of the serialized report.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedResult {
    pub subdomain: String,
    pub ip: Option<Ipv4Addr>,
    #[serde(skip)]
    pub ipv6: Option<Ipv6Addr>,
    pub cloudflare: bool,
    #[serde(skip)]
    pub sources: BTreeSet<Source>,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub total: usize,
    pub cloudflare: usize,
    pub no_ip: usize,
}

impl ScanStats {
    pub fn from_results(results: &[ClassifiedResult]) -> Self {
        results.iter().fold(Self::default(), |mut s, r| {
            s.total += 1;
            if r.cloudflare { s.cloudflare += 1; }
            if r.ip.is_none() { s.no_ip += 1; }
            s
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub scan_date: DateTime<Utc>,
    pub domain: String,
    pub stats: ScanStats,
    pub subdomains: Vec<ClassifiedResult>,
}

/// Join resolution records with their candidates, classify, count and
/// order the results. `records[i]` must belong to `candidates[i]`.
pub fn build_report(
    domain: &str,
    candidates: &[Candidate],
    records: Vec<ResolutionRecord>,
    ranges: &EdgeRanges,
    scan_date: DateTime<Utc>,
) -> Result<ScanReport, ScanError> {
    if candidates.len() != records.len() {
        return Err(ScanError::Internal(format!(
            "{} candidates but {} resolution records",
            candidates.len(),
            records.len()
        )));
    }
    let mut results = Vec::with_capacity(records.len());
    for (candidate, record) in candidates.iter().zip(records) {
        if candidate.hostname() != record.subdomain() {
            return Err(ScanError::Internal(format!(
                "resolution record {} does not match candidate {}",
                record.subdomain(),
                candidate.hostname()
            )));
        }
        let ip = record.ipv4();
        results.push(ClassifiedResult {
            cloudflare: ranges.classify(ip.map(IpAddr::V4)),
            subdomain: record.subdomain().to_string(),
            ip,
            ipv6: record.ipv6(),
            sources: candidate.sources().clone(),
        });
    }
    sort_results(&mut results);
    Ok(ScanReport {
        scan_date,
        domain: domain.to_string(),
        stats: ScanStats::from_results(&results),
        subdomains: results,
    })
}

/// Addressed entries first, then by case-insensitive hostname. Stable.
pub fn sort_results(results: &mut [ClassifiedResult]) {
    results.sort_by_cached_key(|r| (r.ip.is_none(), r.subdomain.to_ascii_lowercase()));
}
