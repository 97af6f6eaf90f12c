use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::classify::EdgeRanges;
use crate::ct::CtDiscoverer;
use crate::discovery::Wordlist;
use crate::domain::normalize_domain;
use crate::metrics::{spawn_reporter, Metrics};
use crate::options::{get_resolvers, Options};
use crate::output::{build_writers, OutputWriter};
use crate::report::ScanReport;
use crate::resolver::{AddressLookup, Resolver, SystemLookup};
use crate::scanner::Scanner;

pub struct Runner {
    pub options: Options,
    scanner: Scanner,
}

impl Runner {
    /// Validate options and wire the pipeline with the system DNS stack.
    pub fn new(mut opt: Options) -> Result<Self> {
        opt.check()?;
        let nameservers = get_resolvers(&opt.resolvers)?;
        let lookup: Arc<dyn AddressLookup> = if nameservers.is_empty() {
            Arc::new(SystemLookup::from_system_conf().context("load system resolver configuration")?)
        } else {
            Arc::new(SystemLookup::with_nameservers(&nameservers, opt.dns_timeout()).context("configure name servers")?)
        };
        Self::with_lookup(opt, lookup)
    }

    /// Same as [`Runner::new`] but resolves through `lookup`.
    pub fn with_lookup(mut opt: Options, lookup: Arc<dyn AddressLookup>) -> Result<Self> {
        opt.check()?;
        let ct = if opt.no_ct {
            None
        } else {
            Some(CtDiscoverer::new(opt.ct_endpoint.clone(), opt.ct_timeout()).context("build CT client")?)
        };
        let wordlist = if opt.no_wordlist {
            Wordlist::new(Vec::<String>::new())
        } else {
            match &opt.filename {
                Some(p) => Wordlist::from_file(p)?,
                None => Wordlist::builtin(),
            }
        };
        let ranges = match &opt.ranges {
            Some(p) => load_ranges(p)?,
            None => EdgeRanges::cloudflare(),
        };
        info!(
            wordlist = wordlist.len(),
            ranges = ranges.blocks().len(),
            concurrency = opt.concurrency,
            ct = !opt.no_ct,
            "scanner ready"
        );
        let resolver = Resolver::new(lookup, opt.concurrency, opt.dns_timeout());
        Ok(Runner { scanner: Scanner::new(ct, wordlist, resolver, ranges), options: opt })
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Scan every configured domain in order and hand each report to the
    /// writers. All domains are validated before the first request.
    pub async fn run_scan(&self) -> Result<Vec<ScanReport>> {
        let domains = self
            .options
            .domains
            .iter()
            .map(|d| normalize_domain(d))
            .collect::<Result<Vec<_>, _>>()?;
        if domains.is_empty() {
            anyhow::bail!("no domain given");
        }

        let writers = build_writers(
            self.options.output.clone(),
            &self.options.output_type,
            !self.options.not_print,
            self.options.gzip,
            self.options.append,
        )?;

        self.scan_into(&domains, &writers).await
    }

    /// Writers are closed even when a later domain fails, so buffered
    /// reports and gzip trailers from earlier domains still reach disk.
    async fn scan_into(&self, domains: &[String], writers: &[Box<dyn OutputWriter>]) -> Result<Vec<ScanReport>> {
        let scanned = self.scan_each(domains, writers).await;
        let closed = close_all(writers);
        let reports = scanned?;
        closed?;
        Ok(reports)
    }

    async fn scan_each(&self, domains: &[String], writers: &[Box<dyn OutputWriter>]) -> Result<Vec<ScanReport>> {
        let mut reports = Vec::with_capacity(domains.len());
        for domain in domains {
            let metrics = Metrics::new();
            let reporter = self
                .options
                .progress
                .then(|| spawn_reporter(metrics.clone(), self.options.progress_interval));
            let result = self.scanner.scan_with(domain, metrics.clone()).await;
            if let Some(h) = reporter {
                h.abort();
                eprintln!();
            }
            let report = result?;
            let s = metrics.snapshot();
            if s.errors > 0 || s.timeouts > 0 {
                warn!(domain = %domain, timeouts = s.timeouts, errors = s.errors, "some lookups did not complete");
            }
            write_all(writers, &report)?;
            reports.push(report);
        }
        Ok(reports)
    }
}

/// Close every writer, returning the first failure.
fn close_all(writers: &[Box<dyn OutputWriter>]) -> Result<()> {
    let mut first = Ok(());
    for w in writers {
        let r = w.close();
        if first.is_ok() {
            first = r;
        }
    }
    first
}

fn write_all(writers: &[Box<dyn OutputWriter>], report: &ScanReport) -> Result<()> {
    for w in writers {
        w.write(report)?;
    }
    Ok(())
}

/// Read a CIDR file, one block per line.
pub fn load_ranges(path: &Path) -> Result<EdgeRanges> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read ranges {}", path.display()))?;
    let ranges = EdgeRanges::parse(text.lines()).with_context(|| format!("parse ranges {}", path.display()))?;
    if ranges.blocks().is_empty() {
        warn!(path = %path.display(), "range file has no blocks; nothing will be classified as edge");
    }
    Ok(ranges)
}
