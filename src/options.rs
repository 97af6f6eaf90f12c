use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ct::DEFAULT_CT_ENDPOINT;
use crate::error::ScanError;

pub const DEFAULT_CONCURRENCY: usize = 50;
pub const DEFAULT_DNS_TIMEOUT_SECS: u64 = 3;
pub const DEFAULT_CT_TIMEOUT_SECS: u64 = 30;

pub const OUTPUT_TYPES: &[&str] = &["json", "jsonl", "csv", "txt"];

#[derive(Debug, Clone)]
pub struct Options {
    pub domains: Vec<String>,
    pub concurrency: usize,
    pub timeout: u64,
    pub ct_timeout: u64,
    pub ct_endpoint: String,
    pub no_ct: bool,
    pub no_wordlist: bool,
    pub filename: Option<PathBuf>,
    pub ranges: Option<PathBuf>,
    pub resolvers: Vec<String>,
    pub output: Option<PathBuf>,
    pub output_type: String,
    pub gzip: bool,
    pub append: bool,
    pub not_print: bool,
    pub progress: bool,
    pub progress_interval: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_DNS_TIMEOUT_SECS,
            ct_timeout: DEFAULT_CT_TIMEOUT_SECS,
            ct_endpoint: DEFAULT_CT_ENDPOINT.to_string(),
            no_ct: false,
            no_wordlist: false,
            filename: None,
            ranges: None,
            resolvers: Vec::new(),
            output: None,
            output_type: "json".to_string(),
            gzip: false,
            append: false,
            not_print: false,
            progress: true,
            progress_interval: 1,
        }
    }
}

impl Options {
    /// Reject settings no scan could run with. Runs before any network I/O.
    pub fn check(&mut self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ScanError::InvalidConcurrency.into());
        }
        if self.timeout == 0 { anyhow::bail!("--timeout must be at least 1 second") }
        if self.ct_timeout == 0 { anyhow::bail!("--ct-timeout must be at least 1 second") }
        if self.no_ct && self.no_wordlist { anyhow::bail!("--no-ct and --no-wordlist leave no candidate source") }
        self.output_type = self.output_type.to_ascii_lowercase();
        if !OUTPUT_TYPES.contains(&self.output_type.as_str()) {
            anyhow::bail!("unsupported output type: {} (expected one of {})", self.output_type, OUTPUT_TYPES.join("/"))
        }
        if !self.gzip {
            if let Some(os) = self.output.as_ref().and_then(|p| p.to_str()) {
                if os.ends_with(".gz") { self.gzip = true; }
            }
        }
        Ok(())
    }

    pub fn dns_timeout(&self) -> Duration { Duration::from_secs(self.timeout) }

    pub fn ct_timeout(&self) -> Duration { Duration::from_secs(self.ct_timeout) }
}

/// `EnvFilter` directive for a `--log-level` value; `silent` turns logging off.
pub fn log_directive(level: &str) -> &str {
    if level.eq_ignore_ascii_case("silent") { "off" } else { level }
}

/// Parse `-r` resolver addresses. Empty input means "use the system resolver".
pub fn get_resolvers(input: &[String]) -> Result<Vec<IpAddr>> {
    input.iter()
        .map(|s| s.trim().parse::<IpAddr>().with_context(|| format!("invalid resolver address: {}", s)))
        .collect()
}

/// Read one domain per line, skipping blanks and `#` comments.
pub fn read_domains<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let s = line.trim();
        if s.is_empty() || s.starts_with('#') { continue; }
        out.push(s.to_string());
    }
    Ok(out)
}

pub fn read_domain_file(path: &Path) -> Result<Vec<String>> {
    let f = File::open(path).with_context(|| format!("open domain list {}", path.display()))?;
    read_domains(BufReader::new(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_check() {
        let mut opt = Options::default();
        opt.check().unwrap();
        assert_eq!(opt.concurrency, 50);
        assert_eq!(opt.dns_timeout(), Duration::from_secs(3));
        assert_eq!(opt.ct_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn zero_concurrency_is_a_scan_error() {
        let mut opt = Options { concurrency: 0, ..Default::default() };
        let err = opt.check().unwrap_err();
        assert!(matches!(err.downcast_ref::<ScanError>(), Some(ScanError::InvalidConcurrency)));
    }

    #[test]
    fn rejects_unknown_output_type_and_empty_sources() {
        let mut opt = Options { output_type: "parquet".into(), ..Default::default() };
        assert!(opt.check().is_err());
        let mut opt = Options { no_ct: true, no_wordlist: true, ..Default::default() };
        assert!(opt.check().is_err());
    }

    #[test]
    fn gz_suffix_enables_gzip() {
        let mut opt = Options { output: Some(PathBuf::from("out.json.gz")), ..Default::default() };
        opt.check().unwrap();
        assert!(opt.gzip);
    }

    #[test]
    fn resolvers_parse_or_fail() {
        let ips = get_resolvers(&["1.1.1.1".into(), " 2606:4700:4700::1111 ".into()]).unwrap();
        assert_eq!(ips.len(), 2);
        assert!(get_resolvers(&[]).unwrap().is_empty());
        assert!(get_resolvers(&["dns.google".into()]).is_err());
    }

    #[test]
    fn oversized_concurrency_passes_check() {
        let mut opt = Options { concurrency: usize::MAX, ..Default::default() };
        opt.check().unwrap();
    }

    #[test]
    fn silent_log_level_disables_logging() {
        assert_eq!(log_directive("silent"), "off");
        assert_eq!(log_directive("debug"), "debug");
    }

    #[test]
    fn read_domains_skips_comments() {
        let input = "example.com\n\n# staging\n  example.org  \n";
        assert_eq!(read_domains(input.as_bytes()).unwrap(), vec!["example.com", "example.org"]);
    }
}
