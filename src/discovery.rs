use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Bumped whenever `BUILTIN_PREFIXES` changes.
pub const WORDLIST_VERSION: &str = "2024.1";

/// Curated first labels that commonly exist under a registered domain.
pub const BUILTIN_PREFIXES: &[&str] = &[
    "www", "api", "admin", "mail", "webmail", "smtp", "pop", "imap", "ftp", "ns1", "ns2",
    "vpn", "remote", "portal", "dev", "staging", "stage", "test", "beta", "demo", "app",
    "m", "mobile", "cdn", "static", "assets", "img", "media", "blog", "shop", "store",
    "support", "help", "docs", "status", "dashboard", "auth", "sso", "login", "git",
    "jenkins", "grafana", "monitor", "internal",
];

/// An immutable prefix table expanded against a root domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wordlist {
    prefixes: Vec<String>,
}

impl Wordlist {
    pub fn builtin() -> Self {
        Self::new(BUILTIN_PREFIXES.iter().copied())
    }

    /// Build a table from arbitrary prefixes: trimmed, lower-cased, empty
    /// entries dropped, first occurrence wins.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for p in prefixes {
            let p = p.as_ref().trim().trim_matches('.').to_ascii_lowercase();
            if p.is_empty() { continue; }
            if seen.insert(p.clone()) { out.push(p); }
        }
        Self { prefixes: out }
    }

    /// One prefix per line; blank lines and `#` comments are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open wordlist {}", path.display()))?;
        let mut words = Vec::new();
        for line in BufReader::new(f).lines() {
            let line = line.with_context(|| format!("read wordlist {}", path.display()))?;
            let s = line.trim();
            if s.is_empty() || s.starts_with('#') { continue; }
            words.push(s.to_string());
        }
        Ok(Self::new(words))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// `{prefix}.{domain}` for every prefix, in table order.
    pub fn generate(&self, domain: &str) -> Vec<String> {
        self.prefixes.iter().map(|p| {
            let mut host = String::with_capacity(p.len() + 1 + domain.len());
            host.push_str(p);
            host.push('.');
            host.push_str(domain);
            host
        }).collect()
    }
}

impl Default for Wordlist {
    fn default() -> Self {
        Self::builtin()
    }
}
