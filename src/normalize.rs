use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::domain::is_valid_hostname;

/// Where a candidate hostname came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Source {
    #[serde(rename = "ct-log")]
    CtLog,
    #[serde(rename = "wordlist")]
    Wordlist,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::CtLog => "ct-log",
            Source::Wordlist => "wordlist",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    hostname: String,
    sources: BTreeSet<Source>,
}

impl Candidate {
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn sources(&self) -> &BTreeSet<Source> {
        &self.sources
    }
}

/// Union CT and wordlist hostnames into sorted, case-insensitively unique
/// candidates. Names that fail hostname validation are dropped.
pub fn merge(ct_hosts: Vec<String>, wordlist_hosts: Vec<String>) -> Vec<Candidate> {
    let mut by_name: BTreeMap<String, BTreeSet<Source>> = BTreeMap::new();
    let tagged = ct_hosts.into_iter().map(|h| (h, Source::CtLog))
        .chain(wordlist_hosts.into_iter().map(|h| (h, Source::Wordlist)));
    for (host, source) in tagged {
        let host = host.trim().to_ascii_lowercase();
        if !is_valid_hostname(&host) {
            debug!(host = %host, source = %source, "dropping invalid candidate");
            continue;
        }
        by_name.entry(host).or_default().insert(source);
    }
    by_name.into_iter().map(|(hostname, sources)| Candidate { hostname, sources }).collect()
}
