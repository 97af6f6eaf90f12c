use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::options::{DEFAULT_CONCURRENCY, DEFAULT_CT_TIMEOUT_SECS, DEFAULT_DNS_TIMEOUT_SECS};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "ctsub - passive subdomain inventory from certificate transparency and a curated wordlist",
    long_about = "NAME:\n  ctsub - passive subdomain inventory\n\nUSAGE:\n  ctsub <SUBCOMMAND> [OPTIONS] [DOMAIN]...\n\nCOMMANDS:\n  scan (s)      discover, resolve and classify subdomains of each root domain\n  classify (c)  check whether addresses sit inside the CDN edge ranges\n  wordlist (w)  print the wordlist candidates for a domain without any I/O\n\nNotes:\n  - Candidates come from certificate transparency logs (crt.sh) and a built-in prefix table.\n  - No brute forcing: only those candidates are resolved, with a fixed concurrency cap.\n  - If the CT source is unreachable the scan continues with wordlist candidates only.\n\nExamples:\n  ctsub scan example.com\n  ctsub scan example.com -c 100 --output-type csv -o example.csv\n  ctsub classify 104.16.1.1 8.8.8.8"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover, resolve and classify subdomains (CT logs + wordlist)
    #[command(alias = "s", after_help = "Argument groups:\n  input: -d --stdin --domain-list\n  discovery: --no-ct --ct-endpoint --ct-timeout --no-wordlist -f\n  resolution: -c --timeout -r\n  classification: --ranges\n  output: -o --output-type --gzip --append --not-print\n  progress: --no-progress --progress-interval")]
    Scan(ScanArgs),
    /// Report CDN edge membership for IP addresses
    #[command(alias = "c")]
    Classify(ClassifyArgs),
    /// Print wordlist candidates for domains
    #[command(alias = "w")]
    Wordlist(WordlistArgs),
}

/// Common args reused by multiple subcommands
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Root domain, repeatable
    #[arg(short = 'd', long = "domain")]
    pub domains: Vec<String>,

    /// Root domains given positionally
    #[arg(value_name = "DOMAIN")]
    pub positional_domains: Vec<String>,

    /// Read root domains from stdin, one per line
    #[arg(long = "stdin")]
    pub stdin: bool,

    /// Log level: error|warn|info|debug|trace|silent
    #[arg(long = "log-level", default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace", "silent"])]
    pub log_level: String,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// File with root domains, one per line
    #[arg(long = "domain-list", alias = "ds")]
    pub domain_list: Option<PathBuf>,

    /// Maximum DNS lookups in flight
    #[arg(short = 'c', long = "concurrency", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Per-candidate DNS timeout (seconds)
    #[arg(long = "timeout", default_value_t = DEFAULT_DNS_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Certificate transparency request timeout (seconds)
    #[arg(long = "ct-timeout", default_value_t = DEFAULT_CT_TIMEOUT_SECS)]
    pub ct_timeout: u64,

    /// Certificate transparency search endpoint (crt.sh compatible)
    #[arg(long = "ct-endpoint", default_value = crate::ct::DEFAULT_CT_ENDPOINT)]
    pub ct_endpoint: String,

    /// Skip certificate transparency discovery
    #[arg(long = "no-ct")]
    pub no_ct: bool,

    /// Skip wordlist candidates
    #[arg(long = "no-wordlist")]
    pub no_wordlist: bool,

    /// Prefix file replacing the built-in wordlist
    #[arg(short = 'f', long = "filename")]
    pub filename: Option<PathBuf>,

    /// CIDR file replacing the built-in Cloudflare ranges
    #[arg(long = "ranges")]
    pub ranges: Option<PathBuf>,

    /// Name server IPs to query instead of the system resolver, repeatable
    #[arg(short = 'r', long = "resolvers")]
    pub resolvers: Vec<String>,

    /// Output file; a .gz suffix enables gzip
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output type: json/jsonl/csv/txt
    #[arg(long = "output-type", alias = "oy", default_value = "json")]
    pub output_type: String,

    /// Gzip the output file
    #[arg(long = "gzip")]
    pub gzip: bool,

    /// Append to the output file instead of truncating it
    #[arg(long = "append")]
    pub append: bool,

    /// Do not print results to stdout
    #[arg(long = "not-print", alias = "np")]
    pub not_print: bool,

    /// Disable the stderr progress line
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Progress refresh interval (seconds)
    #[arg(long = "progress-interval", default_value_t = 1)]
    pub progress_interval: u64,
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Addresses to classify
    #[arg(value_name = "IP", required = true)]
    pub ips: Vec<String>,

    /// CIDR file replacing the built-in Cloudflare ranges
    #[arg(long = "ranges")]
    pub ranges: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WordlistArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Prefix file replacing the built-in wordlist
    #[arg(short = 'f', long = "filename")]
    pub filename: Option<PathBuf>,
}
