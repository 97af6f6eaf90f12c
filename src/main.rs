use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use ctsub::classify::EdgeRanges;
use ctsub::cli::{Cli, ClassifyArgs, Commands, CommonArgs, ScanArgs, WordlistArgs};
use ctsub::discovery::Wordlist;
use ctsub::domain::normalize_domain;
use ctsub::error::ScanError;
use ctsub::options::{log_directive, read_domain_file, read_domains, Options};
use ctsub::runner::{load_ranges, Runner};
use std::io;
use std::net::IpAddr;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_directive(level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Domains from `-d`, positionals and `--stdin`, in that order.
fn collect_domains(common: &CommonArgs) -> Result<Vec<String>> {
    let mut domains: Vec<String> = vec![];
    domains.extend(common.domains.iter().cloned());
    domains.extend(common.positional_domains.iter().cloned());
    if common.stdin {
        domains.extend(read_domains(io::stdin().lock()).context("read domains from stdin")?);
    }
    Ok(domains)
}

async fn run_scan(args: ScanArgs) -> Result<()> {
    let mut domains = collect_domains(&args.common)?;
    if let Some(list) = &args.domain_list {
        domains.extend(read_domain_file(list)?);
    }
    if domains.is_empty() {
        let mut cmd = Cli::command();
        if let Some(sc) = cmd.find_subcommand_mut("scan") { let _ = sc.print_help(); println!(); }
        return Ok(());
    }

    let opt = Options {
        domains,
        concurrency: args.concurrency,
        timeout: args.timeout,
        ct_timeout: args.ct_timeout,
        ct_endpoint: args.ct_endpoint,
        no_ct: args.no_ct,
        no_wordlist: args.no_wordlist,
        filename: args.filename,
        ranges: args.ranges,
        resolvers: args.resolvers,
        output: args.output,
        output_type: args.output_type,
        gzip: args.gzip,
        append: args.append,
        not_print: args.not_print,
        progress: !args.no_progress,
        progress_interval: args.progress_interval,
    };
    let runner = Runner::new(opt)?;
    runner.run_scan().await?;
    Ok(())
}

fn run_classify(args: ClassifyArgs) -> Result<()> {
    let ranges = match &args.ranges {
        Some(p) => load_ranges(p)?,
        None => EdgeRanges::cloudflare(),
    };
    for raw in &args.ips {
        let ip: IpAddr = raw.trim().parse().with_context(|| format!("invalid IP address: {}", raw))?;
        println!("{}\t{}", ip, if ranges.contains(ip) { "cloudflare" } else { "-" });
    }
    Ok(())
}

fn run_wordlist(args: WordlistArgs) -> Result<()> {
    let domains = collect_domains(&args.common)?;
    let wordlist = match &args.filename {
        Some(p) => Wordlist::from_file(p)?,
        None => Wordlist::builtin(),
    };
    for d in &domains {
        let d = normalize_domain(d)?;
        for host in wordlist.generate(&d) {
            println!("{}", host);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match &cli.command {
        Commands::Scan(a) => a.common.log_level.clone(),
        Commands::Wordlist(a) => a.common.log_level.clone(),
        Commands::Classify(_) => "warn".to_string(),
    };
    init_logging(&level);

    let result = match cli.command {
        Commands::Scan(args) => run_scan(args).await,
        Commands::Classify(args) => run_classify(args),
        Commands::Wordlist(args) => run_wordlist(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let client = e.chain().any(|c| c.downcast_ref::<ScanError>().map_or(false, ScanError::is_client_error));
            ExitCode::from(if client { 2 } else { 1 })
        }
    }
}
