use anyhow::{anyhow, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::report::{ClassifiedResult, ScanReport};

pub trait OutputWriter: Send + Sync {
    fn write(&self, report: &ScanReport) -> Result<()>;
    fn close(&self) -> Result<()> { Ok(()) }
}

/// Output file, optionally gzip compressed.
pub enum Sink {
    File(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Sink {
    pub fn open(path: &Path, gzip: bool, append: bool) -> Result<Self> {
        let mut oo = OpenOptions::new();
        oo.create(true).write(true);
        if append { oo.append(true); } else { oo.truncate(true); }
        let f = BufWriter::new(oo.open(path)?);
        Ok(if gzip { Sink::Gzip(GzEncoder::new(f, Compression::default())) } else { Sink::File(f) })
    }

    /// Flush buffers and write the gzip trailer.
    pub fn finish(self) -> Result<()> {
        match self {
            Sink::File(mut f) => f.flush()?,
            Sink::Gzip(g) => g.finish()?.flush()?,
        }
        Ok(())
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::File(f) => f.write(buf),
            Sink::Gzip(g) => g.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::File(f) => f.flush(),
            Sink::Gzip(g) => g.flush(),
        }
    }
}

fn open_optional(path: Option<PathBuf>, gzip: bool, append: bool) -> Result<Mutex<Option<Sink>>> {
    Ok(Mutex::new(match path {
        Some(p) => Some(Sink::open(&p, gzip, append)?),
        None => None,
    }))
}

fn finish_optional(file: &Mutex<Option<Sink>>) -> Result<()> {
    let sink = file.lock().map_err(|_| anyhow!("output lock poisoned"))?.take();
    match sink {
        Some(s) => s.finish(),
        None => Ok(()),
    }
}

fn plain_line(r: &ClassifiedResult) -> String {
    match r.ip {
        Some(ip) if r.cloudflare => format!("{}\t{}\tcloudflare", r.subdomain, ip),
        Some(ip) => format!("{}\t{}", r.subdomain, ip),
        None => format!("{}\t[no-result]", r.subdomain),
    }
}

fn sources_of(r: &ClassifiedResult) -> Vec<&'static str> {
    r.sources.iter().map(|s| s.as_str()).collect()
}

/// `subdomain<TAB>ip[<TAB>cloudflare]`, one line per entry.
pub struct PlainWriter {
    file: Mutex<Option<Sink>>,
    to_stdout: bool,
}

impl PlainWriter {
    pub fn new(path: Option<PathBuf>, to_stdout: bool, gzip: bool, append: bool) -> Result<Self> {
        Ok(PlainWriter { file: open_optional(path, gzip, append)?, to_stdout })
    }
}

impl OutputWriter for PlainWriter {
    fn write(&self, report: &ScanReport) -> Result<()> {
        let mut guard = self.file.lock().map_err(|_| anyhow!("output lock poisoned"))?;
        for r in report.subdomains.iter() {
            let line = plain_line(r);
            if self.to_stdout { println!("{}", line); }
            if let Some(f) = guard.as_mut() { writeln!(f, "{}", line)?; }
        }
        if let Some(f) = guard.as_mut() { f.flush()?; }
        Ok(())
    }

    fn close(&self) -> Result<()> { finish_optional(&self.file) }
}

#[derive(Serialize)]
struct JsonRow<'a> {
    domain: &'a str,
    subdomain: &'a str,
    ip: Option<Ipv4Addr>,
    ipv6: Option<Ipv6Addr>,
    cloudflare: bool,
    sources: Vec<&'static str>,
}

/// One JSON object per subdomain entry.
pub struct JsonLinesWriter {
    file: Mutex<Option<Sink>>,
    to_stdout: bool,
}

impl JsonLinesWriter {
    pub fn new(path: Option<PathBuf>, to_stdout: bool, gzip: bool, append: bool) -> Result<Self> {
        Ok(JsonLinesWriter { file: open_optional(path, gzip, append)?, to_stdout })
    }
}

impl OutputWriter for JsonLinesWriter {
    fn write(&self, report: &ScanReport) -> Result<()> {
        let mut guard = self.file.lock().map_err(|_| anyhow!("output lock poisoned"))?;
        for r in report.subdomains.iter() {
            let row = JsonRow {
                domain: &report.domain,
                subdomain: &r.subdomain,
                ip: r.ip,
                ipv6: r.ipv6,
                cloudflare: r.cloudflare,
                sources: sources_of(r),
            };
            let line = serde_json::to_string(&row)?;
            if self.to_stdout { println!("{}", line); }
            if let Some(f) = guard.as_mut() { writeln!(f, "{}", line)?; }
        }
        if let Some(f) = guard.as_mut() { f.flush()?; }
        Ok(())
    }

    fn close(&self) -> Result<()> { finish_optional(&self.file) }
}

/// The full report document. Several reports become a JSON array.
pub struct JsonWriter {
    file: Mutex<Option<Sink>>,
    to_stdout: bool,
    reports: Mutex<Vec<serde_json::Value>>,
}

impl JsonWriter {
    pub fn new(path: Option<PathBuf>, to_stdout: bool, gzip: bool, append: bool) -> Result<Self> {
        Ok(JsonWriter { file: open_optional(path, gzip, append)?, to_stdout, reports: Mutex::new(Vec::new()) })
    }
}

impl OutputWriter for JsonWriter {
    fn write(&self, report: &ScanReport) -> Result<()> {
        let v = serde_json::to_value(report)?;
        self.reports.lock().map_err(|_| anyhow!("output lock poisoned"))?.push(v);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut reports = std::mem::take(&mut *self.reports.lock().map_err(|_| anyhow!("output lock poisoned"))?);
        let doc = match reports.len() {
            0 => return finish_optional(&self.file),
            1 => reports.remove(0),
            _ => serde_json::Value::Array(reports),
        };
        let text = serde_json::to_string_pretty(&doc)?;
        if self.to_stdout { println!("{}", text); }
        {
            let mut guard = self.file.lock().map_err(|_| anyhow!("output lock poisoned"))?;
            if let Some(f) = guard.as_mut() { writeln!(f, "{}", text)?; }
        }
        finish_optional(&self.file)
    }
}

pub const CSV_HEADER: [&str; 6] = ["domain", "subdomain", "ip", "ipv6", "cloudflare", "sources"];

pub struct CsvWriter {
    file: Mutex<Option<csv::Writer<Sink>>>,
    to_stdout: bool,
}

impl CsvWriter {
    pub fn new(path: PathBuf, to_stdout: bool, gzip: bool, append: bool) -> Result<Self> {
        let fresh = !append || std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let mut w = csv::Writer::from_writer(Sink::open(&path, gzip, append)?);
        if fresh { w.write_record(CSV_HEADER)?; }
        Ok(CsvWriter { file: Mutex::new(Some(w)), to_stdout })
    }
}

impl OutputWriter for CsvWriter {
    fn write(&self, report: &ScanReport) -> Result<()> {
        let mut guard = self.file.lock().map_err(|_| anyhow!("output lock poisoned"))?;
        let w = guard.as_mut().ok_or_else(|| anyhow!("csv writer already closed"))?;
        for r in report.subdomains.iter() {
            let ip = r.ip.map(|a| a.to_string()).unwrap_or_default();
            let ipv6 = r.ipv6.map(|a| a.to_string()).unwrap_or_default();
            let cloudflare = r.cloudflare.to_string();
            let sources = sources_of(r).join("|");
            w.write_record([report.domain.as_str(), r.subdomain.as_str(), ip.as_str(), ipv6.as_str(), cloudflare.as_str(), sources.as_str()])?;
            if self.to_stdout { println!("{}", plain_line(r)); }
        }
        w.flush()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let w = self.file.lock().map_err(|_| anyhow!("output lock poisoned"))?.take();
        if let Some(w) = w {
            let sink = w.into_inner().map_err(|e| anyhow!("flush csv output: {}", e.error()))?;
            sink.finish()?;
        }
        Ok(())
    }
}

pub fn build_writers(path: Option<PathBuf>, output_type: &str, to_stdout: bool, gzip: bool, append: bool) -> Result<Vec<Box<dyn OutputWriter>>> {
    let mut v: Vec<Box<dyn OutputWriter>> = Vec::new();
    match output_type {
        "txt" => {
            v.push(Box::new(PlainWriter::new(path, to_stdout, gzip, append)?));
        }
        "jsonl" => {
            v.push(Box::new(JsonLinesWriter::new(path, to_stdout, gzip, append)?));
        }
        "json" => {
            v.push(Box::new(JsonWriter::new(path, to_stdout, gzip, append)?));
        }
        "csv" => {
            let p = path.ok_or_else(|| anyhow!("csv output requires --output path"))?;
            v.push(Box::new(CsvWriter::new(p, to_stdout, gzip, append)?));
        }
        other => {
            return Err(anyhow!("unsupported output type: {}", other));
        }
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::EdgeRanges;
    use crate::normalize::merge;
    use crate::report::build_report;
    use crate::resolver::ResolutionRecord;
    use chrono::{TimeZone, Utc};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn sample(domain: &str) -> ScanReport {
        let candidates = merge(vec![format!("admin.{}", domain)], vec![format!("www.{}", domain)]);
        let records = vec![
            ResolutionRecord::new(format!("admin.{}", domain), Some(Ipv4Addr::new(104, 16, 1, 1)), None),
            ResolutionRecord::unresolved(format!("www.{}", domain)),
        ];
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        build_report(domain, &candidates, records, &EdgeRanges::cloudflare(), date).unwrap()
    }

    fn write_all(output_type: &str, path: &PathBuf, gzip: bool, reports: &[ScanReport]) {
        let writers = build_writers(Some(path.clone()), output_type, false, gzip, false).unwrap();
        for r in reports {
            for w in writers.iter() { w.write(r).unwrap(); }
        }
        for w in writers.iter() { w.close().unwrap(); }
    }

    #[test]
    fn json_single_report_is_an_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_all("json", &path, false, &[sample("example.com")]);
        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["domain"], "example.com");
        assert_eq!(v["stats"]["total"], 2);
        assert_eq!(v["subdomains"][0]["ip"], "104.16.1.1");
    }

    #[test]
    fn json_many_reports_form_an_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_all("json", &path, false, &[sample("example.com"), sample("example.org")]);
        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v.as_array().unwrap().len(), 2);
        assert_eq!(v[1]["domain"], "example.org");
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        write_all("csv", &path, false, &[sample("example.com")]);
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "domain,subdomain,ip,ipv6,cloudflare,sources");
        assert_eq!(lines[1], "example.com,admin.example.com,104.16.1.1,,true,ct-log");
        assert_eq!(lines[2], "example.com,www.example.com,,,false,wordlist");
    }

    #[test]
    fn jsonl_gzip_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.jsonl.gz");
        write_all("jsonl", &path, true, &[sample("example.com")]);
        let mut text = String::new();
        GzDecoder::new(File::open(&path).unwrap()).read_to_string(&mut text).unwrap();
        let rows: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["cloudflare"], true);
        assert_eq!(rows[0]["sources"], serde_json::json!(["ct-log"]));
        assert_eq!(rows[1]["ip"], serde_json::Value::Null);
    }

    #[test]
    fn txt_append_keeps_previous_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.txt");
        write_all("txt", &path, false, &[sample("example.com")]);
        let writers = build_writers(Some(path.clone()), "txt", false, false, true).unwrap();
        writers[0].write(&sample("example.org")).unwrap();
        writers[0].close().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().collect::<Vec<_>>(), vec![
            "admin.example.com\t104.16.1.1\tcloudflare",
            "www.example.com\t[no-result]",
            "admin.example.org\t104.16.1.1\tcloudflare",
            "www.example.org\t[no-result]",
        ]);
    }

    #[test]
    fn csv_requires_path_and_unknown_types_fail() {
        assert!(build_writers(None, "csv", true, false, false).is_err());
        assert!(build_writers(None, "parquet", true, false, false).is_err());
    }
}
