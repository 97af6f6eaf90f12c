//! Certificate transparency discovery against a crt.sh-compatible endpoint.

use reqwest::{header, Client};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{is_valid_hostname, is_within};
use crate::error::CtError;

pub const DEFAULT_CT_ENDPOINT: &str = "https://crt.sh/";

pub const USER_AGENT: &str = concat!("ctsub/", env!("CARGO_PKG_VERSION"), " (+passive subdomain inventory)");

/// The only field we trust from a certificate record.
#[derive(Debug, Deserialize)]
struct CtEntry {
    name_value: String,
}

#[derive(Debug, Clone)]
pub struct CtDiscoverer {
    client: Client,
    endpoint: String,
}

impl CtDiscoverer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CtError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, endpoint: endpoint.into() })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Hostnames under `domain` seen in CT logs, sorted and deduplicated.
    /// Never fails: any upstream problem yields an empty list.
    pub async fn discover(&self, domain: &str) -> Vec<String> {
        match self.fetch(domain).await {
            Ok(hosts) => {
                info!(domain, count = hosts.len(), "certificate transparency lookup complete");
                hosts
            }
            Err(e) => {
                warn!(domain, endpoint = %self.endpoint, error = %e, "certificate transparency source unavailable, continuing with wordlist only");
                Vec::new()
            }
        }
    }

    async fn fetch(&self, domain: &str) -> Result<Vec<String>, CtError> {
        let query = format!("%.{}", domain);
        let resp = self.client
            .get(&self.endpoint)
            .query(&[("q", query.as_str()), ("output", "json")])
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CtError::Status(status));
        }
        let body = resp.bytes().await?;
        let entries: Vec<CtEntry> = serde_json::from_slice(&body)?;
        debug!(domain, records = entries.len(), "parsed certificate records");
        Ok(extract_hosts(&entries, domain))
    }
}

fn extract_hosts(entries: &[CtEntry], domain: &str) -> Vec<String> {
    let mut hosts = BTreeSet::new();
    for entry in entries {
        for name in entry.name_value.split('\n') {
            let name = name.trim();
            let name = name.strip_suffix('.').unwrap_or(name).to_ascii_lowercase();
            if name.is_empty() || name.starts_with("*.") { continue; }
            if !is_valid_hostname(&name) || !is_within(&name, domain) { continue; }
            hosts.insert(name);
        }
    }
    hosts.into_iter().collect()
}

/// Parse a raw response body with the same fail-closed rules as `discover`.
pub fn parse_response(body: &str, domain: &str) -> Result<Vec<String>, CtError> {
    let entries: Vec<CtEntry> = serde_json::from_str(body)?;
    Ok(extract_hosts(&entries, domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_eq, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extracts_and_filters_names() {
        let body = r#"[
            {"issuer_name":"C=US, O=Let's Encrypt","name_value":"admin.example.com\n*.example.com"},
            {"name_value":"WWW.Example.com\nexample.com\napi.example.com."},
            {"name_value":"evil.com\nnotexample.com\nbad_name.example.com\nadmin.example.com"}
        ]"#;
        let hosts = parse_response(body, "example.com").unwrap();
        assert_eq!(hosts, vec!["admin.example.com", "api.example.com", "example.com", "www.example.com"]);
    }

    #[test]
    fn shape_mismatch_fails_closed() {
        assert!(parse_response(r#"{"name_value":"a.example.com"}"#, "example.com").is_err());
        assert!(parse_response(r#"[{"common_name":"a.example.com"}]"#, "example.com").is_err());
        assert!(parse_response(r#"[{"name_value":42}]"#, "example.com").is_err());
        assert!(parse_response("<html>busy</html>", "example.com").is_err());
    }

    #[test]
    fn empty_array_is_empty() {
        assert!(parse_response("[]", "example.com").unwrap().is_empty());
    }

    #[tokio::test]
    async fn discover_queries_wildcard_pattern() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "%.example.com"))
            .and(query_param("output", "json"))
            .and(header_eq("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"name_value":"mail.example.com"}]"#))
            .expect(1)
            .mount(&server)
            .await;

        let ct = CtDiscoverer::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert_eq!(ct.discover("example.com").await, vec!["mail.example.com"]);
    }

    #[tokio::test]
    async fn discover_degrades_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let ct = CtDiscoverer::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(ct.discover("example.com").await.is_empty());
    }

    #[tokio::test]
    async fn discover_degrades_on_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let ct = CtDiscoverer::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(ct.discover("example.com").await.is_empty());
    }

    #[tokio::test]
    async fn discover_degrades_on_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"name_value":"slow.example.com"}]"#)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let ct = CtDiscoverer::new(server.uri(), Duration::from_millis(100)).unwrap();
        assert!(ct.discover("example.com").await.is_empty());
    }

    #[tokio::test]
    async fn discover_degrades_when_unreachable() {
        // Port 9 (discard) on loopback is not expected to accept HTTP.
        let ct = CtDiscoverer::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
        assert!(ct.discover("example.com").await.is_empty());
    }
}
