//! Hostname grammar shared by every pipeline stage.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ScanError;

const MAX_HOSTNAME_LEN: usize = 253;

/// Dot-separated `[a-z0-9-]` labels of 1..=63 chars without edge hyphens;
/// the final label needs at least two characters.
static HOSTNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)*[a-z0-9][a-z0-9-]{0,61}[a-z0-9]$")
        .expect("hostname pattern compiles")
});

pub fn is_valid_hostname(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_HOSTNAME_LEN && HOSTNAME_REGEX.is_match(name)
}

/// Trim, drop one trailing dot and lower-case a user supplied root domain,
/// rejecting it when it is not a hostname.
pub fn normalize_domain(input: &str) -> Result<String, ScanError> {
    let trimmed = input.trim();
    let domain = trimmed.strip_suffix('.').unwrap_or(trimmed).to_ascii_lowercase();
    let reason = if domain.is_empty() {
        Some("empty")
    } else if domain.len() > MAX_HOSTNAME_LEN {
        Some("longer than 253 characters")
    } else if !HOSTNAME_REGEX.is_match(&domain) {
        Some("not a valid hostname")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ScanError::InvalidDomain { input: input.to_string(), reason }),
        None => Ok(domain),
    }
}

/// `host` equals `root` or is a subdomain of it. Both sides lower-case.
pub fn is_within(host: &str, root: &str) -> bool {
    host == root
        || (host.len() > root.len() + 1
            && host.ends_with(root)
            && host.as_bytes()[host.len() - root.len() - 1] == b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_regular_hostnames() {
        for name in ["example.com", "a.b.example.co.uk", "xn--bcher-kva.example", "API-1.Example.COM", "localhost"] {
            assert!(is_valid_hostname(name), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_hostnames() {
        let long_label = format!("{}.com", "a".repeat(64));
        for name in [
            "", "-api.example.com", "api-.example.com", "example.c", "exa_mple.com", "a..b.com",
            ".example.com", "*.example.com", "example.com.", "10.0.0.1", long_label.as_str(),
        ] {
            assert!(!is_valid_hostname(name), "{name:?} should be invalid");
        }
    }

    #[test]
    fn rejects_overlong_names() {
        let name = vec!["abcdefghi"; 26].join(".") + ".com";
        assert!(name.len() > 253);
        assert!(!is_valid_hostname(&name));
    }

    #[test]
    fn normalize_lowercases_and_strips_dot() {
        assert_eq!(normalize_domain("  Example.COM. ").unwrap(), "example.com");
    }

    #[test]
    fn normalize_reports_reason() {
        match normalize_domain("exa mple.com") {
            Err(ScanError::InvalidDomain { reason, .. }) => assert_eq!(reason, "not a valid hostname"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(normalize_domain(""), Err(ScanError::InvalidDomain { reason: "empty", .. })));
    }

    #[test]
    fn within_requires_label_boundary() {
        assert!(is_within("example.com", "example.com"));
        assert!(is_within("api.example.com", "example.com"));
        assert!(!is_within("badexample.com", "example.com"));
        assert!(!is_within("example.com.evil.net", "example.com"));
    }
}
