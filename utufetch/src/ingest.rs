//! Validation et canonicalisation des URL soumises
//!
//! Seuls les hôtes de la liste blanche sont acceptés ; le schéma est forcé
//! en https avant la comparaison, si bien que `http://youtu.be/x` et
//! `https://youtu.be/x` désignent la même ligne média.

use crate::error::{Error, Result};
use url::Url;

/// Hôtes acceptés à l'ingestion
pub const HOST_WHITELIST: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "youtu.be",
];

/// Canonicalise une URL soumise par un client
pub fn canonicalize_url(raw: &str) -> Result<String> {
    let mut parsed = Url::parse(raw)?;

    if parsed.set_scheme("https").is_err() {
        return Err(Error::BadUrl(raw.to_string()));
    }

    let host = parsed.host_str().unwrap_or_default();
    if !HOST_WHITELIST.contains(&host) {
        return Err(Error::BadHost(host.to_string()));
    }

    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_is_forced_to_https() {
        assert_eq!(
            canonicalize_url("http://youtu.be/AAA").unwrap(),
            "https://youtu.be/AAA"
        );
    }

    #[test]
    fn whitelisted_hosts_pass() {
        for host in HOST_WHITELIST {
            assert!(canonicalize_url(&format!("https://{host}/watch?v=x")).is_ok());
        }
    }

    #[test]
    fn other_hosts_are_rejected() {
        match canonicalize_url("https://example.com/vid") {
            Err(Error::BadHost(host)) => assert_eq!(host, "example.com"),
            other => panic!("expected BadHost, got {other:?}"),
        }
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(canonicalize_url("not a url at all").is_err());
    }
}
