//! Voter hash: a best-effort duplicate-vote guard.
//!
//! This is NOT an identity or a security boundary. The hash is derived from
//! browser properties on the client and trusted as-is; anyone can send a
//! different value and vote again. It only suppresses accidental double votes.

use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::convert::Infallible;

use crate::error::{TohyoError, TohyoResult};

/// Header carrying the client-derived hash
pub const VOTER_HASH_HEADER: &str = "x-voter-hash";

const MAX_VOTER_HASH_LEN: usize = 128;

/// Lowercase hex SHA-256 of `input`
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Opaque, unauthenticated voter key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterHash(String);

impl VoterHash {
    pub fn parse(raw: &str) -> TohyoResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TohyoError::Validation("Voter hash is empty".to_string()));
        }
        if trimmed.chars().count() > MAX_VOTER_HASH_LEN {
            return Err(TohyoError::Validation("Voter hash is too long".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VoterHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Browser properties combined into the voter hash
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserFingerprint {
    pub user_agent: String,
    pub language: String,
    pub timezone_offset_minutes: i32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u32,
}

impl BrowserFingerprint {
    /// SHA-256 over `ua|lang|tz|WxH|depth`, the same derivation browsers run
    pub fn hash(&self) -> VoterHash {
        let joined = [
            self.user_agent.clone(),
            self.language.clone(),
            self.timezone_offset_minutes.to_string(),
            format!("{}x{}", self.screen_width, self.screen_height),
            self.color_depth.to_string(),
        ]
        .join("|");

        VoterHash(sha256_hex(&joined))
    }

    /// Partial fingerprint from what a server can see in request headers
    pub fn from_headers(parts: &Parts) -> Self {
        let header_str = |name: header::HeaderName| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        Self {
            user_agent: header_str(header::USER_AGENT),
            language: header_str(header::ACCEPT_LANGUAGE),
            ..Self::default()
        }
    }
}

/// Extractor: the `X-Voter-Hash` header, or a header-derived fallback.
/// A malformed header is kept as `Err` so handlers can report it.
pub struct Voter(pub TohyoResult<VoterHash>);

impl<S> FromRequestParts<S> for Voter
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let voter = match parts.headers.get(VOTER_HASH_HEADER) {
            Some(value) => value
                .to_str()
                .map_err(|_| TohyoError::Validation("Voter hash is not valid text".to_string()))
                .and_then(VoterHash::parse),
            None => {
                let derived = BrowserFingerprint::from_headers(parts).hash();
                tracing::debug!("No voter hash header, derived {}", derived);
                Ok(derived)
            }
        };
        Ok(Voter(voter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fingerprint_hash_is_stable() {
        let fp = BrowserFingerprint {
            user_agent: "Mozilla/5.0".to_string(),
            language: "ja-JP".to_string(),
            timezone_offset_minutes: -540,
            screen_width: 1920,
            screen_height: 1080,
            color_depth: 24,
        };
        let expected = sha256_hex("Mozilla/5.0|ja-JP|-540|1920x1080|24");
        assert_eq!(fp.hash().as_str(), expected);
        assert_eq!(fp.hash(), fp.clone().hash());

        let other = BrowserFingerprint {
            color_depth: 30,
            ..fp.clone()
        };
        assert_ne!(fp.hash(), other.hash());
    }

    #[test]
    fn test_parse_trims_and_bounds() {
        assert_eq!(VoterHash::parse("  abc ").unwrap().as_str(), "abc");
        assert!(VoterHash::parse("   ").is_err());
        assert!(VoterHash::parse(&"a".repeat(129)).is_err());
        assert!(VoterHash::parse(&"a".repeat(128)).is_ok());
    }

    #[tokio::test]
    async fn test_extractor_prefers_header() {
        let (mut parts, _) = Request::builder()
            .header(VOTER_HASH_HEADER, "client-hash")
            .header("user-agent", "curl")
            .body(())
            .unwrap()
            .into_parts();

        let Voter(voter) = Voter::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(voter.unwrap().as_str(), "client-hash");
    }

    #[tokio::test]
    async fn test_extractor_falls_back_to_headers() {
        let (mut parts, _) = Request::builder()
            .header("user-agent", "Mozilla/5.0")
            .header("accept-language", "ja")
            .body(())
            .unwrap()
            .into_parts();

        let Voter(voter) = Voter::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(
            voter.unwrap().as_str(),
            sha256_hex("Mozilla/5.0|ja|0|0x0|0")
        );
    }
}
