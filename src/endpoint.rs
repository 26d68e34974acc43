//! Explorer endpoint descriptors
//!
//! Every logical request the client can make is one [`Endpoint`] variant with
//! typed parameter slots. Paths are rendered from the variant, never built by
//! string concatenation at the call site.

use crate::error::{EtlError, Result};
use crate::model::validation::is_hash;
use reqwest::Url;
use std::fmt;

/// Base URL of the explorer API, e.g. `http://umbrel.local:3006/api/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase {
    url: Url,
}

impl ApiBase {
    pub fn parse(base: &str) -> Result<Self> {
        let mut normalized = base.trim().to_string();
        // Url::join drops the last path segment unless it ends with a slash
        if !normalized.ends_with('/') {
            normalized.push('/');
        }

        let url = Url::parse(&normalized)
            .map_err(|e| EtlError::Config(format!("Invalid API base URL {:?}: {}", base, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(EtlError::Config(format!(
                "API base URL must be http or https, got {:?}",
                url.scheme()
            )));
        }
        if url.cannot_be_a_base() || url.query().is_some() {
            return Err(EtlError::Config(format!(
                "API base URL cannot carry a query or be opaque: {}",
                url
            )));
        }

        Ok(Self { url })
    }

    pub fn url_for(&self, endpoint: &Endpoint) -> Result<Url> {
        self.url
            .join(&endpoint.path())
            .map_err(|e| EtlError::Config(format!("Cannot build URL for {}: {}", endpoint, e)))
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

/// A 64-character hex block hash, checked before it is placed in a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockHash(String);

impl BlockHash {
    pub fn parse(hash: &str) -> Result<Self> {
        let trimmed = hash.trim();
        if is_hash(trimmed) {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Err(EtlError::Validation(format!("Not a block hash: {:?}", hash)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How an endpoint encodes its response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `block-height/{height}`
    BlockHashByHeight { height: u64 },
    /// `block/{hash}`
    BlockByHash { hash: BlockHash },
    /// `v1/mining/blocks/timestamp/{ts}`
    BlockByTimestamp { timestamp: i64 },
    /// `blocks/{height?}`
    Blocks { start_height: Option<u64> },
    /// `block/{hash}/txids/`
    TxIds { hash: BlockHash },
    /// `block/{hash}/txs/{offset}`
    TxsPage { hash: BlockHash, offset: u64 },
}

impl Endpoint {
    pub fn path(&self) -> String {
        match self {
            Endpoint::BlockHashByHeight { height } => format!("block-height/{}", height),
            Endpoint::BlockByHash { hash } => format!("block/{}", hash),
            Endpoint::BlockByTimestamp { timestamp } => {
                format!("v1/mining/blocks/timestamp/{}", timestamp)
            }
            Endpoint::Blocks { start_height: None } => "blocks/".to_string(),
            Endpoint::Blocks {
                start_height: Some(height),
            } => format!("blocks/{}", height),
            Endpoint::TxIds { hash } => format!("block/{}/txids/", hash),
            Endpoint::TxsPage { hash, offset } => format!("block/{}/txs/{}", hash, offset),
        }
    }

    pub fn format(&self) -> ResponseFormat {
        match self {
            Endpoint::BlockHashByHeight { .. } => ResponseFormat::Text,
            _ => ResponseFormat::Json,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::BlockHashByHeight { .. } => "block_hash_by_height",
            Endpoint::BlockByHash { .. } => "block_by_hash",
            Endpoint::BlockByTimestamp { .. } => "block_by_timestamp",
            Endpoint::Blocks { .. } => "block_batch",
            Endpoint::TxIds { .. } => "transaction_ids",
            Endpoint::TxsPage { .. } => "transactions_batch",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "000000000000000000010538edbfd2d5b809a33dd83f284aeea41c6d0d96968a";

    fn hash() -> BlockHash {
        BlockHash::parse(HASH).unwrap()
    }

    #[test]
    fn test_paths_match_explorer_templates() {
        assert_eq!(Endpoint::BlockHashByHeight { height: 900_000 }.path(), "block-height/900000");
        assert_eq!(Endpoint::BlockByHash { hash: hash() }.path(), format!("block/{}", HASH));
        assert_eq!(
            Endpoint::BlockByTimestamp { timestamp: 1_754_468_475 }.path(),
            "v1/mining/blocks/timestamp/1754468475"
        );
        assert_eq!(Endpoint::Blocks { start_height: None }.path(), "blocks/");
        assert_eq!(Endpoint::Blocks { start_height: Some(42) }.path(), "blocks/42");
        assert_eq!(Endpoint::TxIds { hash: hash() }.path(), format!("block/{}/txids/", HASH));
        assert_eq!(
            Endpoint::TxsPage { hash: hash(), offset: 20 }.path(),
            format!("block/{}/txs/20", HASH)
        );
    }

    #[test]
    fn test_only_height_lookup_is_plain_text() {
        assert_eq!(Endpoint::BlockHashByHeight { height: 1 }.format(), ResponseFormat::Text);
        assert_eq!(Endpoint::TxIds { hash: hash() }.format(), ResponseFormat::Json);
    }

    #[test]
    fn test_base_without_trailing_slash_keeps_api_segment() {
        let base = ApiBase::parse("http://umbrel.local:3006/api").unwrap();
        let url = base.url_for(&Endpoint::Blocks { start_height: Some(7) }).unwrap();
        assert_eq!(url.as_str(), "http://umbrel.local:3006/api/blocks/7");
    }

    #[test]
    fn test_base_rejects_other_schemes() {
        assert!(matches!(ApiBase::parse("ftp://example.org/api/"), Err(EtlError::Config(_))));
        assert!(ApiBase::parse("not a url").is_err());
        assert!(ApiBase::parse("http://example.org/api/?key=1").is_err());
    }

    #[test]
    fn test_block_hash_slot_is_validated() {
        assert!(BlockHash::parse("../../etc/passwd").is_err());
        assert!(BlockHash::parse(&HASH[..63]).is_err());
        let upper = BlockHash::parse(&HASH.to_ascii_uppercase()).unwrap();
        assert_eq!(upper.as_str(), HASH);
    }
}
