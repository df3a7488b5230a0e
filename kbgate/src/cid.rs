//! Content identifier normalization.
//!
//! The document backend returns CIDs in whatever form its storage layer produced, which in
//! practice means CIDv0 (`Qm...`, base58btc). Clients and gateways expect CIDv1 in lowercase
//! base-32 (`bafy...`), so every identifier that leaves this service goes through [`normalize`].
//!
//! Only the version tag and the text encoding change. The multihash (and with it the digest)
//! is carried over untouched, so the normalized identifier addresses exactly the same content.

use ::cid::Cid;
use ::cid::multibase::Base;
use thiserror::Error;

/// Multibase used for every normalized identifier.
pub const TARGET_BASE: Base = Base::Base32Lower;

#[derive(Debug, Error)]
pub enum CidError {
    #[error("content identifier is empty")]
    Empty,

    #[error("content identifier is not a string")]
    NotAString,

    /// Bad multibase prefix, bad length, or a multihash that does not decode
    #[error("malformed content identifier: {0}")]
    Malformed(#[from] ::cid::Error),
}

/// Re-encode `text` as a CIDv1 in lowercase base-32.
///
/// Accepts CIDv0 and CIDv1 in any multibase. Normalizing an identifier that is already in the
/// target form returns it unchanged.
pub fn normalize(text: &str) -> Result<String, CidError> {
    if text.is_empty() {
        return Err(CidError::Empty);
    }

    let parsed: Cid = text.parse()?;
    let v1 = parsed.into_v1()?;
    Ok(v1.to_string_of_base(TARGET_BASE)?)
}
