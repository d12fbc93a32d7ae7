//! Content-addressed revisions
//!
//! A revision is `sha256:<lowercase-hex>` of the canonical bytes of a
//! snapshot whose `meta.revision` is cleared. Exports embed it with a
//! two-pass scheme: encode without revision, hash, set the field, encode
//! again. Verifiers must clear the field and re-hash; hashing the exported
//! bytes verbatim gives a different value.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::canonical::{self, CanonicalError};
use super::snapshot::Snapshot;

/// Prefix of every revision string
pub const REVISION_PREFIX: &str = "sha256:";

/// Hashes bytes into a revision string
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{}{}", REVISION_PREFIX, hex::encode(Sha256::digest(bytes)))
}

/// Computes the revision of a snapshot, ignoring any embedded revision
pub fn revision(snapshot: &Snapshot) -> Result<String, CanonicalError> {
    Ok(content_hash(&canonical::encode_unrevisioned(snapshot)?))
}

/// Computes the revision and embeds it in `meta.revision`
pub fn stamp_revision(snapshot: &mut Snapshot) -> Result<String, CanonicalError> {
    let rev = revision(snapshot)?;
    snapshot.meta.revision = Some(rev.clone());
    Ok(rev)
}

/// Outcome of checking an embedded revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RevisionCheck {
    /// No revision embedded
    Unstamped { computed: String },

    /// Embedded revision matches the content
    Match { revision: String },

    /// Content changed after stamping (or the stamp was forged)
    Mismatch { embedded: String, computed: String },
}

impl RevisionCheck {
    pub fn is_ok(&self) -> bool {
        !matches!(self, RevisionCheck::Mismatch { .. })
    }

    /// The revision computed from content
    pub fn computed(&self) -> &str {
        match self {
            RevisionCheck::Unstamped { computed } => computed,
            RevisionCheck::Match { revision } => revision,
            RevisionCheck::Mismatch { computed, .. } => computed,
        }
    }
}

/// Recomputes the revision and compares it to the embedded one
pub fn verify_revision(snapshot: &Snapshot) -> Result<RevisionCheck, CanonicalError> {
    let computed = revision(snapshot)?;
    Ok(match snapshot.meta.revision.as_deref() {
        None => RevisionCheck::Unstamped { computed },
        Some(embedded) if normalize_revision(embedded) == computed => {
            RevisionCheck::Match { revision: computed }
        }
        Some(embedded) => RevisionCheck::Mismatch {
            embedded: embedded.to_string(),
            computed,
        },
    })
}

/// Accepts `sha256:<hex>` or bare hex, any case; returns the canonical form
pub fn normalize_revision(input: &str) -> String {
    let trimmed = input.trim();
    let hex_part = trimmed
        .get(..REVISION_PREFIX.len())
        .filter(|p| p.eq_ignore_ascii_case(REVISION_PREFIX))
        .map_or(trimmed, |_| &trimmed[REVISION_PREFIX.len()..]);
    format!("{}{}", REVISION_PREFIX, hex_part.to_ascii_lowercase())
}
