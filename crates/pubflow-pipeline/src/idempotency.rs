//! Content fingerprinting and the create/update/skip decision.
//!
//! The fingerprint covers the fields that affect the published artefact:
//! title, body, and the media URL set (order-insensitive). Volatile fields
//! like score and comment count are deliberately excluded so routine stat
//! refreshes never force a republish. The decision is made before any
//! network call; `Skip` costs nothing.

use sha2::{Digest, Sha256};

/// What the publish stage should do for an item, decided from local state
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishAction {
    /// Never published: mint a new post and record its ref.
    Create,
    /// Published before but the content changed: update in place, reusing
    /// the existing ref.
    Update,
    /// Published and unchanged: do nothing, issue no network call.
    Skip,
}

/// Computes the stable fingerprint of an item's publishable content.
///
/// Media URLs are sorted first, so reordering does not change the hash.
/// Fields are separated by a NUL byte so concatenation boundaries cannot
/// collide.
#[must_use]
pub fn content_fingerprint(title: &str, body: &str, media_urls: &[String]) -> String {
    let mut urls: Vec<&str> = media_urls.iter().map(String::as_str).collect();
    urls.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([0u8]);
    hasher.update(body.as_bytes());
    for url in urls {
        hasher.update([0u8]);
        hasher.update(url.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

/// Chooses the publish action for an item.
///
/// `published_hash` is the fingerprint snapshotted at the last successful
/// publish; `content_hash` is the current fingerprint. An item with a
/// publish ref but no recorded published hash is treated as changed.
#[must_use]
pub fn decide(
    published_hash: Option<&str>,
    content_hash: &str,
    has_publish_ref: bool,
) -> PublishAction {
    if !has_publish_ref {
        return PublishAction::Create;
    }
    match published_hash {
        Some(published) if published == content_hash => PublishAction::Skip,
        _ => PublishAction::Update,
    }
}
