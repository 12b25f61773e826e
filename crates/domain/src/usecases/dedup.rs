//! Duplicate detection for fetched posts

use crate::{
    compute_fingerprint,
    model::ProfileId,
    ports::{Store, StoreError},
};

/// Decides whether a candidate post is already stored for a profile
///
/// A candidate is a duplicate when a stored post of the same profile has an
/// equal non-empty URL, or an equal fingerprint. Empty URLs never match.
pub struct Deduplicator<'a, St: Store + ?Sized> {
    store: &'a St,
}

impl<'a, St: Store + ?Sized> Deduplicator<'a, St> {
    pub fn new(store: &'a St) -> Self {
        Self { store }
    }

    pub async fn is_duplicate(
        &self,
        profile_id: ProfileId,
        candidate_url: Option<&str>,
        candidate_text: &str,
    ) -> Result<bool, StoreError> {
        let fingerprint = compute_fingerprint(profile_id, candidate_text);
        self.matches_existing(profile_id, candidate_url, &fingerprint)
            .await
    }

    /// Same check with a precomputed fingerprint
    pub async fn matches_existing(
        &self,
        profile_id: ProfileId,
        candidate_url: Option<&str>,
        fingerprint: &str,
    ) -> Result<bool, StoreError> {
        if let Some(url) = candidate_url.map(str::trim).filter(|u| !u.is_empty()) {
            if self.store.find_post_by_url(profile_id, url).await?.is_some() {
                tracing::debug!(profile_id, url = %url, "Duplicate by URL");
                return Ok(true);
            }
        }

        if self
            .store
            .find_post_by_fingerprint(profile_id, fingerprint)
            .await?
            .is_some()
        {
            tracing::debug!(profile_id, fingerprint = %fingerprint, "Duplicate by fingerprint");
            return Ok(true);
        }

        Ok(false)
    }
}
