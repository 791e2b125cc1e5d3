use crate::util::env::{EnvResult, Var};
use crate::var;

/// Turns stored photo references (object paths inside a storage bucket) into public URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoStorage {
    base_url: String,
    bucket: String,
}

impl PhotoStorage {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            bucket: bucket.into().trim_matches('/').to_owned(),
        }
    }

    pub async fn from_env() -> EnvResult<Self> {
        Ok(Self::new(
            var!(Var::PhotoStorageUrl).await?,
            var!(Var::PhotoBucket).await?,
        ))
    }

    /// Returns `None` for blank references. Absolute URLs are passed through untouched, as are all
    /// references when no storage base URL is configured.
    pub fn public_url(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        if reference.starts_with("http://")
            || reference.starts_with("https://")
            || self.base_url.is_empty()
        {
            return Some(reference.to_owned());
        }

        Some(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            reference.trim_start_matches('/')
        ))
    }
}
