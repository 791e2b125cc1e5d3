//! External identity providers consulted when no account is cached locally.

use async_trait::async_trait;
use http::StatusCode;
use http::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::instrument;

use super::{IdentityError, IdentityResult};
use crate::util::env::{EnvResult, Var};
use crate::var;

/// A signed-in user as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: ProviderMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` when there is no active session.
    async fn current_user(&self) -> IdentityResult<Option<ProviderUser>>;
}

/// Provider for environments without any authentication backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProvider;

#[async_trait]
impl IdentityProvider for NoProvider {
    async fn current_user(&self) -> IdentityResult<Option<ProviderUser>> {
        Ok(None)
    }
}

/// An unconfigured provider behaves like [`NoProvider`].
#[async_trait]
impl<P> IdentityProvider for Option<P>
where
    P: IdentityProvider,
{
    async fn current_user(&self) -> IdentityResult<Option<ProviderUser>> {
        match self {
            Some(provider) => provider.current_user().await,
            None => Ok(None),
        }
    }
}

/// Reads the session user from a hosted auth service (`GET {base}/auth/v1/user`).
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: String,
}

impl HttpIdentityProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            access_token: access_token.into(),
        }
    }

    /// `None` unless both the provider URL and an access token are configured.
    pub async fn from_env() -> EnvResult<Option<Self>> {
        let base_url = var!(Var::AuthProviderUrl).await?;
        let access_token = var!(Var::AuthAccessToken).await?;
        if base_url.is_empty() || access_token.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self::new(
            base_url,
            var!(Var::AuthApiKey).await?,
            access_token,
        )))
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip(self), fields(base_url = self.base_url))]
    async fn current_user(&self) -> IdentityResult<Option<ProviderUser>> {
        let mut request = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token));

        if !self.api_key.is_empty() {
            request = request.header("apikey", &self.api_key);
        }

        let res = request.send().await?;
        match res.status() {
            StatusCode::OK => Ok(Some(res.json::<ProviderUser>().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!("no active provider session");
                Ok(None)
            }
            status => {
                tracing::error!(code = %status, "unexpected provider response");
                Err(IdentityError::Provider(status))
            }
        }
    }
}
