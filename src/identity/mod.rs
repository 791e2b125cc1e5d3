//! Resolves who is acting: a signed-in account when one can be found, otherwise a stable anonymous
//! identity kept in client-side storage.
//!
//! Resolution never fails. Provider and storage errors are logged and the resolver degrades to the
//! anonymous identity.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::db::models::connection::{UserId, UserType};

pub mod provider;
pub mod storage;

use provider::{IdentityProvider, ProviderUser};
use storage::SessionStorage;

/// Storage key of the account cached by a previous sign-in.
pub const ACCOUNT_KEY: &str = "currentUser";
/// Storage key of the generated anonymous identity.
pub const LOCAL_IDENTITY_KEY: &str = "union-scoring-user";
pub const LOCAL_ID_PREFIX: &str = "local-";

pub const CONNECTED_USER_NAME: &str = "Connected User";
pub const LOCAL_USER_NAME: &str = "Local User";

const LOCAL_ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub user_type: UserType,
    pub name: String,
    #[serde(default)]
    pub photo: Option<String>,
}

impl Identity {
    pub fn is_connected(&self) -> bool {
        self.user_type == UserType::Connected
    }
}

/// Account record written to storage by the sign-in flow.
///
/// The sign-in flow stores names as `prenom`/`nom`; `firstName`/`lastName` are accepted as well.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAccount {
    id: String,
    #[serde(default, alias = "prenom")]
    first_name: Option<String>,
    #[serde(default, alias = "nom")]
    last_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

impl From<StoredAccount> for Identity {
    fn from(account: StoredAccount) -> Self {
        let full_name = format!(
            "{} {}",
            account.first_name.as_deref().unwrap_or_default(),
            account.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_owned();

        Self {
            user_id: account.id.into(),
            user_type: UserType::Connected,
            name: first_non_empty([Some(full_name), account.email])
                .unwrap_or_else(|| CONNECTED_USER_NAME.to_owned()),
            photo: account.avatar_url.filter(|p| !p.trim().is_empty()),
        }
    }
}

impl From<ProviderUser> for Identity {
    fn from(user: ProviderUser) -> Self {
        Self {
            user_id: user.id.into(),
            user_type: UserType::Connected,
            name: first_non_empty([user.user_metadata.full_name, user.email])
                .unwrap_or_else(|| CONNECTED_USER_NAME.to_owned()),
            photo: user
                .user_metadata
                .avatar_url
                .filter(|p| !p.trim().is_empty()),
        }
    }
}

/// Anonymous identity as persisted under [`LOCAL_IDENTITY_KEY`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalRecord {
    id: String,
    name: String,
    #[serde(default)]
    photo: Option<String>,
    created: String,
}

impl LocalRecord {
    fn generate() -> Self {
        Self {
            id: generate_local_id(),
            name: LOCAL_USER_NAME.to_owned(),
            photo: None,
            created: Utc::now().to_rfc3339(),
        }
    }
}

impl From<LocalRecord> for Identity {
    fn from(record: LocalRecord) -> Self {
        Self {
            user_id: record.id.into(),
            user_type: UserType::Local,
            name: record.name,
            photo: record.photo,
        }
    }
}

fn first_non_empty<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|c| c.trim().to_owned())
        .find(|c| !c.is_empty())
}

/// `local-<unix millis>-<9 base36 chars>`
pub fn generate_local_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..LOCAL_ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();

    format!(
        "{LOCAL_ID_PREFIX}{}-{suffix}",
        Utc::now().timestamp_millis()
    )
}

pub struct IdentityResolver<S, P> {
    storage: S,
    provider: P,
}

impl<S, P> IdentityResolver<S, P>
where
    S: SessionStorage,
    P: IdentityProvider,
{
    pub fn new(storage: S, provider: P) -> Self {
        Self { storage, provider }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Resolves the acting identity: cached account, then provider session, then the anonymous
    /// local identity (generated and persisted on first use).
    ///
    /// Calling this again acts as a refresh and picks up any change in the signed-in session.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> Identity {
        if let Some(identity) = self.cached_account() {
            tracing::debug!(user_id = %identity.user_id, "using cached account");
            return identity;
        }

        match self.provider.current_user().await {
            Ok(Some(user)) => {
                let identity = Identity::from(user);
                tracing::debug!(user_id = %identity.user_id, "using provider session");
                return identity;
            }
            Ok(None) => (),
            Err(e) => {
                tracing::warn!(error = ?e, "identity provider lookup failed, using local identity");
            }
        }

        self.local_identity()
    }

    fn cached_account(&self) -> Option<Identity> {
        let raw = match self.storage.get_item(ACCOUNT_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = ?e, "failed to read cached account");
                return None;
            }
        };

        match serde_json::from_str::<StoredAccount>(&raw) {
            Ok(account) if !account.id.trim().is_empty() => Some(account.into()),
            Ok(_) => {
                tracing::warn!("cached account has an empty id, ignoring");
                None
            }
            Err(e) => {
                tracing::warn!(error = ?e, "failed to parse cached account");
                None
            }
        }
    }

    fn local_identity(&self) -> Identity {
        let existing = match self.storage.get_item(LOCAL_IDENTITY_KEY) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = ?e, "failed to read local identity");
                None
            }
        };

        if let Some(raw) = existing {
            match serde_json::from_str::<LocalRecord>(&raw) {
                Ok(record) if record.id.starts_with(LOCAL_ID_PREFIX) => {
                    tracing::debug!(user_id = record.id, "using stored local identity");
                    return record.into();
                }
                Ok(record) => {
                    tracing::warn!(user_id = record.id, "stored local identity has a foreign id, replacing");
                }
                Err(e) => {
                    tracing::warn!(error = ?e, "stored local identity is corrupt, replacing");
                }
            }
        }

        let record = LocalRecord::generate();
        match serde_json::to_string(&record) {
            Ok(raw) => {
                if let Err(e) = self.storage.set_item(LOCAL_IDENTITY_KEY, &raw) {
                    tracing::warn!(error = ?e, "failed to persist local identity");
                }
            }
            Err(e) => tracing::warn!(error = ?e, "failed to encode local identity"),
        }

        tracing::info!(user_id = record.id, "created new local identity");
        record.into()
    }
}

pub type IdentityResult<T> = core::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("identity provider responded with {0}")]
    Provider(http::StatusCode),
}
