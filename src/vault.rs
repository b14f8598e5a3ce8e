//! Encrypted storage of the upstream credentials owned by sessions.
use anyhow::Result;
use time::OffsetDateTime;

use portal_cipher::Cipher;
use portal_context::Context;
use portal_models::token::CredentialRecord;
use portal_models::token::SealedTokens;
use portal_models::token::TokenPair;
use portal_store::delete::DeleteClusterToken;
use portal_store::delete::DeleteSessionCredentials;
use portal_store::persist::PersistClusterToken;
use portal_store::persist::PersistVcsToken;
use portal_store::query::LookupClusterToken;
use portal_store::query::LookupVcsToken;
use portal_store::Store;

/// Upstream service credentials are issued for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Target<'a> {
    /// A registered cluster, by GUID.
    Cluster(&'a str),

    /// A VCS provider, by ID.
    Vcs(&'a str),
}

impl<'a> Target<'a> {
    /// Identifier of the upstream service.
    pub fn id(&self) -> &'a str {
        match self {
            Target::Cluster(guid) => guid,
            Target::Vcs(provider) => provider,
        }
    }
}

/// Store and retrieve token pairs, encrypting them at rest.
#[derive(Clone)]
pub struct Vault {
    cipher: Cipher,
    store: Store,
}

impl Vault {
    pub fn new(cipher: &Cipher, store: &Store) -> Vault {
        Vault {
            cipher: cipher.clone(),
            store: store.clone(),
        }
    }

    /// Delete the session credentials for a cluster.
    pub async fn forget_cluster(
        &self,
        context: &Context,
        session_id: &str,
        guid: &str,
    ) -> Result<()> {
        let op = DeleteClusterToken {
            guid: guid.to_string(),
            session_id: session_id.to_string(),
        };
        self.store.delete(context, op).await
    }

    /// Delete all cluster and VCS credentials of a session.
    pub async fn forget_session(&self, context: &Context, session_id: &str) -> Result<()> {
        let op = DeleteSessionCredentials::from(session_id);
        self.store.delete(context, op).await
    }

    /// Decrypt the session credentials for the target, if any are stored.
    pub async fn lookup(
        &self,
        context: &Context,
        session_id: &str,
        target: Target<'_>,
    ) -> Result<Option<TokenPair>> {
        let record = match target {
            Target::Cluster(guid) => {
                let op = LookupClusterToken {
                    guid: guid.to_string(),
                    session_id: session_id.to_string(),
                };
                self.store.query(context, op).await?
            }
            Target::Vcs(provider) => {
                let op = LookupVcsToken {
                    provider: provider.to_string(),
                    session_id: session_id.to_string(),
                };
                self.store.query(context, op).await?
            }
        };
        match record {
            None => Ok(None),
            Some(record) => self.unseal(&record.tokens).map(Some),
        }
    }

    /// Encrypt and store (or replace) the session credentials for the target.
    pub async fn persist(
        &self,
        context: &Context,
        session_id: &str,
        target: Target<'_>,
        tokens: &TokenPair,
    ) -> Result<()> {
        let record = CredentialRecord {
            session_id: session_id.to_string(),
            target: target.id().to_string(),
            tokens: self.seal(tokens)?,
        };
        match target {
            Target::Cluster(_) => {
                self.store
                    .persist(context, PersistClusterToken(record))
                    .await
            }
            Target::Vcs(_) => self.store.persist(context, PersistVcsToken(record)).await,
        }
    }

    /// Encrypt a token pair.
    pub fn seal(&self, tokens: &TokenPair) -> Result<SealedTokens> {
        let refresh_token = match &tokens.refresh_token {
            None => None,
            Some(token) => Some(self.cipher.encrypt(token.as_bytes())?),
        };
        Ok(SealedTokens {
            access_token: self.cipher.encrypt(tokens.access_token.as_bytes())?,
            expires_at: tokens.expires_at,
            issued_at: OffsetDateTime::now_utc(),
            refresh_token,
        })
    }

    /// Decrypt a token pair.
    pub fn unseal(&self, tokens: &SealedTokens) -> Result<TokenPair> {
        let refresh_token = match &tokens.refresh_token {
            None => None,
            Some(token) => Some(self.cipher.decrypt_string(token)?),
        };
        Ok(TokenPair {
            access_token: self.cipher.decrypt_string(&tokens.access_token)?,
            expires_at: tokens.expires_at,
            refresh_token,
        })
    }
}
