//! Inefficient in-memory implementations of the stores for unit tests.
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use anyhow::Result;
use futures::StreamExt;
use time::OffsetDateTime;

use portal_context::Context;
use portal_errors::DuplicateCluster;
use portal_models::cluster::ClusterConnection;
use portal_models::cluster::ClusterRegistration;
use portal_models::oauth::OAuthState;
use portal_models::session::Session;
use portal_models::token::CredentialRecord;

use super::DeleteOps;
use super::DeleteResponses;
use super::PersistOps;
use super::PersistResponses;
use super::QueryOps;
use super::QueryResponses;
use super::SessionsBackend;
use super::StoreBackend;

/// Schema version reported by the in-memory store.
const FIXTURE_SCHEMA_VERSION: i64 = 1;

/// In-memory implementation of a mock [`Store`](super::Store) for unit tests.
#[derive(Clone)]
pub struct StoreFixture {
    /// Shared in-memory state to mock the DB with.
    inner: Arc<Mutex<StoreFixtureState>>,
}

impl StoreFixture {
    /// Lock and access the shared inner store.
    fn access(&self) -> MutexGuard<StoreFixtureState> {
        self.inner
            .lock()
            .expect("StoreFixture::inner state lock poisoned")
    }
}

impl Default for StoreFixture {
    fn default() -> Self {
        let inner = StoreFixtureState::default();
        let inner = Mutex::new(inner);
        let inner = Arc::new(inner);
        StoreFixture { inner }
    }
}

#[async_trait::async_trait]
impl StoreBackend for StoreFixture {
    async fn close(&self, _: &Context) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _: &Context, op: DeleteOps) -> Result<DeleteResponses> {
        let mut store = self.access();
        match op {
            DeleteOps::ClusterToken(token) => {
                store
                    .cluster_tokens
                    .remove(&(token.session_id, token.guid));
            }
            DeleteOps::ConsumeOAuthState(state) => {
                let state = store.oauth_states.remove(&state.state);
                return Ok(DeleteResponses::OAuthState(state));
            }
            DeleteOps::ExpiredOAuthStates(now) => {
                store.oauth_states.retain(|_, state| state.is_live(now));
            }
            DeleteOps::SessionCredentials(session) => {
                store
                    .cluster_tokens
                    .retain(|(session_id, _), _| session_id != &session.session_id);
                store
                    .vcs_tokens
                    .retain(|(session_id, _), _| session_id != &session.session_id);
            }
            DeleteOps::UnregisterCluster(cluster) => {
                store.clusters.remove(&cluster.guid);
            }
        };
        Ok(DeleteResponses::Success)
    }

    async fn ping(&self, _: &Context) -> Result<()> {
        Ok(())
    }

    async fn query(&self, _: &Context, op: QueryOps) -> Result<QueryResponses> {
        let store = self.access();
        match op {
            QueryOps::Cluster(lookup) => {
                let cluster = store.clusters.get(&lookup.guid).cloned();
                Ok(QueryResponses::Cluster(cluster))
            }
            QueryOps::ClusterToken(lookup) => {
                let key = (lookup.session_id, lookup.guid);
                let record = store.cluster_tokens.get(&key).cloned();
                Ok(QueryResponses::Credentials(record))
            }
            QueryOps::ListClusterConnections(list) => {
                let connections: Vec<Result<ClusterConnection>> = store
                    .sorted_clusters()
                    .into_iter()
                    .map(|cluster| {
                        let key = (list.session_id.clone(), cluster.guid.clone());
                        let token_expiry = store
                            .cluster_tokens
                            .get(&key)
                            .map(|record| record.tokens.expires_at);
                        Ok(ClusterConnection {
                            cluster,
                            token_expiry,
                        })
                    })
                    .collect();
                let stream = futures::stream::iter(connections).boxed();
                Ok(QueryResponses::ClusterConnections(stream))
            }
            QueryOps::ListClusters => {
                let clusters: Vec<Result<ClusterRegistration>> =
                    store.sorted_clusters().into_iter().map(Ok).collect();
                let stream = futures::stream::iter(clusters).boxed();
                Ok(QueryResponses::Clusters(stream))
            }
            QueryOps::SchemaVersion(_) => {
                Ok(QueryResponses::SchemaVersion(Some(FIXTURE_SCHEMA_VERSION)))
            }
            QueryOps::VcsToken(lookup) => {
                let key = (lookup.session_id, lookup.provider);
                let record = store.vcs_tokens.get(&key).cloned();
                Ok(QueryResponses::Credentials(record))
            }
        }
    }

    async fn persist(&self, _: &Context, op: PersistOps) -> Result<PersistResponses> {
        let mut store = self.access();
        match op {
            PersistOps::Cluster(cluster) => {
                let duplicate = store.clusters.values().any(|registered| {
                    registered.kind == cluster.kind
                        && registered.api_endpoint == cluster.api_endpoint
                });
                if duplicate {
                    let error = DuplicateCluster::new(cluster.kind.as_str(), cluster.api_endpoint);
                    anyhow::bail!(error);
                }
                store.clusters.insert(cluster.guid.clone(), cluster);
            }
            PersistOps::ClusterToken(record) => {
                let key = (record.session_id.clone(), record.target.clone());
                store.cluster_tokens.insert(key, record);
            }
            PersistOps::OAuthState(state) => {
                store.oauth_states.insert(state.state.clone(), state);
            }
            PersistOps::VcsToken(record) => {
                let key = (record.session_id.clone(), record.target.clone());
                store.vcs_tokens.insert(key, record);
            }
        };
        Ok(PersistResponses::Success)
    }
}

/// Container for the shared state.
#[derive(Default)]
struct StoreFixtureState {
    clusters: HashMap<String, ClusterRegistration>,
    cluster_tokens: HashMap<(String, String), CredentialRecord>,
    oauth_states: HashMap<String, OAuthState>,
    vcs_tokens: HashMap<(String, String), CredentialRecord>,
}

impl StoreFixtureState {
    fn sorted_clusters(&self) -> Vec<ClusterRegistration> {
        let mut clusters: Vec<ClusterRegistration> = self.clusters.values().cloned().collect();
        clusters.sort_by(|left, right| {
            left.name
                .cmp(&right.name)
                .then_with(|| left.guid.cmp(&right.guid))
        });
        clusters
    }
}

/// In-memory implementation of a mock [`Sessions`](super::Sessions) store for unit tests.
#[derive(Clone, Default)]
pub struct SessionsFixture {
    inner: Arc<Mutex<BTreeMap<String, Session>>>,
}

impl SessionsFixture {
    fn access(&self) -> MutexGuard<BTreeMap<String, Session>> {
        self.inner
            .lock()
            .expect("SessionsFixture::inner state lock poisoned")
    }
}

#[async_trait::async_trait]
impl SessionsBackend for SessionsFixture {
    async fn cleanup(&self, _: &Context, now: OffsetDateTime) -> Result<Vec<String>> {
        let mut sessions = self.access();
        let expired: Vec<String> = sessions
            .values()
            .filter(|session| !session.is_live(now))
            .map(|session| session.id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        Ok(expired)
    }

    async fn close(&self, _: &Context) -> Result<()> {
        Ok(())
    }

    async fn create(&self, _: &Context, session: Session) -> Result<()> {
        self.access().insert(session.id.clone(), session);
        Ok(())
    }

    async fn destroy(&self, _: &Context, id: &str) -> Result<()> {
        self.access().remove(id);
        Ok(())
    }

    async fn load(&self, _: &Context, id: &str) -> Result<Option<Session>> {
        Ok(self.access().get(id).cloned())
    }

    async fn ping(&self, _: &Context) -> Result<()> {
        Ok(())
    }

    async fn touch(
        &self,
        _: &Context,
        id: &str,
        last_access: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<()> {
        if let Some(session) = self.access().get_mut(id) {
            session.last_access = last_access;
            session.expires_at = expires_at;
        }
        Ok(())
    }
}
