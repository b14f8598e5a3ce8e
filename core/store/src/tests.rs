//! Unit test to ensure Store interface type conversions work nicely.
use futures::TryStreamExt;
use time::OffsetDateTime;

use portal_context::Context;
use portal_errors::DuplicateCluster;
use portal_models::cluster::ClusterKind;
use portal_models::cluster::ClusterRegistration;
use portal_models::oauth::OAuthState;

use crate::delete::ConsumeOAuthState;
use crate::delete::UnregisterCluster;
use crate::query::ListClusters;
use crate::query::LookupCluster;
use crate::Store;

fn cluster(guid: &str, endpoint: &str) -> ClusterRegistration {
    ClusterRegistration {
        api_endpoint: endpoint.into(),
        created_at: OffsetDateTime::now_utc(),
        created_by: "admin".into(),
        guid: guid.into(),
        kind: ClusterKind::Hcf,
        name: format!("cluster {}", guid),
        skip_ssl_validation: false,
    }
}

#[tokio::test]
async fn check_delete_interface() {
    let context = Context::fixture();
    let store = Store::fixture();
    store
        .delete(&context, UnregisterCluster::from("missing"))
        .await
        .expect("cluster unregister to be ok");
}

#[tokio::test]
async fn check_query_interface() {
    let context = Context::fixture();
    let store = Store::fixture();
    let cluster = store
        .query(&context, LookupCluster::from("missing"))
        .await
        .expect("cluster query to be ok");
    assert!(cluster.is_none());
}

#[tokio::test]
async fn check_persist_interface() {
    let context = Context::fixture();
    let store = Store::fixture();
    store
        .persist(&context, cluster("a", "https://api.one"))
        .await
        .expect("cluster persist to be ok");
    let clusters: Vec<ClusterRegistration> = store
        .query(&context, ListClusters)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(clusters.len(), 1);
}

#[tokio::test]
async fn fixture_rejects_duplicate_clusters() {
    let context = Context::fixture();
    let store = Store::fixture();
    store
        .persist(&context, cluster("a", "https://api.one"))
        .await
        .unwrap();
    let error = store
        .persist(&context, cluster("b", "https://api.one"))
        .await
        .unwrap_err();
    assert!(error.is::<DuplicateCluster>());
}

#[tokio::test]
async fn oauth_state_consumed_once() {
    let context = Context::fixture();
    let store = Store::fixture();
    let state = OAuthState {
        expires_at: OffsetDateTime::now_utc() + time::Duration::minutes(5),
        provider: "github".into(),
        session_id: "session".into(),
        state: "random".into(),
    };
    store.persist(&context, state.clone()).await.unwrap();

    let consume = ConsumeOAuthState {
        state: "random".into(),
    };
    let first = store.delete(&context, consume.clone()).await.unwrap();
    assert_eq!(first, Some(state));
    let second = store.delete(&context, consume).await.unwrap();
    assert_eq!(second, None);
}
