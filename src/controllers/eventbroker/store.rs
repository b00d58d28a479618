//! Access to the cluster objects the EventBroker reconciler reads and writes.
//!
//! The reconciler only talks to the cluster through [`EventBrokerStore`], so it can be driven
//! against an in-memory store in tests. [`KubeStore`] is the implementation backed by the
//! Kubernetes API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::core::subresource::Scale;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::*;

#[cfg(test)]
use mockall::automock;

use crate::resources::eventbrokers::{EventBroker, EventBrokerStatus};
use crate::{Error, Result};

use super::reconcilers::labels::selector_string;

/// Field manager used for the writes of this operator
pub const FIELD_MANAGER: &str = "pubsubplus-operator";

/// Get operations return `Ok(None)` when the object does not exist; every other failure is
/// an error the caller should retry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventBrokerStore: Send + Sync {
    async fn get_event_broker(&self, namespace: &str, name: &str) -> Result<Option<EventBroker>>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>>;

    async fn create_service(&self, namespace: &str, svc: &Service) -> Result<()>;

    async fn create_config_map(&self, namespace: &str, cm: &ConfigMap) -> Result<()>;

    async fn create_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()>;

    /// Set the desired replicas of a StatefulSet through its scale subresource
    async fn scale_stateful_set(&self, namespace: &str, name: &str, replicas: i32) -> Result<()>;

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>>;

    /// Replace the broker pod list in the status of `eb`. Only the status subresource is
    /// written, and the write fails with a conflict if `eb` is stale.
    async fn update_broker_pods(&self, eb: &EventBroker, pods: &[String]) -> Result<()>;
}

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> Result<Option<K>>
    where
        K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create<K>(&self, namespace: &str, obj: &K) -> Result<()>
    where
        K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + Serialize
            + DeserializeOwned
            + std::fmt::Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        debug!(
            "Creating {} {} in namespace {namespace}",
            K::kind(&()),
            obj.name_any()
        );
        api.create(&PostParams::default(), obj).await?;
        Ok(())
    }
}

#[async_trait]
impl EventBrokerStore for KubeStore {
    async fn get_event_broker(&self, namespace: &str, name: &str) -> Result<Option<EventBroker>> {
        self.get_opt(namespace, name).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        self.get_opt(namespace, name).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        self.get_opt(namespace, name).await
    }

    async fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        self.get_opt(namespace, name).await
    }

    async fn create_service(&self, namespace: &str, svc: &Service) -> Result<()> {
        self.create(namespace, svc).await
    }

    async fn create_config_map(&self, namespace: &str, cm: &ConfigMap) -> Result<()> {
        self.create(namespace, cm).await
    }

    async fn create_stateful_set(&self, namespace: &str, sts: &StatefulSet) -> Result<()> {
        self.create(namespace, sts).await
    }

    async fn scale_stateful_set(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        api.patch_scale(
            name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(json!({
                "apiVersion": Scale::api_version(&()),
                "kind": Scale::kind(&()),
                "spec": { "replicas": replicas }
            })),
        )
        .await?;
        Ok(())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&selector_string(labels));
        Ok(api.list(&lp).await?.items)
    }

    async fn update_broker_pods(&self, eb: &EventBroker, pods: &[String]) -> Result<()> {
        let namespace = eb.namespace().ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let api: Api<EventBroker> = Api::namespaced(self.client.clone(), &namespace);

        let status = serde_json::to_value(EventBrokerStatus {
            broker_pods: Some(pods.to_vec()),
        })?;
        // resourceVersion turns the merge patch into a compare-and-swap
        let patch = json!({
            "metadata": { "resourceVersion": eb.resource_version() },
            "status": status,
        });
        api.patch_status(
            &eb.name_any(),
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, Request, Response, StatusCode};
    use kube::client::Body;
    use serde_json::Value;

    use super::*;
    use crate::controllers::eventbroker::reconcilers::labels::base_labels;
    use crate::controllers::eventbroker::reconcilers::test_support::event_broker;

    type ApiServerHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

    fn mock_store() -> (KubeStore, ApiServerHandle) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        (KubeStore::new(Client::new(mock_service, "default")), handle)
    }

    fn json_response(status: StatusCode, body: Value) -> Response<Body> {
        Response::builder()
            .status(status)
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn not_found(name: &str) -> Response<Body> {
        json_response(
            StatusCode::NOT_FOUND,
            json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "message": format!("services \"{name}\" not found"),
                "reason": "NotFound",
                "code": 404
            }),
        )
    }

    #[tokio::test]
    async fn missing_object_is_none() {
        let (store, mut handle) = mock_store();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), Method::GET);
            assert_eq!(
                request.uri().path(),
                "/api/v1/namespaces/default/services/sample-pubsubplus"
            );
            send.send_response(not_found("sample-pubsubplus"));
        });

        let svc = store
            .get_service("default", "sample-pubsubplus")
            .await
            .unwrap();
        assert!(svc.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_errors_are_propagated() {
        let (store, mut handle) = mock_store();
        let server = tokio::spawn(async move {
            let (_request, send) = handle.next_request().await.expect("service not called");
            send.send_response(json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "kind": "Status",
                    "apiVersion": "v1",
                    "metadata": {},
                    "status": "Failure",
                    "message": "etcdserver: request timed out",
                    "reason": "InternalError",
                    "code": 500
                }),
            ));
        });

        let err = store
            .get_config_map("default", "sample-pubsubplus")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::KubeError(kube::Error::Api(ae)) if ae.code == 500));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn list_pods_filters_by_label_selector() {
        let (store, mut handle) = mock_store();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), Method::GET);
            assert_eq!(request.uri().path(), "/api/v1/namespaces/default/pods");
            let query = request.uri().query().unwrap_or_default().to_string();
            assert!(query.contains("labelSelector="), "{query}");
            assert!(query.contains("app.kubernetes.io%2Finstance%3Dsample"), "{query}");
            send.send_response(json_response(
                StatusCode::OK,
                json!({
                    "apiVersion": "v1",
                    "kind": "PodList",
                    "metadata": {"resourceVersion": "10"},
                    "items": [
                        {"metadata": {"name": "sample-pubsubplus-p-0", "namespace": "default"}},
                        {"metadata": {"name": "sample-pubsubplus-p-1", "namespace": "default"}}
                    ]
                }),
            ));
        });

        let pods = store
            .list_pods("default", &base_labels("sample"))
            .await
            .unwrap();
        let names: Vec<_> = pods.iter().map(|p| p.name_any()).collect();
        assert_eq!(names, vec!["sample-pubsubplus-p-0", "sample-pubsubplus-p-1"]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn broker_pods_are_written_to_the_status_subresource() {
        let (store, mut handle) = mock_store();
        let eb = event_broker("sample", Default::default());
        let response = serde_json::to_value(&eb).unwrap();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), Method::PATCH);
            assert_eq!(
                request.uri().path(),
                "/apis/pubsubplus.solace.com/v1alpha1/namespaces/default/eventbrokers/sample/status"
            );
            assert_eq!(
                request.headers().get("content-type").unwrap(),
                "application/merge-patch+json"
            );
            let body = request.into_body().collect_bytes().await.unwrap();
            let patch: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(
                patch,
                json!({
                    "metadata": {"resourceVersion": "1"},
                    "status": {"brokerPods": ["sample-pubsubplus-p-0"]}
                })
            );
            send.send_response(json_response(StatusCode::OK, response));
        });

        store
            .update_broker_pods(&eb, &["sample-pubsubplus-p-0".to_string()])
            .await
            .unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn stale_status_writes_conflict() {
        let (store, mut handle) = mock_store();
        let eb = event_broker("sample", Default::default());
        let server = tokio::spawn(async move {
            let (_request, send) = handle.next_request().await.expect("service not called");
            send.send_response(json_response(
                StatusCode::CONFLICT,
                json!({
                    "kind": "Status",
                    "apiVersion": "v1",
                    "metadata": {},
                    "status": "Failure",
                    "message": "the object has been modified; please apply your changes to the latest version and try again",
                    "reason": "Conflict",
                    "code": 409
                }),
            ));
        });

        let err = store.update_broker_pods(&eb, &[]).await.unwrap_err();
        assert!(matches!(err, Error::KubeError(kube::Error::Api(ae)) if ae.code == 409));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn empty_broker_pods_are_written_as_an_empty_list() {
        let (store, mut handle) = mock_store();
        let eb = event_broker("sample", Default::default());
        let response = serde_json::to_value(&eb).unwrap();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            let body = request.into_body().collect_bytes().await.unwrap();
            let patch: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(patch["status"], json!({"brokerPods": []}));
            assert!(patch.get("spec").is_none());
            send.send_response(json_response(StatusCode::OK, response));
        });

        store.update_broker_pods(&eb, &[]).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn scaling_applies_the_scale_subresource() {
        let (store, mut handle) = mock_store();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), Method::PATCH);
            assert_eq!(
                request.uri().path(),
                "/apis/apps/v1/namespaces/default/statefulsets/sample-pubsubplus-p/scale"
            );
            let query = request.uri().query().unwrap_or_default().to_string();
            assert!(query.contains("fieldManager=pubsubplus-operator"), "{query}");
            assert!(query.contains("force=true"), "{query}");
            assert_eq!(
                request.headers().get("content-type").unwrap(),
                "application/apply-patch+yaml"
            );
            let body = request.into_body().collect_bytes().await.unwrap();
            let patch: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(
                patch,
                json!({
                    "apiVersion": "autoscaling/v1",
                    "kind": "Scale",
                    "spec": {"replicas": 3}
                })
            );
            send.send_response(json_response(
                StatusCode::OK,
                json!({
                    "apiVersion": "autoscaling/v1",
                    "kind": "Scale",
                    "metadata": {"name": "sample-pubsubplus-p", "namespace": "default"},
                    "spec": {"replicas": 3},
                    "status": {"replicas": 1}
                }),
            ));
        });

        store
            .scale_stateful_set("default", "sample-pubsubplus-p", 3)
            .await
            .unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn create_posts_to_the_collection() {
        let (store, mut handle) = mock_store();
        let cm = ConfigMap {
            metadata: kube::api::ObjectMeta {
                name: Some("sample-pubsubplus".into()),
                namespace: Some("default".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let response = serde_json::to_value(&cm).unwrap();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), Method::POST);
            assert_eq!(request.uri().path(), "/api/v1/namespaces/default/configmaps");
            send.send_response(json_response(StatusCode::CREATED, response));
        });

        store.create_config_map("default", &cm).await.unwrap();
        server.await.unwrap();
    }
}
