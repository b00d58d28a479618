use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_REPOSITORY: &str = "solace/solace-pubsub-standard";
pub const DEFAULT_IMAGE_TAG: &str = "latest";
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";
pub const DEFAULT_SERVICE_TYPE: &str = "LoadBalancer";

/// EventBroker declares a PubSub+ event broker deployment. The operator maintains a Service,
/// a ConfigMap and a StatefulSet per broker role for it, and reports the broker pods in status.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    kind = "EventBroker",
    group = "pubsubplus.solace.com",
    version = "v1alpha1",
    namespaced,
    printcolumn = r#"{"name":"Size", "type":"integer", "jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Pods", "type":"string", "jsonPath":".status.brokerPods", "priority": 1}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "EventBrokerStatus", shortname = "eb")]
#[serde(rename_all = "camelCase")]
pub struct EventBrokerSpec {
    /// size is the desired number of broker pods in the primary message routing StatefulSet. Defaults to 1.
    #[schemars(range(min = 1))]
    pub size: Option<i32>,
    /// Broker container image
    pub image: Option<BrokerImage>,
    /// Configuration of the Service exposing the broker
    pub service: Option<BrokerService>,
    /// Persistent storage for broker data. If unset, broker data lives on the pod's ephemeral storage.
    pub storage: Option<BrokerStorage>,
}

impl EventBrokerSpec {
    pub fn desired_size(&self) -> i32 {
        self.size.unwrap_or(1)
    }

    pub fn image_name(&self) -> String {
        let repository = self
            .image
            .as_ref()
            .and_then(|i| i.repository.as_deref())
            .unwrap_or(DEFAULT_IMAGE_REPOSITORY);
        let tag = self
            .image
            .as_ref()
            .and_then(|i| i.tag.as_deref())
            .unwrap_or(DEFAULT_IMAGE_TAG);
        format!("{repository}:{tag}")
    }

    pub fn image_pull_policy(&self) -> String {
        self.image
            .as_ref()
            .and_then(|i| i.pull_policy.clone())
            .unwrap_or_else(|| DEFAULT_IMAGE_PULL_POLICY.into())
    }

    pub fn service_type(&self) -> String {
        self.service
            .as_ref()
            .and_then(|s| s.r#type.clone())
            .unwrap_or_else(|| DEFAULT_SERVICE_TYPE.into())
    }
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrokerImage {
    /// Image repository. Defaults to solace/solace-pubsub-standard.
    pub repository: Option<String>,
    /// Image tag. Defaults to latest.
    pub tag: Option<String>,
    /// Image pull policy. One of Always, Never, IfNotPresent. Defaults to IfNotPresent.
    pub pull_policy: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrokerService {
    /// Service type. One of ClusterIP, NodePort, LoadBalancer. Defaults to LoadBalancer.
    pub r#type: Option<String>,
    /// Annotations to set on the broker Service
    pub annotations: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStorage {
    /// Size of the data volume claim, as a Kubernetes quantity (eg `30Gi`).
    pub size: Option<String>,
    /// storageClassName is the name of the StorageClass required by the claim.
    pub storage_class_name: Option<String>,
}

/// Status of the EventBroker.
/// This is set and managed automatically.
/// Read-only.
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventBrokerStatus {
    /// Names of the broker pods of this deployment, in the order they were listed
    pub broker_pods: Option<Vec<String>>,
}

impl EventBroker {
    /// The pod names recorded in status; an unset list reads as empty.
    pub fn broker_pods(&self) -> &[String] {
        self.status
            .as_ref()
            .and_then(|s| s.broker_pods.as_deref())
            .unwrap_or_default()
    }
}
