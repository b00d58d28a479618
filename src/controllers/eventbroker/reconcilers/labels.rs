//! Label sets used to mark and find the objects of an EventBroker deployment.
//!
//! The sets are layered on the instance and name labels. Only the service selector carries
//! `active=true`, which the broker sets on the pod currently serving traffic; putting it on
//! object metadata or on the pod listing selector would hide every standby pod.

use std::collections::BTreeMap;

use super::naming::BrokerRole;

pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";
pub const K8S_NAME: &str = "app.kubernetes.io/name";
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const NODE_TYPE_LABEL: &str = "node-type";
pub const ACTIVE_LABEL: &str = "active";

pub const APP_NAME: &str = "eventbroker";
pub const MANAGED_BY: &str = "solace-pubsubplus-operator";

/// Labels every pod of the deployment carries; used to list them.
pub fn base_labels(deployment_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_INSTANCE.into(), deployment_name.into()),
        (K8S_NAME.into(), APP_NAME.into()),
    ])
}

/// Labels for all objects except Pods
pub fn object_labels(deployment_name: &str) -> BTreeMap<String, String> {
    let mut labels = base_labels(deployment_name);
    labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY.into());
    labels
}

pub fn pod_labels(deployment_name: &str, role: BrokerRole) -> BTreeMap<String, String> {
    let mut labels = base_labels(deployment_name);
    labels.insert(NODE_TYPE_LABEL.into(), role.node_type().into());
    labels
}

/// Selects the active broker pod behind the broker Service
pub fn service_selector(deployment_name: &str) -> BTreeMap<String, String> {
    let mut labels = base_labels(deployment_name);
    labels.insert(ACTIVE_LABEL.into(), "true".into());
    labels
}

/// Selects every broker pod, ready or not, for the discovery Service
pub fn discovery_service_selector(deployment_name: &str) -> BTreeMap<String, String> {
    base_labels(deployment_name)
}

/// Renders labels as an equality-based label selector, eg `a=b,c=d`
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
