use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::*;

use crate::controllers::eventbroker::store::EventBrokerStore;
use crate::resources::eventbrokers::EventBroker;
use crate::Result;

use super::labels::base_labels;

/// Pod names in listing order
pub fn pod_names(pods: &[Pod]) -> Vec<String> {
    pods.iter().map(ResourceExt::name_any).collect()
}

/// Whether the stored pod list must be rewritten. The comparison is ordered: the same pods
/// listed in a different order count as a change.
pub fn broker_pods_changed(stored: &[String], observed: &[String]) -> bool {
    stored != observed
}

/// Lists the broker pods of `eb` and writes their names to its status if they differ from
/// what is stored. Returns whether a write happened.
pub async fn reconcile_broker_pods<S: EventBrokerStore + ?Sized>(
    store: &S,
    eb: &EventBroker,
    namespace: &str,
) -> Result<bool> {
    let name = eb.name_any();
    let pods = store.list_pods(namespace, &base_labels(&name)).await?;
    let observed = pod_names(&pods);

    if !broker_pods_changed(eb.broker_pods(), &observed) {
        debug!("EventBroker {name} in namespace {namespace} already lists its {} broker pods", observed.len());
        return Ok(false);
    }

    info!(
        "Updating broker pods of EventBroker {name} in namespace {namespace} to {:?}",
        observed
    );
    store.update_broker_pods(eb, &observed).await?;
    Ok(true)
}
