//! Convergence of a single EventBroker.
//!
//! Each pass walks the owned objects in a fixed order (Service, ConfigMap, primary
//! StatefulSet) and stops at the first one it has to create, asking to be run again. Only a
//! pass that finds every object in place goes on to scaling and status. At most one object is
//! written per pass, and nothing relies on reading back an object created in the same pass.

use std::time::Duration;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::*;

use crate::resources::eventbrokers::EventBroker;
use crate::Result;

use super::reconcilers::compute::{broker_configmap, broker_statefulset};
use super::reconcilers::naming::{object_name, statefulset_name, BrokerRole, ObjectKind};
use super::reconcilers::service::broker_service;
use super::reconcilers::status::reconcile_broker_pods;
use super::reconcilers::base_metadata;
use super::store::EventBrokerStore;

/// What the dispatcher should do after a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Converged; wait for the next change
    Done,
    /// Something was created; run again right away
    Requeue,
    /// Something is in progress; run again after the delay
    RequeueAfter(Duration),
}

impl From<Outcome> for Action {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Done => Action::await_change(),
            Outcome::Requeue => Action::requeue(Duration::ZERO),
            Outcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

pub struct EventBrokerReconciler<S> {
    store: S,
    /// How long to wait after changing the size of a StatefulSet before looking again
    scale_requeue: Duration,
}

impl<S: EventBrokerStore> EventBrokerReconciler<S> {
    pub fn new(store: S, scale_requeue: Duration) -> Self {
        Self {
            store,
            scale_requeue,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(skip(self))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Outcome> {
        let eb = match self.store.get_event_broker(namespace, name).await {
            Ok(Some(eb)) => eb,
            Ok(None) => {
                // owned objects are garbage collected through their owner references
                info!("EventBroker {name} in namespace {namespace} not found; it must have been deleted");
                return Ok(Outcome::Done);
            }
            Err(err) => {
                error!("Failed to get EventBroker {name} in namespace {namespace}: {err}");
                return Err(err);
            }
        };
        debug!("Detected existing EventBroker {name} in namespace {namespace}");

        if let Some(outcome) = self.ensure_service(&eb, namespace).await? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.ensure_config_map(&eb, namespace).await? {
            return Ok(outcome);
        }
        let sts = match self.ensure_stateful_set(&eb, namespace, BrokerRole::Primary).await? {
            Ok(sts) => sts,
            Err(outcome) => return Ok(outcome),
        };

        if let Some(outcome) = self.ensure_size(&eb, namespace, &sts).await? {
            return Ok(outcome);
        }

        if let Err(err) = reconcile_broker_pods(&self.store, &eb, namespace).await {
            error!("Failed to update broker pods of EventBroker {name} in namespace {namespace}: {err}");
            return Err(err);
        }

        Ok(Outcome::Done)
    }

    async fn ensure_service(&self, eb: &EventBroker, namespace: &str) -> Result<Option<Outcome>> {
        let name = object_name(ObjectKind::Service, &eb.name_any());
        match self.store.get_service(namespace, &name).await {
            Ok(Some(_)) => {
                debug!("Detected existing Service {name} in namespace {namespace}");
                Ok(None)
            }
            Ok(None) => {
                let svc = broker_service(eb, &base_metadata(eb)?);
                info!("Creating a new Service {name} in namespace {namespace}");
                if let Err(err) = self.store.create_service(namespace, &svc).await {
                    error!("Failed to create new Service {name} in namespace {namespace}: {err}");
                    return Err(err);
                }
                Ok(Some(Outcome::Requeue))
            }
            Err(err) => {
                error!("Failed to get Service {name} in namespace {namespace}: {err}");
                Err(err)
            }
        }
    }

    async fn ensure_config_map(
        &self,
        eb: &EventBroker,
        namespace: &str,
    ) -> Result<Option<Outcome>> {
        let name = object_name(ObjectKind::ConfigMap, &eb.name_any());
        match self.store.get_config_map(namespace, &name).await {
            Ok(Some(_)) => {
                debug!("Detected existing ConfigMap {name} in namespace {namespace}");
                Ok(None)
            }
            Ok(None) => {
                let cm = broker_configmap(eb, &base_metadata(eb)?);
                info!("Creating a new ConfigMap {name} in namespace {namespace}");
                if let Err(err) = self.store.create_config_map(namespace, &cm).await {
                    error!("Failed to create new ConfigMap {name} in namespace {namespace}: {err}");
                    return Err(err);
                }
                Ok(Some(Outcome::Requeue))
            }
            Err(err) => {
                error!("Failed to get ConfigMap {name} in namespace {namespace}: {err}");
                Err(err)
            }
        }
    }

    /// Returns the existing StatefulSet, or the outcome of the pass if it had to be created
    async fn ensure_stateful_set(
        &self,
        eb: &EventBroker,
        namespace: &str,
        role: BrokerRole,
    ) -> Result<std::result::Result<StatefulSet, Outcome>> {
        let name = statefulset_name(&eb.name_any(), role);
        match self.store.get_stateful_set(namespace, &name).await {
            Ok(Some(sts)) => {
                debug!("Detected existing StatefulSet {name} in namespace {namespace}");
                Ok(Ok(sts))
            }
            Ok(None) => {
                let sts = broker_statefulset(eb, &base_metadata(eb)?, role);
                info!("Creating a new StatefulSet {name} in namespace {namespace}");
                if let Err(err) = self.store.create_stateful_set(namespace, &sts).await {
                    error!("Failed to create new StatefulSet {name} in namespace {namespace}: {err}");
                    return Err(err);
                }
                Ok(Err(Outcome::Requeue))
            }
            Err(err) => {
                error!("Failed to get StatefulSet {name} in namespace {namespace}: {err}");
                Err(err)
            }
        }
    }

    async fn ensure_size(
        &self,
        eb: &EventBroker,
        namespace: &str,
        sts: &StatefulSet,
    ) -> Result<Option<Outcome>> {
        let desired = eb.spec.desired_size();
        // the API server defaults unset replicas to 1
        let current = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        if current == desired {
            return Ok(None);
        }

        let name = sts.name_any();
        info!("Scaling StatefulSet {name} in namespace {namespace} from {current} to {desired} replicas");
        if let Err(err) = self.store.scale_stateful_set(namespace, &name, desired).await {
            error!("Failed to scale StatefulSet {name} in namespace {namespace}: {err}");
            return Err(err);
        }
        // give the pods time to come up before the next step
        Ok(Some(Outcome::RequeueAfter(self.scale_requeue)))
    }
}
