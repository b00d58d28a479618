use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::core::PartialObjectMeta;
use kube::runtime::events::Recorder;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{metadata_watcher, WatchStreamExt};
use kube::{
    api::{Api, ListParams, ResourceExt},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        events::{Event, EventType},
        watcher::Config,
    },
    Resource,
};
use tokio::{sync::RwLock, time::Duration};
use tracing::*;

use crate::controllers::{Diagnostics, State};
use crate::resources::eventbrokers::EventBroker;
use crate::{telemetry, Error, Metrics, Result};

use super::reconciler::EventBrokerReconciler;
use super::reconcilers::labels::{APP_NAME, K8S_INSTANCE, K8S_MANAGED_BY, K8S_NAME, MANAGED_BY};
use super::store::{KubeStore, FIELD_MANAGER};

// Context for our reconciler
pub(super) struct Context {
    /// Drives a single EventBroker towards its desired state
    pub reconciler: EventBrokerReconciler<KubeStore>,
    /// Kubernetes event recorder
    pub recorder: Recorder,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Metrics,
    /// Delay before retrying a failed reconcile
    pub error_requeue: Duration,
}

impl Context {
    pub fn new(client: Client, metrics: Metrics, state: State) -> Arc<Context> {
        Arc::new(Context {
            reconciler: EventBrokerReconciler::new(
                KubeStore::new(client.clone()),
                state.scale_requeue,
            ),
            recorder: Recorder::new(client, FIELD_MANAGER.into()),
            diagnostics: state.diagnostics.clone(),
            metrics,
            error_requeue: state.error_requeue,
        })
    }
}

#[instrument(skip(ctx, eb), fields(trace_id))]
async fn reconcile(eb: Arc<EventBroker>, ctx: Arc<Context>) -> Result<Action> {
    if let Some(trace_id) = telemetry::get_trace_id() {
        Span::current().record("trace_id", field::display(&trace_id));
    }
    let _timer = ctx.metrics.count_and_measure::<EventBroker>();
    ctx.diagnostics.write().await.last_event = Utc::now();

    let name = eb.name_any();
    info!("Reconciling EventBroker \"{name}\"");

    let result = match eb.namespace() {
        Some(namespace) => ctx.reconciler.reconcile(&namespace, &name).await,
        None => Err(Error::MissingObjectKey(".metadata.namespace")),
    };

    match result {
        Ok(outcome) => Ok(outcome.into()),
        Err(err) => {
            warn!("reconcile failed: {:?}", err);

            ctx.metrics.reconcile_failure(eb.as_ref(), &err);

            // the reconcile error is what the error policy must see
            if let Err(publish_err) = ctx
                .recorder
                .publish(
                    &Event {
                        type_: EventType::Warning,
                        reason: "FailedReconcile".into(),
                        note: Some(err.to_string()),
                        action: "Reconcile".into(),
                        secondary: None,
                    },
                    &eb.object_ref(&()),
                )
                .await
            {
                warn!("failed to publish FailedReconcile event: {publish_err}");
            }

            Err(err)
        }
    }
}

fn error_policy(_eb: Arc<EventBroker>, _error: &Error, ctx: Arc<Context>) -> Action {
    Action::requeue(ctx.error_requeue)
}

/// Maps a broker pod to the EventBroker named by its instance label
fn pod_owner(pod: PartialObjectMeta<Pod>) -> Option<ObjectRef<EventBroker>> {
    if pod.labels().get(K8S_NAME)?.as_str() != APP_NAME {
        // should have been caught by the label selector
        return None;
    }
    let instance = pod.labels().get(K8S_INSTANCE)?;
    let namespace = pod.namespace()?;

    Some(ObjectRef::new(instance).within(&namespace))
}

/// Initialize the controller and shared state (given the crd is installed)
pub async fn run(client: Client, metrics: Metrics, state: State) {
    let eb_api = Api::<EventBroker>::all(client.clone());
    let svc_api = Api::<Service>::all(client.clone());
    let cm_api = Api::<ConfigMap>::all(client.clone());
    let ss_api = Api::<StatefulSet>::all(client.clone());
    let pod_api = Api::<Pod>::all(client.clone());

    if let Err(e) = eb_api.list(&ListParams::default().limit(1)).await {
        error!("EventBroker is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }

    // all objects we create have this label
    let owned_cfg = Config::default().labels(&format!("{K8S_MANAGED_BY}={MANAGED_BY}"));
    // pods are labelled by the statefulset template, which has no managed-by label
    let pod_cfg = Config::default().labels(&format!("{K8S_NAME}={APP_NAME}"));

    let svc_watcher = metadata_watcher(svc_api, owned_cfg.clone())
        .map(ensure_deletion_change)
        .touched_objects()
        .predicate_filter(changed_predicate);

    let cm_watcher = metadata_watcher(cm_api, owned_cfg.clone())
        .map(ensure_deletion_change)
        .touched_objects()
        .predicate_filter(changed_predicate);

    // scaling bumps the StatefulSet generation
    let ss_watcher = metadata_watcher(ss_api, owned_cfg)
        .map(ensure_deletion_change)
        .touched_objects()
        .predicate_filter(changed_predicate);

    // the active label moves between pods, so labels must be part of the hash
    let pod_watcher = metadata_watcher(pod_api, pod_cfg)
        .map(ensure_deletion_change)
        .touched_objects()
        .predicate_filter(changed_predicate);

    Controller::new(eb_api, Config::default())
        .shutdown_on_signal()
        .owns_stream(svc_watcher)
        .owns_stream(cm_watcher)
        .owns_stream(ss_watcher)
        .watches_stream(pod_watcher, pod_owner)
        .run(reconcile, error_policy, Context::new(client, metrics, state))
        .filter_map(|x| async move { Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

// deletion apparently doesn't lead to any change in metadata otherwise, which means the changed_predicate
// would drop them.
fn ensure_deletion_change<K: Resource, E>(
    mut event: Result<kube::runtime::watcher::Event<K>, E>,
) -> Result<kube::runtime::watcher::Event<K>, E> {
    if let Ok(kube::runtime::watcher::Event::Delete(ref mut object)) = event {
        let meta = object.meta_mut();
        meta.generation = match meta.generation {
            Some(val) => Some(val + 1),
            None => Some(0),
        }
    }
    event
}

fn changed_predicate<K: Resource>(obj: &K) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    if let Some(g) = obj.meta().generation {
        // covers spec but not metadata or status
        g.hash(&mut hasher)
    }
    obj.labels().hash(&mut hasher);
    obj.annotations().hash(&mut hasher);
    Some(hasher.finish())
}
