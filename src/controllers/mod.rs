use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{sync::RwLock, time::Duration};

pub mod eventbroker;

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
        }
    }
}

/// State shared between the controller and the web server
#[derive(Clone)]
pub struct State {
    /// Diagnostics populated by the reconciler
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    pub registry: prometheus::Registry,

    /// How long to wait before retrying a failed reconcile
    error_requeue: Duration,
    /// How long to wait after scaling a StatefulSet before checking it again
    scale_requeue: Duration,
}

impl Default for State {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(60))
    }
}

/// State wrapper around the controller outputs for the web server
impl State {
    pub fn new(error_requeue: Duration, scale_requeue: Duration) -> Self {
        Self {
            diagnostics: Arc::new(RwLock::new(Diagnostics::default())),
            registry: prometheus::Registry::default(),
            error_requeue,
            scale_requeue,
        }
    }

    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metrics;

    #[tokio::test]
    async fn diagnostics_serialize_the_last_event() {
        let state = State::default();
        let value = serde_json::to_value(state.diagnostics().await).unwrap();
        assert!(value["last_event"].is_string());
    }

    #[test]
    fn registered_metrics_are_gathered() {
        let state = State::default();
        let metrics = Metrics::default().register(&state.registry).unwrap();
        metrics.reconciliations.inc();

        let names: Vec<_> = state.metrics().iter().map(|m| m.get_name().to_string()).collect();
        assert!(names.contains(&"pubsubplus_operator_reconciliations_total".to_string()));
    }
}
