use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::resources::eventbrokers::EventBroker;

use super::labels::{object_labels, service_selector};
use super::naming::{object_name, ObjectKind};
use super::object_meta;

/// Ports the broker listens on, by service port name
pub const BROKER_PORTS: [(&str, i32); 7] = [
    ("tcp-semp", 8080),
    ("tcp-smf", 55555),
    ("tcp-web", 8008),
    ("tcp-amqp", 5672),
    ("tcp-mqtt", 1883),
    ("tcp-rest", 9000),
    ("tcp-ssh", 2222),
];

/// The Service routing client traffic to the active broker pod
pub fn broker_service(eb: &EventBroker, base_metadata: &ObjectMeta) -> Service {
    let deployment_name = eb.name_any();
    let mut metadata = object_meta(
        base_metadata,
        object_name(ObjectKind::Service, &deployment_name),
        object_labels(&deployment_name),
    );
    if let Some(annotations) = eb.spec.service.as_ref().and_then(|s| s.annotations.as_ref()) {
        metadata
            .annotations
            .get_or_insert_with(Default::default)
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some(eb.spec.service_type()),
            // must use the service selector so only the active pod receives traffic
            selector: Some(service_selector(&deployment_name)),
            ports: Some(
                BROKER_PORTS
                    .iter()
                    .map(|(name, port)| ServicePort {
                        name: Some((*name).into()),
                        port: *port,
                        protocol: Some("TCP".into()),
                        target_port: Some(IntOrString::Int(*port)),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}
