use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PodSecurityContext, PodSpec, PodTemplateSpec, Probe, SecurityContext, TCPSocketAction, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::resources::eventbrokers::{BrokerStorage, EventBroker};

use super::labels::{base_labels, object_labels, pod_labels};
use super::naming::{object_name, statefulset_name, BrokerRole, ObjectKind};
use super::service::BROKER_PORTS;
use super::{label_selector, object_meta};

const CONFIG_MOUNT_PATH: &str = "/mnt/disks/solace";
const DATA_MOUNT_PATH: &str = "/var/lib/solace";
const INIT_SCRIPT: &str = "init.sh";
const SEMP_PORT: i32 = 8080;

fn init_script(deployment_name: &str) -> String {
    let discovery = object_name(ObjectKind::DiscoveryService, deployment_name);
    format!(
        r#"#!/bin/bash
export service_ssh_port='2222'
export service_webtransport_port='8008'
export service_semp_port='{SEMP_PORT}'
export system_scaling_maxconnectioncount='100'
export logging_debug_output=all
export routername=$(echo $(hostname) | sed 's/-//g')
export redundancy_enable=no
export configsync_enable=no
export nodes_discovery_service='{discovery}'
"#
    )
}

/// The ConfigMap holding the broker start-up configuration
pub fn broker_configmap(eb: &EventBroker, base_metadata: &ObjectMeta) -> ConfigMap {
    let deployment_name = eb.name_any();

    ConfigMap {
        metadata: object_meta(
            base_metadata,
            object_name(ObjectKind::ConfigMap, &deployment_name),
            object_labels(&deployment_name),
        ),
        data: Some(BTreeMap::from([(
            INIT_SCRIPT.into(),
            init_script(&deployment_name),
        )])),
        ..Default::default()
    }
}

fn data_volume_claim(deployment_name: &str, storage: &BrokerStorage) -> Option<PersistentVolumeClaim> {
    let size = storage.size.as_ref()?;
    Some(PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some("data".into()),
            // volume claim template labels are immutable
            labels: Some(base_labels(deployment_name)),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            storage_class_name: storage.storage_class_name.clone(),
            access_modes: Some(vec!["ReadWriteOnce".into()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.clone()),
                )])),
                limits: None,
            }),
            ..Default::default()
        }),
        status: None,
    })
}

/// The StatefulSet running the broker pods of one role
pub fn broker_statefulset(
    eb: &EventBroker,
    base_metadata: &ObjectMeta,
    role: BrokerRole,
) -> StatefulSet {
    let deployment_name = eb.name_any();
    let name = statefulset_name(&deployment_name, role);
    let pod_labels = pod_labels(&deployment_name, role);
    let claim = eb
        .spec
        .storage
        .as_ref()
        .and_then(|s| data_volume_claim(&deployment_name, s));

    let mut volumes = vec![
        Volume {
            name: "config-map".into(),
            config_map: Some(ConfigMapVolumeSource {
                name: object_name(ObjectKind::ConfigMap, &deployment_name),
                default_mode: Some(0o755),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: "dshm".into(),
            empty_dir: Some(EmptyDirVolumeSource {
                medium: Some("Memory".into()),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];
    if claim.is_none() {
        volumes.push(Volume {
            name: "data".into(),
            empty_dir: Some(Default::default()),
            ..Default::default()
        });
    }

    let volume_mounts = vec![
        VolumeMount {
            name: "config-map".into(),
            mount_path: CONFIG_MOUNT_PATH.into(),
            ..Default::default()
        },
        VolumeMount {
            name: "dshm".into(),
            mount_path: "/dev/shm".into(),
            ..Default::default()
        },
        VolumeMount {
            name: "data".into(),
            mount_path: DATA_MOUNT_PATH.into(),
            ..Default::default()
        },
    ];

    let env = vec![
        EnvVar {
            name: "STATEFULSET_NAME".into(),
            value: Some(name.clone()),
            value_from: None,
        },
        EnvVar {
            name: "STATEFULSET_NAMESPACE".into(),
            value: None,
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.namespace".into(),
                    api_version: None,
                }),
                ..Default::default()
            }),
        },
        EnvVar {
            name: "BROKERSERVICES_NAME".into(),
            value: Some(object_name(ObjectKind::Service, &deployment_name)),
            value_from: None,
        },
    ];

    StatefulSet {
        metadata: object_meta(base_metadata, name, object_labels(&deployment_name)),
        spec: Some(StatefulSetSpec {
            replicas: Some(eb.spec.desired_size()),
            selector: label_selector(pod_labels.clone()),
            service_name: object_name(ObjectKind::DiscoveryService, &deployment_name),
            pod_management_policy: Some("Parallel".into()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "pubsubplus".into(),
                        image: Some(eb.spec.image_name()),
                        image_pull_policy: Some(eb.spec.image_pull_policy()),
                        command: Some(vec![
                            "bash".into(),
                            "-ec".into(),
                            format!("source {CONFIG_MOUNT_PATH}/{INIT_SCRIPT}\nexec /usr/sbin/boot.sh"),
                        ]),
                        env: Some(env),
                        ports: Some(
                            BROKER_PORTS
                                .iter()
                                .map(|(name, port)| ContainerPort {
                                    name: Some((*name).into()),
                                    container_port: *port,
                                    protocol: Some("TCP".into()),
                                    ..Default::default()
                                })
                                .collect(),
                        ),
                        readiness_probe: Some(Probe {
                            tcp_socket: Some(TCPSocketAction {
                                port: IntOrString::Int(SEMP_PORT),
                                host: None,
                            }),
                            initial_delay_seconds: Some(30),
                            period_seconds: Some(5),
                            ..Default::default()
                        }),
                        security_context: Some(SecurityContext {
                            privileged: Some(false),
                            allow_privilege_escalation: Some(false),
                            ..Default::default()
                        }),
                        volume_mounts: Some(volume_mounts),
                        ..Default::default()
                    }],
                    security_context: Some(PodSecurityContext {
                        run_as_user: Some(1000001),
                        fs_group: Some(1000002),
                        ..Default::default()
                    }),
                    termination_grace_period_seconds: Some(1200),
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            volume_claim_templates: claim.map(|c| vec![c]),
            ..Default::default()
        }),
        status: None,
    }
}
