use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::resources::eventbrokers::EventBroker;
use crate::{Error, Result};

pub mod compute;
pub mod labels;
pub mod naming;
pub mod service;
pub mod status;

/// Metadata shared by every object owned by `eb`: its namespace and a controller owner
/// reference, so the objects are garbage collected with the EventBroker.
pub fn base_metadata(eb: &EventBroker) -> Result<ObjectMeta> {
    let oref = eb
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey(".metadata.uid"))?;

    Ok(ObjectMeta {
        namespace: eb.namespace(),
        owner_references: Some(vec![OwnerReference {
            block_owner_deletion: Some(true),
            ..oref
        }]),
        ..Default::default()
    })
}

pub fn object_meta(
    base_metadata: &ObjectMeta,
    name: impl Into<String>,
    labels: BTreeMap<String, String>,
) -> ObjectMeta {
    let mut meta = base_metadata.clone();
    meta.name = Some(name.into());
    meta.labels.get_or_insert_with(Default::default).extend(labels);
    meta
}

pub fn label_selector(labels: BTreeMap<String, String>) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels),
        match_expressions: None,
    }
}
