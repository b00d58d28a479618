//! Canonical names of the objects belonging to an EventBroker deployment.
//!
//! Every name is `<deployment name><kind suffix>`. The suffixes are fixed, so an object's
//! name alone is enough to find it again on a later reconcile.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Placeholder in the StatefulSet suffix that is replaced by the role suffix.
const ROLE_PLACEHOLDER: &str = "%s";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    ConfigMap,
    DiscoveryService,
    Role,
    RoleBinding,
    ServiceAccount,
    Secret,
    Service,
    StatefulSet,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 8] = [
        ObjectKind::ConfigMap,
        ObjectKind::DiscoveryService,
        ObjectKind::Role,
        ObjectKind::RoleBinding,
        ObjectKind::ServiceAccount,
        ObjectKind::Secret,
        ObjectKind::Service,
        ObjectKind::StatefulSet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::DiscoveryService => "DiscoveryService",
            ObjectKind::Role => "Role",
            ObjectKind::RoleBinding => "RoleBinding",
            ObjectKind::ServiceAccount => "ServiceAccount",
            ObjectKind::Secret => "Secret",
            ObjectKind::Service => "Service",
            ObjectKind::StatefulSet => "StatefulSet",
        }
    }

    /// The suffix appended to the deployment name. The StatefulSet suffix is a template
    /// that still carries the role placeholder.
    pub fn name_suffix(self) -> &'static str {
        match self {
            ObjectKind::ConfigMap => "-pubsubplus",
            ObjectKind::DiscoveryService => "-pubsubplus-discovery",
            ObjectKind::Role => "-pubsubplus-podtagupdater",
            ObjectKind::RoleBinding => "-pubsubplus-sa-to-podtagupdater",
            ObjectKind::ServiceAccount => "-pubsubplus-sa",
            ObjectKind::Secret => "-pubsubplus-secrets",
            ObjectKind::Service => "-pubsubplus",
            ObjectKind::StatefulSet => "-pubsubplus-%s",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownKind(s.into()))
    }
}

/// The functional role of a broker StatefulSet, encoded as the last character of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerRole {
    Primary,
    Backup,
    Monitor,
}

impl BrokerRole {
    pub fn suffix(self) -> &'static str {
        match self {
            BrokerRole::Primary => "p",
            BrokerRole::Backup => "b",
            BrokerRole::Monitor => "m",
        }
    }

    /// Value of the `node-type` pod label
    pub fn node_type(self) -> &'static str {
        match self {
            BrokerRole::Primary => "message-routing-primary",
            BrokerRole::Backup => "message-routing-backup",
            BrokerRole::Monitor => "monitor",
        }
    }

    pub fn from_suffix(suffix: &str) -> Result<Self> {
        match suffix {
            "p" => Ok(BrokerRole::Primary),
            "b" => Ok(BrokerRole::Backup),
            "m" => Ok(BrokerRole::Monitor),
            other => Err(Error::UnknownRole(other.into())),
        }
    }
}

/// Name of the object of `kind` for the deployment `deployment_name`.
pub fn object_name(kind: ObjectKind, deployment_name: &str) -> String {
    format!("{deployment_name}{}", kind.name_suffix())
}

/// Same as [`object_name`] for a kind given by name, as found in manifests and logs.
pub fn object_name_for(kind: &str, deployment_name: &str) -> Result<String> {
    Ok(object_name(kind.parse()?, deployment_name))
}

pub fn statefulset_name(deployment_name: &str, role: BrokerRole) -> String {
    object_name(ObjectKind::StatefulSet, deployment_name).replace(ROLE_PLACEHOLDER, role.suffix())
}

/// Recovers the broker role from a StatefulSet name produced by [`statefulset_name`].
pub fn broker_node_type(statefulset_name: &str) -> Result<BrokerRole> {
    let last = statefulset_name
        .chars()
        .last()
        .map(String::from)
        .unwrap_or_default();
    BrokerRole::from_suffix(&last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_append_the_kind_suffix() {
        let cases = [
            (ObjectKind::ConfigMap, "sample-pubsubplus"),
            (ObjectKind::DiscoveryService, "sample-pubsubplus-discovery"),
            (ObjectKind::Role, "sample-pubsubplus-podtagupdater"),
            (ObjectKind::RoleBinding, "sample-pubsubplus-sa-to-podtagupdater"),
            (ObjectKind::ServiceAccount, "sample-pubsubplus-sa"),
            (ObjectKind::Secret, "sample-pubsubplus-secrets"),
            (ObjectKind::Service, "sample-pubsubplus"),
            (ObjectKind::StatefulSet, "sample-pubsubplus-%s"),
        ];

        for (kind, expected) in cases {
            assert_eq!(object_name(kind, "sample"), expected, "{kind}");
            // deterministic across calls
            assert_eq!(object_name(kind, "sample"), object_name(kind, "sample"));
        }
    }

    #[test]
    fn object_name_for_parses_kind_names() {
        for kind in ObjectKind::ALL {
            assert_eq!(
                object_name_for(kind.as_str(), "eb").unwrap(),
                object_name(kind, "eb")
            );
        }
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let err = object_name_for("Deployment", "sample").unwrap_err();
        assert!(matches!(err, Error::UnknownKind(kind) if kind == "Deployment"));
    }

    #[test]
    fn statefulset_name_substitutes_the_role() {
        for role in [BrokerRole::Primary, BrokerRole::Backup, BrokerRole::Monitor] {
            assert_eq!(
                statefulset_name("sample", role),
                object_name(ObjectKind::StatefulSet, "sample").replace("%s", role.suffix())
            );
        }
        assert_eq!(
            statefulset_name("sample", BrokerRole::Primary),
            "sample-pubsubplus-p"
        );
    }

    #[test]
    fn broker_node_type_reads_the_last_character() {
        assert_eq!(
            broker_node_type("sample-pubsubplus-p").unwrap().node_type(),
            "message-routing-primary"
        );
        assert_eq!(
            broker_node_type("sample-pubsubplus-b").unwrap().node_type(),
            "message-routing-backup"
        );
        assert_eq!(
            broker_node_type("sample-pubsubplus-m").unwrap().node_type(),
            "monitor"
        );
    }

    #[test]
    fn broker_node_type_rejects_unknown_suffixes() {
        assert!(matches!(
            broker_node_type("sample-pubsubplus-x"),
            Err(Error::UnknownRole(s)) if s == "x"
        ));
        assert!(matches!(broker_node_type(""), Err(Error::UnknownRole(s)) if s.is_empty()));
    }

    #[test]
    fn role_round_trips_through_its_suffix() {
        for role in [BrokerRole::Primary, BrokerRole::Backup, BrokerRole::Monitor] {
            assert_eq!(BrokerRole::from_suffix(role.suffix()).unwrap(), role);
        }
    }
}
