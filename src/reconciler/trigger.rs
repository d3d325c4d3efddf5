use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::api::v1alpha1::RanCentralUnit;

/// What woke the reconciler up
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Trigger {
    ConfigChanged,
    RelationChanged,
    ContainerReady,
    PeriodicCheck,
    Removed,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Compares what is seen now with what the last pass recorded in the status.
///
/// Deletion wins, then a new generation, then changed relation data, then the
/// container becoming ready.
pub fn classify(
    cu: &RanCentralUnit,
    relation_versions: &BTreeMap<String, String>,
    container_ready: bool,
) -> Trigger {
    if cu.metadata.deletion_timestamp.is_some() {
        return Trigger::Removed;
    }
    let Some(status) = cu.status.as_ref() else {
        return Trigger::ConfigChanged;
    };
    if cu.metadata.generation != status.observed_generation {
        return Trigger::ConfigChanged;
    }
    if &status.observed_relations != relation_versions {
        return Trigger::RelationChanged;
    }
    if container_ready && !status.container_ready {
        return Trigger::ContainerReady;
    }
    Trigger::PeriodicCheck
}
