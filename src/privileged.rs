//! Runs the workload container of the StatefulSet in privileged mode.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::{
    api::{Api, Patch, PatchParams},
    Client,
};
use serde_json::json;
use tracing::info;

use crate::util::errors::{Error, Result, StdError};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrivilegedPatcher: Send + Sync {
    async fn is_patched(&self, container: &str) -> Result<bool>;

    async fn patch(&self, container: &str) -> Result<()>;
}

pub struct StatefulSetPatcher {
    client: Client,
    namespace: String,
    stateful_set: String,
}

impl StatefulSetPatcher {
    pub fn new(client: Client, namespace: &str, stateful_set: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            stateful_set: stateful_set.to_string(),
        }
    }
}

pub fn container_is_privileged(stateful_set: &StatefulSet, container: &str) -> bool {
    stateful_set
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod| pod.containers.iter().find(|c| c.name == container))
        .and_then(|c| c.security_context.as_ref())
        .and_then(|sc| sc.privileged)
        .unwrap_or(false)
}

#[async_trait]
impl PrivilegedPatcher for StatefulSetPatcher {
    async fn is_patched(&self, container: &str) -> Result<bool> {
        let stateful_sets: Api<StatefulSet> = Api::namespaced(self.client.clone(), &self.namespace);
        match stateful_sets.get(&self.stateful_set).await {
            Ok(stateful_set) => Ok(container_is_privileged(&stateful_set, container)),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(false),
            Err(e) => Err(Error::StdError(StdError::KubeError(e))),
        }
    }

    async fn patch(&self, container: &str) -> Result<()> {
        let stateful_sets: Api<StatefulSet> = Api::namespaced(self.client.clone(), &self.namespace);
        let patch = json!({
            "spec": {
                "template": {
                    "spec": {
                        "containers": [{
                            "name": container,
                            "securityContext": { "privileged": true }
                        }]
                    }
                }
            }
        });
        stateful_sets
            .patch(&self.stateful_set, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .map_err(|e| Error::StdError(StdError::KubeError(e)))?;
        info!("Container '{}' of StatefulSet '{}' set privileged", container, self.stateful_set);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_named_container_counts() {
        let stateful_set: StatefulSet = serde_json::from_value(json!({
            "metadata": {"name": "oai-ran-cu"},
            "spec": {
                "selector": {},
                "serviceName": "oai-ran-cu",
                "template": {"spec": {"containers": [
                    {"name": "charm"},
                    {"name": "cu", "securityContext": {"privileged": true}}
                ]}}
            }
        }))
        .unwrap();
        assert!(container_is_privileged(&stateful_set, "cu"));
        assert!(!container_is_privileged(&stateful_set, "charm"));
        assert!(!container_is_privileged(&StatefulSet::default(), "cu"));
    }
}
