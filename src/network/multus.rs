use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::json;
use tracing::info;

use super::{NetworkAttachmentDefinition, NetworkAttachments, NetworkPlan, NETWORKS_ANNOTATION};
use crate::util::errors::{Error, Result, StdError};

pub const MULTUS_CRD_NAME: &str = "network-attachment-definitions.k8s.cni.cncf.io";
pub const NAD_OWNER_LABEL: &str = "ran.oai.io/central-unit";
const FIELD_MANAGER: &str = "ran-cu-operator";
const NET_ADMIN: &str = "NET_ADMIN";

/// Multus backed attachments for the pod template of one StatefulSet
pub struct MultusClient {
    client: Client,
    namespace: String,
    owner: String,
    stateful_set: String,
    container: String,
}

impl MultusClient {
    pub fn new(client: Client, namespace: &str, owner: &str, stateful_set: &str, container: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            owner: owner.to_string(),
            stateful_set: stateful_set.to_string(),
            container: container.to_string(),
        }
    }

    fn definitions(&self) -> Api<NetworkAttachmentDefinition> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn stateful_sets(&self) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn owner_selector(&self) -> String {
        format!("{}={}", NAD_OWNER_LABEL, self.owner)
    }

    async fn owned_definitions(&self) -> Result<Vec<NetworkAttachmentDefinition>> {
        let list = self
            .definitions()
            .list(&ListParams::default().labels(&self.owner_selector()))
            .await
            .map_err(|e| Error::StdError(StdError::KubeError(e)))?;
        Ok(list.items)
    }

    async fn delete_definition(&self, name: &str) -> Result<()> {
        match self.definitions().delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted NetworkAttachmentDefinition '{}'", name);
                Ok(())
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(Error::StdError(StdError::KubeError(e))),
        }
    }
}

/// Config strings are compared as JSON so key order does not matter.
pub fn definition_matches(existing: &NetworkAttachmentDefinition, desired: &NetworkAttachmentDefinition) -> bool {
    let parse = |config: &str| serde_json::from_str::<serde_json::Value>(config).ok();
    match (parse(&existing.spec.config), parse(&desired.spec.config)) {
        (Some(existing), Some(desired)) => existing == desired,
        _ => false,
    }
}

/// Only definitions carrying the owner label are cleaned up on removal.
pub fn owned_by(definition: &NetworkAttachmentDefinition, owner: &str) -> bool {
    definition.labels().get(NAD_OWNER_LABEL).map(String::as_str) == Some(owner)
}

/// Whether the pod template carries the networks annotation and NET_ADMIN on `container`.
pub fn template_matches(stateful_set: &StatefulSet, container: &str, annotation: &str) -> bool {
    let Some(template) = stateful_set.spec.as_ref().map(|spec| &spec.template) else {
        return false;
    };
    let annotated = template
        .metadata
        .as_ref()
        .and_then(|meta| meta.annotations.as_ref())
        .and_then(|annotations| annotations.get(NETWORKS_ANNOTATION))
        .and_then(|current| serde_json::from_str::<serde_json::Value>(current).ok())
        == serde_json::from_str::<serde_json::Value>(annotation).ok();

    let net_admin = template
        .spec
        .as_ref()
        .and_then(|spec| spec.containers.iter().find(|c| c.name == container))
        .and_then(|c| c.security_context.as_ref())
        .and_then(|sc| sc.capabilities.as_ref())
        .and_then(|caps| caps.add.as_ref())
        .is_some_and(|add| add.iter().any(|cap| cap == NET_ADMIN));

    annotated && net_admin
}

#[async_trait]
impl NetworkAttachments for MultusClient {
    async fn available(&self) -> Result<bool> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        match crds.get(MULTUS_CRD_NAME).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(false),
            Err(e) => Err(Error::StdError(StdError::KubeError(e))),
        }
    }

    async fn ready(&self, plan: &NetworkPlan) -> Result<bool> {
        let definitions = self.definitions();
        for attachment in &plan.attachments {
            let desired = attachment.definition()?;
            match definitions.get(&attachment.name).await {
                Ok(existing) if definition_matches(&existing, &desired) => {}
                Ok(_) => return Ok(false),
                Err(kube::Error::Api(api_err)) if api_err.code == 404 => return Ok(false),
                Err(e) => return Err(Error::StdError(StdError::KubeError(e))),
            }
        }

        match self.stateful_sets().get(&self.stateful_set).await {
            Ok(stateful_set) => Ok(template_matches(&stateful_set, &self.container, &plan.annotation_value()?)),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(false),
            Err(e) => Err(Error::StdError(StdError::KubeError(e))),
        }
    }

    async fn reconcile(&self, plan: &NetworkPlan) -> Result<()> {
        let definitions = self.definitions();
        for attachment in &plan.attachments {
            let mut desired = attachment.definition()?;
            desired
                .labels_mut()
                .insert(NAD_OWNER_LABEL.to_string(), self.owner.clone());

            let up_to_date = match definitions.get(&attachment.name).await {
                Ok(existing) => definition_matches(&existing, &desired) && owned_by(&existing, &self.owner),
                Err(kube::Error::Api(api_err)) if api_err.code == 404 => false,
                Err(e) => return Err(Error::StdError(StdError::KubeError(e))),
            };
            if up_to_date {
                continue;
            }
            info!("Applying NetworkAttachmentDefinition '{}'", attachment.name);
            definitions
                .patch(
                    &attachment.name,
                    &PatchParams::apply(FIELD_MANAGER).force(),
                    &Patch::Apply(&desired),
                )
                .await
                .map_err(|e| Error::StdError(StdError::KubeError(e)))?;
        }

        for stale in self.owned_definitions().await? {
            let name = stale.name_any();
            if !plan.attachments.iter().any(|a| a.name == name) {
                self.delete_definition(&name).await?;
            }
        }

        let annotation = plan.annotation_value()?;
        let stateful_sets = self.stateful_sets();
        let stateful_set = stateful_sets
            .get(&self.stateful_set)
            .await
            .map_err(|e| Error::StdError(StdError::KubeError(e)))?;
        if template_matches(&stateful_set, &self.container, &annotation) {
            return Ok(());
        }

        info!("Patching StatefulSet '{}' with network annotations", self.stateful_set);
        let patch = json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": { NETWORKS_ANNOTATION: annotation }
                    },
                    "spec": {
                        "containers": [{
                            "name": self.container,
                            "securityContext": {
                                "capabilities": { "add": [NET_ADMIN] }
                            }
                        }]
                    }
                }
            }
        });
        stateful_sets
            .patch(&self.stateful_set, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .map_err(|e| Error::StdError(StdError::KubeError(e)))?;
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        for definition in self.owned_definitions().await? {
            self.delete_definition(&definition.name_any()).await?;
        }
        Ok(())
    }
}
