//! Relation data exchanged with peer applications.
//!
//! A relation is a ConfigMap labelled with its endpoint and with the names of
//! the provider and requirer applications. Each side owns the keys carrying its
//! role as prefix (`provider.amf_hostname`, `requirer.f1_port`, ...).

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client, ResourceExt,
};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::util::errors::{Error, Result, StdError};

pub mod core_gnb;
pub mod f1;
pub mod gnb_identity;
pub mod n2;
pub mod plmn;

pub use plmn::PlmnConfig;

pub const RELATION_ENDPOINT_LABEL: &str = "relation.ran.oai.io/endpoint";
pub const RELATION_PROVIDER_LABEL: &str = "relation.ran.oai.io/provider";
pub const RELATION_REQUIRER_LABEL: &str = "relation.ran.oai.io/requirer";

/// Side of a relation played by this application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Provider,
    Requirer,
}

impl Role {
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Role::Provider => "provider.",
            Role::Requirer => "requirer.",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Provider => RELATION_PROVIDER_LABEL,
            Role::Requirer => RELATION_REQUIRER_LABEL,
        }
    }

    pub fn remote(&self) -> Role {
        match self {
            Role::Provider => Role::Requirer,
            Role::Requirer => Role::Provider,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Provider => write!(f, "provider"),
            Role::Requirer => write!(f, "requirer"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Relation {
    pub id: String,
    pub endpoint: String,
    pub role: Option<Role>,
    pub remote_app: Option<String>,
    /// Changes whenever either side writes
    pub version: Option<String>,
    pub local_app_data: BTreeMap<String, String>,
    pub remote_app_data: BTreeMap<String, String>,
}

impl Relation {
    /// Splits the ConfigMap data into the local and remote application bags.
    pub fn from_config_map(config_map: &ConfigMap, role: Role) -> Relation {
        let labels = config_map.labels();
        let mut local_app_data = BTreeMap::new();
        let mut remote_app_data = BTreeMap::new();
        for (key, value) in config_map.data.clone().unwrap_or_default() {
            if let Some(field) = key.strip_prefix(role.key_prefix()) {
                local_app_data.insert(field.to_string(), value);
            } else if let Some(field) = key.strip_prefix(role.remote().key_prefix()) {
                remote_app_data.insert(field.to_string(), value);
            }
        }

        Relation {
            id: config_map.name_any(),
            endpoint: labels.get(RELATION_ENDPOINT_LABEL).cloned().unwrap_or_default(),
            role: Some(role),
            remote_app: labels.get(role.remote().label()).cloned(),
            version: config_map.resource_version(),
            local_app_data,
            remote_app_data,
        }
    }
}

/// Transport of relation data bags
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Relations of `endpoint` where this application plays `role`
    async fn relations(&self, endpoint: &str, role: Role) -> Result<Vec<Relation>>;

    /// Replaces the local application bag of `relation` with `data`
    async fn update_local_app_data(
        &self,
        relation: &Relation,
        data: BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Writes the same local data to every relation, failing when there is none.
pub async fn publish(
    store: &dyn RelationStore,
    endpoint: &str,
    relations: &[Relation],
    data: &BTreeMap<String, String>,
) -> Result<()> {
    if relations.is_empty() {
        return Err(Error::StdError(StdError::RelationNotCreated(format!(
            "Relation {endpoint} not created yet."
        ))));
    }
    for relation in relations {
        if relation_has_data(relation, data) {
            debug!("Relation {} already carries the published data", relation.id);
            continue;
        }
        store.update_local_app_data(relation, data.clone()).await?;
        info!("Published {:?} on relation {}", data.keys().collect::<Vec<_>>(), relation.id);
    }
    Ok(())
}

fn relation_has_data(relation: &Relation, data: &BTreeMap<String, String>) -> bool {
    relation.local_app_data == *data
}

/// Merge patch setting the local bag to `data`; keys no longer published are nulled.
pub fn local_bag_patch(role: Role, current: &BTreeMap<String, String>, data: &BTreeMap<String, String>) -> Value {
    let mut bag = Map::new();
    for key in current.keys().filter(|key| !data.contains_key(*key)) {
        bag.insert(format!("{}{}", role.key_prefix(), key), Value::Null);
    }
    for (key, value) in data {
        bag.insert(format!("{}{}", role.key_prefix(), key), Value::String(value.clone()));
    }
    json!({ "data": bag })
}

/// ConfigMap backed relation store
pub struct ConfigMapRelationStore {
    client: Client,
    namespace: String,
    app_name: String,
}

impl ConfigMapRelationStore {
    pub fn new(client: Client, namespace: &str, app_name: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            app_name: app_name.to_string(),
        }
    }
}

#[async_trait]
impl RelationStore for ConfigMapRelationStore {
    async fn relations(&self, endpoint: &str, role: Role) -> Result<Vec<Relation>> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let selector = format!(
            "{}={},{}={}",
            RELATION_ENDPOINT_LABEL,
            endpoint,
            role.label(),
            self.app_name
        );
        let list = config_maps
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| Error::StdError(StdError::KubeError(e)))?;

        let mut relations: Vec<Relation> = list
            .items
            .iter()
            .map(|config_map| Relation::from_config_map(config_map, role))
            .collect();
        relations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(relations)
    }

    async fn update_local_app_data(
        &self,
        relation: &Relation,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        let role = relation.role.ok_or_else(|| {
            Error::StdError(StdError::InvalidRelationData(format!(
                "relation {} has no local role",
                relation.id
            )))
        })?;
        let patch = local_bag_patch(role, &relation.local_app_data, &data);

        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        config_maps
            .patch(
                &relation.id,
                &PatchParams::default(),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| Error::StdError(StdError::KubeError(e)))?;
        Ok(())
    }
}
