//! Secondary network interfaces of the CU pod.
//!
//! Each interface (F1, N2, N3) is described by one Multus
//! `NetworkAttachmentDefinition` and attached through the pod template
//! annotation.

use async_trait::async_trait;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::api::v1alpha1::CniType;
use crate::config::CuConfig;
use crate::util::errors::{Result, StdError};

pub mod multus;

pub use multus::MultusClient;

pub const CNI_VERSION: &str = "0.3.1";
pub const NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

/// Multus network attachment definition
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "k8s.cni.cncf.io",
    version = "v1",
    kind = "NetworkAttachmentDefinition",
    plural = "network-attachment-definitions",
    namespaced
)]
pub struct NetworkAttachmentDefinitionSpec {
    pub config: String,
}

/// Driver block of a CNI config; only the fields the plugin needs
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CniDriver {
    Macvlan { master: String },
    Bridge { bridge: String },
    HostDevice { device: String },
}

impl CniDriver {
    pub fn for_interface(cni_type: CniType, interface: &str) -> Self {
        match cni_type {
            CniType::Macvlan => CniDriver::Macvlan {
                master: interface.to_string(),
            },
            CniType::Bridge => CniDriver::Bridge {
                bridge: format!("{interface}-br"),
            },
            CniType::HostDevice => CniDriver::HostDevice {
                device: interface.to_string(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IpamAddress {
    pub address: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub mac: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Ipam {
    #[serde(rename = "type")]
    pub type_: String,
    pub addresses: Vec<IpamAddress>,
    pub capabilities: Capabilities,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub dst: String,
    pub gw: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CniConfig {
    pub cni_version: String,
    #[serde(flatten)]
    pub driver: CniDriver,
    pub ipam: Ipam,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
}

impl CniConfig {
    fn new(address: String, driver: CniDriver) -> Self {
        CniConfig {
            cni_version: CNI_VERSION.to_string(),
            driver,
            ipam: Ipam {
                type_: "static".to_string(),
                addresses: vec![IpamAddress { address }],
                capabilities: Capabilities { mac: true },
            },
            routes: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NetworkAnnotation {
    pub name: String,
    pub interface: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub name: String,
    pub config: CniConfig,
}

impl NetworkAttachment {
    pub fn definition(&self) -> Result<NetworkAttachmentDefinition> {
        let config = serde_json::to_string(&self.config).map_err(StdError::JsonSerializationError)?;
        Ok(NetworkAttachmentDefinition::new(
            &self.name,
            NetworkAttachmentDefinitionSpec { config },
        ))
    }
}

/// Desired attachments and pod annotation for one configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkPlan {
    pub attachments: Vec<NetworkAttachment>,
    pub annotations: Vec<NetworkAnnotation>,
}

impl NetworkPlan {
    pub fn from_config(config: &CuConfig) -> Self {
        let attachment = |interface: &str, address: String| NetworkAttachment {
            name: network_name(interface),
            config: CniConfig::new(address, CniDriver::for_interface(config.cni_type, interface)),
        };

        let mut n3 = attachment(&config.n3_interface_name, config.n3_ip_address.to_string());
        n3.config.routes.push(Route {
            dst: config.upf_subnet.to_string(),
            gw: config.n3_gateway_ip.to_string(),
        });
        let f1 = attachment(&config.f1_interface_name, config.f1_ip_address.to_string());
        let n2 = attachment(&config.n2_interface_name, config.n2_ip_address.to_string());

        let annotations = [
            &config.n3_interface_name,
            &config.n2_interface_name,
            &config.f1_interface_name,
        ]
        .into_iter()
        .map(|interface| NetworkAnnotation {
            name: network_name(interface),
            interface: interface.clone(),
        })
        .collect();

        NetworkPlan {
            attachments: vec![n3, f1, n2],
            annotations,
        }
    }

    /// Value of the pod template networks annotation
    pub fn annotation_value(&self) -> Result<String> {
        serde_json::to_string(&self.annotations).map_err(|e| StdError::JsonSerializationError(e).into())
    }
}

fn network_name(interface: &str) -> String {
    format!("{interface}-net")
}

/// Cluster network plugin that realises the attachments
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkAttachments: Send + Sync {
    /// Whether the plugin is installed in the cluster
    async fn available(&self) -> Result<bool>;

    /// Whether the cluster already reflects `plan`
    async fn ready(&self, plan: &NetworkPlan) -> Result<bool>;

    async fn reconcile(&self, plan: &NetworkPlan) -> Result<()>;

    /// Deletes every attachment created for this unit
    async fn remove(&self) -> Result<()>;
}
