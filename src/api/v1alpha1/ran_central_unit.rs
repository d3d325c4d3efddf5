use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{conditions_schema, CniType, IdentitySource};

pub static RAN_CENTRAL_UNIT_FINALIZER: &str = "ran-central-unit.ran.oai.io";

/// Generate the Kubernetes wrapper struct `RanCentralUnit` from our Spec and Status struct
///
/// Values are kept raw so that an invalid configuration still reaches the
/// operator and is reported as a blocked status instead of being dropped by
/// the API server.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(kind = "RanCentralUnit", group = "ran.oai.io", version = "v1alpha1", namespaced)]
#[kube(status = "RanCentralUnitStatus", shortname = "rancu")]
#[serde(rename_all = "camelCase")]
pub struct RanCentralUnitSpec {
    #[serde(default)]
    pub cni_type: CniType,
    #[serde(default)]
    pub identity_source: IdentitySource,

    #[serde(default = "default_f1_interface_name")]
    pub f1_interface_name: String,
    #[serde(default = "default_f1_ip_address")]
    pub f1_ip_address: String,
    #[serde(default = "default_f1_port")]
    pub f1_port: i64,

    #[serde(default = "default_n2_interface_name")]
    pub n2_interface_name: String,
    #[serde(default = "default_n2_ip_address")]
    pub n2_ip_address: String,

    #[serde(default = "default_n3_interface_name")]
    pub n3_interface_name: String,
    #[serde(default = "default_n3_ip_address")]
    pub n3_ip_address: String,
    #[serde(default = "default_n3_gateway_ip")]
    pub n3_gateway_ip: String,
    #[serde(default = "default_upf_subnet")]
    pub upf_subnet: String,

    #[serde(default = "default_mcc")]
    pub mcc: String,
    #[serde(default = "default_mnc")]
    pub mnc: String,
    #[serde(default = "default_sst")]
    pub sst: i64,
    pub sd: Option<i64>,
    #[serde(default = "default_tac")]
    pub tac: i64,

    /// StatefulSet running the CU workload, defaults to the resource name
    pub stateful_set_name: Option<String>,
    #[serde(default = "default_container_name")]
    pub container_name: String,
}

fn default_f1_interface_name() -> String {
    "f1".to_string()
}
fn default_f1_ip_address() -> String {
    "192.168.251.7/24".to_string()
}
fn default_f1_port() -> i64 {
    2153
}
fn default_n2_interface_name() -> String {
    "n2".to_string()
}
fn default_n2_ip_address() -> String {
    "192.168.253.6/24".to_string()
}
fn default_n3_interface_name() -> String {
    "n3".to_string()
}
fn default_n3_ip_address() -> String {
    "192.168.251.6/24".to_string()
}
fn default_n3_gateway_ip() -> String {
    "192.168.251.1".to_string()
}
fn default_upf_subnet() -> String {
    "192.168.252.0/24".to_string()
}
fn default_mcc() -> String {
    "001".to_string()
}
fn default_mnc() -> String {
    "01".to_string()
}
fn default_sst() -> i64 {
    1
}
fn default_tac() -> i64 {
    1
}
fn default_container_name() -> String {
    "cu".to_string()
}

impl Default for RanCentralUnitSpec {
    fn default() -> Self {
        Self {
            cni_type: CniType::default(),
            identity_source: IdentitySource::default(),
            f1_interface_name: default_f1_interface_name(),
            f1_ip_address: default_f1_ip_address(),
            f1_port: default_f1_port(),
            n2_interface_name: default_n2_interface_name(),
            n2_ip_address: default_n2_ip_address(),
            n3_interface_name: default_n3_interface_name(),
            n3_ip_address: default_n3_ip_address(),
            n3_gateway_ip: default_n3_gateway_ip(),
            upf_subnet: default_upf_subnet(),
            mcc: default_mcc(),
            mnc: default_mnc(),
            sst: default_sst(),
            sd: None,
            tac: default_tac(),
            stateful_set_name: None,
            container_name: default_container_name(),
        }
    }
}

/// The status object of `RanCentralUnit`
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RanCentralUnitStatus {
    #[schemars(schema_with = "conditions_schema")]
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// One of Active, Waiting or Blocked
    pub state: Option<String>,
    pub message: Option<String>,
    pub workload_version: Option<String>,
    pub last_trigger: Option<String>,

    pub observed_generation: Option<i64>,
    /// Relation id to the version of its data last seen by the operator
    #[serde(default)]
    pub observed_relations: BTreeMap<String, String>,
    #[serde(default)]
    pub container_ready: bool,
}

impl RanCentralUnit {
    /// Application name used on relations and in the gNB name
    pub fn app_name(&self) -> String {
        self.name_any()
    }

    pub fn stateful_set_name(&self) -> String {
        self.spec
            .stateful_set_name
            .clone()
            .unwrap_or_else(|| self.name_any())
    }

    /// Name of the first (and only) pod of the StatefulSet
    pub fn pod_name(&self) -> String {
        format!("{}-0", self.stateful_set_name())
    }
}
