use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod ran_central_unit;

pub use ran_central_unit::*;

pub const API_GROUP: &str = "ran.oai.io";
pub const API_VERSION: &str = "ran.oai.io/v1alpha1";

/// CNI plugin used for the F1, N2 and N3 attachments.
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CniType {
    #[default]
    Bridge,
    Macvlan,
    HostDevice,
}

/// Where the tracking area code and PLMNs come from.
///
/// `Config` takes them from the resource spec and announces the gNB on the
/// `fiveg_gnb_identity` relation. `Core` receives them from the core network
/// over the `fiveg_core_gnb` relation and additionally manages the N3 route.
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum IdentitySource {
    #[default]
    Config,
    Core,
}

pub fn conditions_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    serde_json::from_value(serde_json::json!({
        "type": "array",
        "x-kubernetes-list-type": "map",
        "x-kubernetes-list-map-keys": ["type"],
        "items": {
            "type": "object",
            "properties": {
                "lastTransitionTime": { "format": "date-time", "type": "string" },
                "message": { "type": "string" },
                "observedGeneration": { "type": "integer", "format": "int64", "default": 0 },
                "reason": { "type": "string" },
                "status": { "type": "string" },
                "type": { "type": "string" }
            },
            "required": [
                "lastTransitionTime",
                "message",
                "reason",
                "status",
                "type"
            ],
        },
    }))
    .unwrap()
}
