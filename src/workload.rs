//! The CU workload container and the Pebble supervisor running inside it.

use std::collections::BTreeMap;
use std::net::IpAddr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::util::errors::Result;

pub mod pebble;

pub use pebble::PebbleWorkload;

pub const BASE_CONFIG_PATH: &str = "/tmp/conf";
pub const CONFIG_FILE_PATH: &str = "/tmp/conf/cu.conf";
pub const WORKLOAD_VERSION_FILE_NAME: &str = "/etc/workload-version";
pub const SERVICE_NAME: &str = "cu";
pub const ROUTE_EXEC_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Service {
    #[serde(rename = "override")]
    pub override_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<String>,
    pub command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Layer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

/// Combined view of every layer, as reported by `pebble plan`
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

/// Layer running `nr-softmodem` against the rendered configuration
pub fn cu_layer() -> Layer {
    let service = Service {
        override_: "replace".to_string(),
        summary: None,
        startup: Some("enabled".to_string()),
        command: format!("/opt/oai-gnb/bin/nr-softmodem -O {CONFIG_FILE_PATH} --sa"),
        environment: BTreeMap::from([
            ("OAI_GDBSTACKS".to_string(), "1".to_string()),
            ("TZ".to_string(), "UTC".to_string()),
        ]),
    };
    Layer {
        summary: None,
        services: BTreeMap::from([(SERVICE_NAME.to_string(), service)]),
    }
}

/// Handle on the workload container
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Workload: Send + Sync {
    async fn can_connect(&self) -> Result<bool>;

    async fn pod_ip(&self) -> Result<Option<IpAddr>>;

    async fn exists(&self, path: &str) -> Result<bool>;

    async fn pull(&self, path: &str) -> Result<String>;

    async fn push(&self, path: &str, content: &str) -> Result<()>;

    async fn plan(&self) -> Result<Plan>;

    async fn add_layer(&self, label: &str, layer: &Layer) -> Result<()>;

    async fn replan(&self) -> Result<()>;

    async fn restart(&self, service: &str) -> Result<()>;

    /// Runs `command`, failing on a non-zero exit or when `timeout` expires.
    async fn exec(
        &self,
        command: Vec<String>,
        timeout: Duration,
        env: BTreeMap<String, String>,
    ) -> Result<(String, String)>;
}
