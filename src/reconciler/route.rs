//! Static route from the N3 interface towards the UPF subnet.

use std::collections::BTreeMap;

use tokio::time::Duration;
use tracing::{info, warn};

use crate::config::CuConfig;
use crate::workload::{Workload, ROUTE_EXEC_TIMEOUT_SECS};

fn route_timeout() -> Duration {
    Duration::from_secs(ROUTE_EXEC_TIMEOUT_SECS)
}

pub fn show_command(config: &CuConfig) -> Vec<String> {
    ["ip", "route", "show", &config.upf_subnet.to_string()]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn replace_command(config: &CuConfig) -> Vec<String> {
    [
        "ip",
        "route",
        "replace",
        &config.upf_subnet.to_string(),
        "via",
        &config.n3_gateway_ip.to_string(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Whether `ip route show` output has the UPF subnet routed via the N3 gateway
pub fn route_listed(output: &str, config: &CuConfig) -> bool {
    let subnet = config.upf_subnet.to_string();
    let via = format!("via {}", config.n3_gateway_ip);
    output
        .lines()
        .any(|line| line.trim_start().starts_with(&subnet) && line.contains(&via))
}

/// Execution failures are logged and read as "no route".
pub async fn n3_route_exists(workload: &dyn Workload, config: &CuConfig) -> bool {
    match workload
        .exec(show_command(config), route_timeout(), BTreeMap::new())
        .await
    {
        Ok((stdout, _)) => route_listed(&stdout, config),
        Err(e) => {
            warn!("Failed to retrieve the N3 route: {}", e);
            false
        }
    }
}

/// One-shot creation, retried on the next pass when it fails.
pub async fn create_n3_route(workload: &dyn Workload, config: &CuConfig) -> bool {
    match workload
        .exec(replace_command(config), route_timeout(), BTreeMap::new())
        .await
    {
        Ok(_) => {
            info!("N3 route to {} via {} created", config.upf_subnet, config.n3_gateway_ip);
            true
        }
        Err(e) => {
            warn!("Failed to create the N3 route: {}", e);
            false
        }
    }
}
