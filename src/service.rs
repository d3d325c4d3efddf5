//! Exposes the F1, N2 and N3 ports on the Service in front of the workload.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams},
    Client,
};
use tracing::info;

use crate::util::errors::{Error, Result, StdError};

const FIELD_MANAGER: &str = "ran-cu-operator";
pub const N2_SCTP_PORT: i32 = 36412;
pub const N3_GTPU_PORT: i32 = 2152;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServicePatcher: Send + Sync {
    async fn is_patched(&self, ports: &[ServicePort]) -> Result<bool>;

    async fn patch(&self, ports: &[ServicePort]) -> Result<()>;
}

/// Ports of the CU: F1 on the configured port, N2 over SCTP and N3 GTP-U
pub fn service_ports(f1_port: u16) -> Vec<ServicePort> {
    let port = |name: &str, port: i32, protocol: &str| ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some(protocol.to_string()),
        target_port: Some(IntOrString::Int(port)),
        ..Default::default()
    };
    vec![
        port("f1", i32::from(f1_port), "UDP"),
        port("n2", N2_SCTP_PORT, "SCTP"),
        port("n3", N3_GTPU_PORT, "UDP"),
    ]
}

/// Every desired port is present with the same number and protocol.
pub fn ports_match(service: &Service, desired: &[ServicePort]) -> bool {
    let current = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();
    desired.iter().all(|want| {
        current
            .iter()
            .any(|have| have.name == want.name && have.port == want.port && have.protocol == want.protocol)
    })
}

pub struct KubeServicePatcher {
    client: Client,
    namespace: String,
    service: String,
}

impl KubeServicePatcher {
    pub fn new(client: Client, namespace: &str, service: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            service: service.to_string(),
        }
    }
}

#[async_trait]
impl ServicePatcher for KubeServicePatcher {
    async fn is_patched(&self, ports: &[ServicePort]) -> Result<bool> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        match services.get(&self.service).await {
            Ok(service) => Ok(ports_match(&service, ports)),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(false),
            Err(e) => Err(Error::StdError(StdError::KubeError(e))),
        }
    }

    async fn patch(&self, ports: &[ServicePort]) -> Result<()> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        let service = Service {
            metadata: ObjectMeta {
                name: Some(self.service.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(ports.to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        };
        services
            .patch(
                &self.service,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&service),
            )
            .await
            .map_err(|e| Error::StdError(StdError::KubeError(e)))?;
        info!("Service '{}' exposes the f1, n2 and n3 ports", self.service);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn ports_follow_the_f1_port() {
        assert_json_eq!(
            serde_json::to_value(service_ports(3522)).unwrap(),
            json!([
                {"name": "f1", "port": 3522, "protocol": "UDP", "targetPort": 3522},
                {"name": "n2", "port": 36412, "protocol": "SCTP", "targetPort": 36412},
                {"name": "n3", "port": 2152, "protocol": "UDP", "targetPort": 2152}
            ])
        );
    }

    #[test]
    fn service_matches_only_with_every_port() {
        let mut service = Service {
            spec: Some(ServiceSpec {
                ports: Some(service_ports(2153)),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(ports_match(&service, &service_ports(2153)));
        assert!(!ports_match(&service, &service_ports(3522)));

        service.spec.as_mut().unwrap().ports = Some(service_ports(2153)[1..].to_vec());
        assert!(!ports_match(&service, &service_ports(2153)));
        assert!(!ports_match(&Service::default(), &service_ports(2153)));
    }
}
