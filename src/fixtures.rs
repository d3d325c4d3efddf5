//! In-memory collaborators for reconciler tests.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServicePort;
use tokio::time::Duration;

use crate::api::v1alpha1::{IdentitySource, RanCentralUnitSpec};
use crate::config::CuConfig;
use crate::network::{NetworkAttachments, NetworkPlan};
use crate::privileged::PrivilegedPatcher;
use crate::reconciler::{Collaborators, UnitIdentity};
use crate::relations::core_gnb::CORE_GNB_RELATION_NAME;
use crate::relations::f1::F1_RELATION_NAME;
use crate::relations::gnb_identity::GNB_IDENTITY_RELATION_NAME;
use crate::relations::n2::N2_RELATION_NAME;
use crate::relations::{Relation, RelationStore, Role};
use crate::service::ServicePatcher;
use crate::util::errors::{Error, Result, StdError};
use crate::workload::{Layer, Plan, Workload, BASE_CONFIG_PATH};

pub const NAMESPACE: &str = "whatever";
pub const APP_NAME: &str = "oai-ran-cu";
pub const GNB_NAME: &str = "whatever-oai-ran-cu-cu";

pub fn unit() -> UnitIdentity {
    UnitIdentity {
        namespace: NAMESPACE.to_string(),
        app_name: APP_NAME.to_string(),
        container: "cu".to_string(),
    }
}

pub fn config() -> CuConfig {
    config_with(|_| {})
}

pub fn core_config() -> CuConfig {
    config_with(|spec| spec.identity_source = IdentitySource::Core)
}

pub fn config_with(update: impl FnOnce(&mut RanCentralUnitSpec)) -> CuConfig {
    let mut spec = RanCentralUnitSpec::default();
    update(&mut spec);
    CuConfig::from_spec(&spec).unwrap()
}

#[derive(Default)]
pub struct FakeNetwork {
    pub available: bool,
    pub reconciled: Mutex<Option<NetworkPlan>>,
    pub reconcile_calls: Mutex<usize>,
    pub removed: Mutex<bool>,
}

impl FakeNetwork {
    pub fn installed() -> Self {
        FakeNetwork {
            available: true,
            ..Default::default()
        }
    }

    pub fn reconcile_calls(&self) -> usize {
        *self.reconcile_calls.lock().unwrap()
    }

    pub fn removed(&self) -> bool {
        *self.removed.lock().unwrap()
    }
}

#[async_trait]
impl NetworkAttachments for FakeNetwork {
    async fn available(&self) -> Result<bool> {
        Ok(self.available)
    }

    async fn ready(&self, plan: &NetworkPlan) -> Result<bool> {
        Ok(self.reconciled.lock().unwrap().as_ref() == Some(plan))
    }

    async fn reconcile(&self, plan: &NetworkPlan) -> Result<()> {
        *self.reconcile_calls.lock().unwrap() += 1;
        *self.reconciled.lock().unwrap() = Some(plan.clone());
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        *self.removed.lock().unwrap() = true;
        *self.reconciled.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePrivileged {
    pub patched: Mutex<bool>,
    pub patch_calls: Mutex<usize>,
}

impl FakePrivileged {
    pub fn patched() -> Self {
        FakePrivileged {
            patched: Mutex::new(true),
            ..Default::default()
        }
    }

    pub fn patch_calls(&self) -> usize {
        *self.patch_calls.lock().unwrap()
    }
}

#[async_trait]
impl PrivilegedPatcher for FakePrivileged {
    async fn is_patched(&self, _container: &str) -> Result<bool> {
        Ok(*self.patched.lock().unwrap())
    }

    async fn patch(&self, _container: &str) -> Result<()> {
        *self.patch_calls.lock().unwrap() += 1;
        *self.patched.lock().unwrap() = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeService {
    pub ports: Mutex<Option<Vec<ServicePort>>>,
    pub patch_calls: Mutex<usize>,
}

impl FakeService {
    pub fn ports(&self) -> Option<Vec<ServicePort>> {
        self.ports.lock().unwrap().clone()
    }

    pub fn patch_calls(&self) -> usize {
        *self.patch_calls.lock().unwrap()
    }
}

#[async_trait]
impl ServicePatcher for FakeService {
    async fn is_patched(&self, ports: &[ServicePort]) -> Result<bool> {
        Ok(self.ports.lock().unwrap().as_deref() == Some(ports))
    }

    async fn patch(&self, ports: &[ServicePort]) -> Result<()> {
        *self.patch_calls.lock().unwrap() += 1;
        *self.ports.lock().unwrap() = Some(ports.to_vec());
        Ok(())
    }
}

pub struct FakeWorkload {
    pub connectable: bool,
    pub pod_ip: Option<IpAddr>,
    pub storage: bool,
    pub files: Mutex<BTreeMap<String, String>>,
    pub plan: Mutex<Plan>,
    pub pushes: Mutex<Vec<String>>,
    pub layers_added: Mutex<usize>,
    pub replans: Mutex<usize>,
    pub restarts: Mutex<Vec<String>>,
    pub execs: Mutex<Vec<Vec<String>>>,
    pub routes: Mutex<String>,
    pub exec_fails: bool,
}

impl Default for FakeWorkload {
    fn default() -> Self {
        FakeWorkload {
            connectable: true,
            pod_ip: Some("10.1.2.3".parse().unwrap()),
            storage: true,
            files: Mutex::new(BTreeMap::new()),
            plan: Mutex::new(Plan::default()),
            pushes: Mutex::new(Vec::new()),
            layers_added: Mutex::new(0),
            replans: Mutex::new(0),
            restarts: Mutex::new(Vec::new()),
            execs: Mutex::new(Vec::new()),
            routes: Mutex::new(String::new()),
            exec_fails: false,
        }
    }
}

impl FakeWorkload {
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files.lock().unwrap().insert(path.to_string(), content.to_string());
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn restarts(&self) -> Vec<String> {
        self.restarts.lock().unwrap().clone()
    }

    pub fn layers_added(&self) -> usize {
        *self.layers_added.lock().unwrap()
    }

    pub fn execs(&self) -> Vec<Vec<String>> {
        self.execs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Workload for FakeWorkload {
    async fn can_connect(&self) -> Result<bool> {
        Ok(self.connectable)
    }

    async fn pod_ip(&self) -> Result<Option<IpAddr>> {
        Ok(self.pod_ip)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        if path == BASE_CONFIG_PATH {
            return Ok(self.storage);
        }
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn pull(&self, path: &str) -> Result<String> {
        self.file(path).ok_or_else(|| {
            Error::StdError(StdError::ExecError {
                command: format!("cat {path}"),
                message: "No such file or directory".to_string(),
            })
        })
    }

    async fn push(&self, path: &str, content: &str) -> Result<()> {
        self.pushes.lock().unwrap().push(path.to_string());
        self.files.lock().unwrap().insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn plan(&self) -> Result<Plan> {
        Ok(self.plan.lock().unwrap().clone())
    }

    async fn add_layer(&self, _label: &str, layer: &Layer) -> Result<()> {
        *self.layers_added.lock().unwrap() += 1;
        let mut plan = self.plan.lock().unwrap();
        for (name, service) in &layer.services {
            plan.services.insert(name.clone(), service.clone());
        }
        Ok(())
    }

    async fn replan(&self) -> Result<()> {
        *self.replans.lock().unwrap() += 1;
        Ok(())
    }

    async fn restart(&self, service: &str) -> Result<()> {
        self.restarts.lock().unwrap().push(service.to_string());
        Ok(())
    }

    async fn exec(
        &self,
        command: Vec<String>,
        timeout: Duration,
        _env: BTreeMap<String, String>,
    ) -> Result<(String, String)> {
        self.execs.lock().unwrap().push(command.clone());
        if self.exec_fails {
            return Err(Error::StdError(StdError::ExecTimeout {
                command: command.join(" "),
                timeout,
            }));
        }
        match command.get(2).map(String::as_str) {
            Some("show") => Ok((self.routes.lock().unwrap().clone(), String::new())),
            Some("replace") => {
                *self.routes.lock().unwrap() = format!("{} {} {} dev n3\n", command[3], command[4], command[5]);
                Ok((String::new(), String::new()))
            }
            _ => Ok((String::new(), String::new())),
        }
    }
}

/// Relations held in memory; updates bump the relation version
#[derive(Default)]
pub struct FakeRelationStore {
    pub relations: Mutex<Vec<(Role, Relation)>>,
    pub updates: Mutex<Vec<(String, BTreeMap<String, String>)>>,
}

impl FakeRelationStore {
    pub fn add(&self, endpoint: &str, role: Role, remote_app_data: &[(&str, &str)]) {
        let mut relations = self.relations.lock().unwrap();
        let relation = Relation {
            id: format!("{}-{}", endpoint.replace('_', "-"), relations.len()),
            endpoint: endpoint.to_string(),
            role: Some(role),
            remote_app: Some("remote".to_string()),
            version: Some("1".to_string()),
            local_app_data: BTreeMap::new(),
            remote_app_data: remote_app_data
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        relations.push((role, relation));
    }

    pub fn with_n2(self) -> Self {
        self.add(
            N2_RELATION_NAME,
            Role::Requirer,
            &[
                ("amf_hostname", "amf"),
                ("amf_port", "38412"),
                ("amf_ip_address", "1.2.3.4"),
            ],
        );
        self
    }

    pub fn with_f1(self) -> Self {
        self.add(F1_RELATION_NAME, Role::Provider, &[]);
        self
    }

    pub fn with_gnb_identity(self) -> Self {
        self.add(GNB_IDENTITY_RELATION_NAME, Role::Provider, &[]);
        self
    }

    pub fn with_core_gnb(self, tac: &str, plmns: &str) -> Self {
        self.add(CORE_GNB_RELATION_NAME, Role::Requirer, &[("tac", tac), ("plmns", plmns)]);
        self
    }

    pub fn local_data(&self, endpoint: &str) -> Vec<BTreeMap<String, String>> {
        self.relations
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, relation)| relation.endpoint == endpoint)
            .map(|(_, relation)| relation.local_app_data.clone())
            .collect()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

#[async_trait]
impl RelationStore for FakeRelationStore {
    async fn relations(&self, endpoint: &str, role: Role) -> Result<Vec<Relation>> {
        Ok(self
            .relations
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, relation)| *r == role && relation.endpoint == endpoint)
            .map(|(_, relation)| relation.clone())
            .collect())
    }

    async fn update_local_app_data(
        &self,
        relation: &Relation,
        data: BTreeMap<String, String>,
    ) -> Result<()> {
        self.updates.lock().unwrap().push((relation.id.clone(), data.clone()));
        let mut relations = self.relations.lock().unwrap();
        if let Some((_, stored)) = relations.iter_mut().find(|(_, r)| r.id == relation.id) {
            stored.local_app_data = data;
            let version = stored
                .version
                .as_deref()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or_default();
            stored.version = Some((version + 1).to_string());
        }
        Ok(())
    }
}

/// A complete set of fakes for one test
#[derive(Default)]
pub struct Harness {
    pub network: FakeNetwork,
    pub privileged: FakePrivileged,
    pub service: FakeService,
    pub workload: FakeWorkload,
    pub relations: FakeRelationStore,
}

impl Harness {
    /// Everything in place for a configuration identity source
    pub fn ready() -> Self {
        Harness {
            network: FakeNetwork::installed(),
            privileged: FakePrivileged::patched(),
            service: FakeService::default(),
            workload: FakeWorkload::default(),
            relations: FakeRelationStore::default().with_n2(),
        }
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            network: &self.network,
            privileged: &self.privileged,
            service: &self.service,
            workload: &self.workload,
            relations: &self.relations,
        }
    }
}
