use std::fmt;
use std::net::IpAddr;

use tracing::{debug, warn};

use super::{route, Collaborators, PeerInfo, UnitIdentity};
use crate::api::v1alpha1::IdentitySource;
use crate::config::{ConfigInvalid, CuConfig};
use crate::network::NetworkPlan;
use crate::util::errors::Result;
use crate::workload::{Workload, BASE_CONFIG_PATH, WORKLOAD_VERSION_FILE_NAME};

/// Reported state of the unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitStatus {
    Active,
    Waiting(String),
    Blocked(String),
}

impl UnitStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, UnitStatus::Active)
    }

    pub fn state(&self) -> &'static str {
        match self {
            UnitStatus::Active => "Active",
            UnitStatus::Waiting(_) => "Waiting",
            UnitStatus::Blocked(_) => "Blocked",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Active => "",
            UnitStatus::Waiting(message) | UnitStatus::Blocked(message) => message,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnitStatus::Active => write!(f, "Active"),
            _ => write!(f, "{}: {}", self.state(), self.message()),
        }
    }
}

/// Readiness gates, in evaluation order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gate {
    Leader,
    Config,
    MultusAvailable,
    MultusReady,
    N2RelationCreated,
    CoreGnbRelationCreated,
    ContainerConnectable,
    PodIp,
    PrivilegedPatch,
    Storage,
    N2Information,
    N3Route,
    CoreIdentity,
    GnbNamePublished,
}

const CONFIG_GATES: &[Gate] = &[
    Gate::Leader,
    Gate::Config,
    Gate::MultusAvailable,
    Gate::MultusReady,
    Gate::N2RelationCreated,
    Gate::ContainerConnectable,
    Gate::PodIp,
    Gate::PrivilegedPatch,
    Gate::Storage,
    Gate::N2Information,
];

const CORE_GATES: &[Gate] = &[
    Gate::Leader,
    Gate::Config,
    Gate::MultusAvailable,
    Gate::MultusReady,
    Gate::N2RelationCreated,
    Gate::CoreGnbRelationCreated,
    Gate::ContainerConnectable,
    Gate::PodIp,
    Gate::PrivilegedPatch,
    Gate::Storage,
    Gate::N2Information,
    Gate::N3Route,
    Gate::CoreIdentity,
    Gate::GnbNamePublished,
];

impl Gate {
    pub fn sequence(identity_source: IdentitySource) -> &'static [Gate] {
        match identity_source {
            IdentitySource::Config => CONFIG_GATES,
            IdentitySource::Core => CORE_GATES,
        }
    }

    /// Status reported while this gate is unmet
    pub fn unmet(&self) -> UnitStatus {
        let blocked = |m: &str| UnitStatus::Blocked(m.to_string());
        let waiting = |m: &str| UnitStatus::Waiting(m.to_string());
        match self {
            Gate::Leader => blocked("Scaling is not implemented for this charm"),
            Gate::Config => blocked("Invalid configuration"),
            Gate::MultusAvailable => blocked("Multus is not installed or enabled"),
            Gate::MultusReady => waiting("Waiting for Multus to be ready"),
            Gate::N2RelationCreated => blocked("Waiting for N2 relation to be created"),
            Gate::CoreGnbRelationCreated => blocked("Waiting for fiveg_core_gnb relation to be created"),
            Gate::ContainerConnectable => waiting("Waiting for container to be ready"),
            Gate::PodIp => waiting("Waiting for Pod IP address to be available"),
            Gate::PrivilegedPatch => waiting("Waiting for statefulset to be patched"),
            Gate::Storage => waiting("Waiting for storage to be attached"),
            Gate::N2Information => waiting("Waiting for N2 information"),
            Gate::N3Route => waiting("Waiting for the N3 route to be created"),
            Gate::CoreIdentity => waiting("Waiting for TAC and PLMNs configuration"),
            Gate::GnbNamePublished => blocked("Waiting for gNB name to be published"),
        }
    }
}

/// Everything the status evaluator looks at
///
/// Fields past the first unmet gate are left at their defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub leader: bool,
    pub config: Result<CuConfig, ConfigInvalid>,
    pub multus_available: bool,
    pub multus_ready: bool,
    pub n2_relation_created: bool,
    pub core_gnb_relation_created: bool,
    pub container_connectable: bool,
    pub pod_ip: Option<IpAddr>,
    pub privileged: bool,
    pub storage_attached: bool,
    pub n2_information: bool,
    pub n3_route: bool,
    pub core_identity: bool,
    pub gnb_name_published: bool,
    /// Read whenever the container is connectable, empty if the file is absent
    pub workload_version: Option<String>,
}

impl Snapshot {
    pub fn new(leader: bool, config: Result<CuConfig, ConfigInvalid>) -> Self {
        Snapshot {
            leader,
            config,
            multus_available: false,
            multus_ready: false,
            n2_relation_created: false,
            core_gnb_relation_created: false,
            container_connectable: false,
            pod_ip: None,
            privileged: false,
            storage_attached: false,
            n2_information: false,
            n3_route: false,
            core_identity: false,
            gnb_name_published: false,
            workload_version: None,
        }
    }

    pub fn passes(&self, gate: Gate) -> bool {
        match gate {
            Gate::Leader => self.leader,
            Gate::Config => self.config.is_ok(),
            Gate::MultusAvailable => self.multus_available,
            Gate::MultusReady => self.multus_ready,
            Gate::N2RelationCreated => self.n2_relation_created,
            Gate::CoreGnbRelationCreated => self.core_gnb_relation_created,
            Gate::ContainerConnectable => self.container_connectable,
            Gate::PodIp => self.pod_ip.is_some(),
            Gate::PrivilegedPatch => self.privileged,
            Gate::Storage => self.storage_attached,
            Gate::N2Information => self.n2_information,
            Gate::N3Route => self.n3_route,
            Gate::CoreIdentity => self.core_identity,
            Gate::GnbNamePublished => self.gnb_name_published,
        }
    }

    /// Probes the collaborators in gate order, stopping at the first unmet gate.
    pub async fn observe(
        leader: bool,
        config: Result<CuConfig, ConfigInvalid>,
        unit: &UnitIdentity,
        peers: &PeerInfo,
        collaborators: Collaborators<'_>,
    ) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new(leader, config);
        if !leader {
            return Ok(snapshot);
        }
        let config = match &snapshot.config {
            Ok(config) => config.clone(),
            Err(_) => return Ok(snapshot),
        };

        snapshot.multus_available = collaborators.network.available().await?;
        if !snapshot.multus_available {
            return Ok(snapshot);
        }
        snapshot.multus_ready = collaborators
            .network
            .ready(&NetworkPlan::from_config(&config))
            .await?;
        if !snapshot.multus_ready {
            return Ok(snapshot);
        }

        snapshot.n2_relation_created = peers.n2_requirer().is_created();
        snapshot.core_gnb_relation_created = peers.core_gnb_requirer().is_created();
        if peers.missing_relation(config.identity_source).is_some() {
            return Ok(snapshot);
        }

        let workload = collaborators.workload;
        snapshot.container_connectable = workload.can_connect().await?;
        if !snapshot.container_connectable {
            return Ok(snapshot);
        }
        snapshot.workload_version = Some(workload_version(workload).await);

        snapshot.pod_ip = workload.pod_ip().await?;
        if snapshot.pod_ip.is_none() {
            return Ok(snapshot);
        }
        snapshot.privileged = collaborators.privileged.is_patched(&unit.container).await?;
        if !snapshot.privileged {
            return Ok(snapshot);
        }
        snapshot.storage_attached = workload.exists(BASE_CONFIG_PATH).await?;
        if !snapshot.storage_attached {
            return Ok(snapshot);
        }
        snapshot.n2_information = peers.n2_requirer().information().is_some();
        if !snapshot.n2_information || config.identity_source == IdentitySource::Config {
            return Ok(snapshot);
        }

        snapshot.n3_route = route::n3_route_exists(workload, &config).await;
        if !snapshot.n3_route {
            return Ok(snapshot);
        }
        let core = peers.core_gnb_requirer();
        snapshot.core_identity = core.identity().is_some();
        if !snapshot.core_identity {
            return Ok(snapshot);
        }
        snapshot.gnb_name_published = core.published_gnb_name() == Some(unit.gnb_name());
        Ok(snapshot)
    }
}

async fn read_workload_version(workload: &dyn Workload) -> Result<String> {
    if workload.exists(WORKLOAD_VERSION_FILE_NAME).await? {
        workload.pull(WORKLOAD_VERSION_FILE_NAME).await
    } else {
        Ok(String::new())
    }
}

async fn workload_version(workload: &dyn Workload) -> String {
    match read_workload_version(workload).await {
        Ok(version) => version,
        Err(e) => {
            warn!("Failed to read the workload version: {}", e);
            String::new()
        }
    }
}

/// First unmet gate wins; later gates are not looked at.
pub fn evaluate_status(snapshot: &Snapshot) -> UnitStatus {
    let identity_source = snapshot
        .config
        .as_ref()
        .map(|config| config.identity_source)
        .unwrap_or_default();

    let unmet = Gate::sequence(identity_source)
        .iter()
        .copied()
        .find(|gate| !snapshot.passes(*gate));
    let status = match (unmet, &snapshot.config) {
        (None, _) => UnitStatus::Active,
        (Some(Gate::Config), Err(invalid)) => UnitStatus::Blocked(invalid.to_string()),
        (Some(gate), _) => gate.unmet(),
    };
    debug!("Unit status evaluated to {}", status);
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha1::RanCentralUnitSpec;

    fn config(identity_source: IdentitySource) -> CuConfig {
        CuConfig::from_spec(&RanCentralUnitSpec {
            identity_source,
            ..Default::default()
        })
        .unwrap()
    }

    fn all_met(identity_source: IdentitySource) -> Snapshot {
        Snapshot {
            multus_available: true,
            multus_ready: true,
            n2_relation_created: true,
            core_gnb_relation_created: true,
            container_connectable: true,
            pod_ip: Some("10.1.1.1".parse().unwrap()),
            privileged: true,
            storage_attached: true,
            n2_information: true,
            n3_route: true,
            core_identity: true,
            gnb_name_published: true,
            workload_version: Some("1.2.3".to_string()),
            ..Snapshot::new(true, Ok(config(identity_source)))
        }
    }

    fn unset(snapshot: &mut Snapshot, gate: Gate) {
        match gate {
            Gate::Leader => snapshot.leader = false,
            Gate::Config => {
                snapshot.config = Err(ConfigInvalid {
                    fields: vec!["f1Port".to_string()],
                })
            }
            Gate::MultusAvailable => snapshot.multus_available = false,
            Gate::MultusReady => snapshot.multus_ready = false,
            Gate::N2RelationCreated => snapshot.n2_relation_created = false,
            Gate::CoreGnbRelationCreated => snapshot.core_gnb_relation_created = false,
            Gate::ContainerConnectable => snapshot.container_connectable = false,
            Gate::PodIp => snapshot.pod_ip = None,
            Gate::PrivilegedPatch => snapshot.privileged = false,
            Gate::Storage => snapshot.storage_attached = false,
            Gate::N2Information => snapshot.n2_information = false,
            Gate::N3Route => snapshot.n3_route = false,
            Gate::CoreIdentity => snapshot.core_identity = false,
            Gate::GnbNamePublished => snapshot.gnb_name_published = false,
        }
    }

    #[test]
    fn all_gates_met_is_active() {
        assert_eq!(evaluate_status(&all_met(IdentitySource::Config)), UnitStatus::Active);
        assert_eq!(evaluate_status(&all_met(IdentitySource::Core)), UnitStatus::Active);
    }

    #[test]
    fn each_gate_reports_its_own_status() {
        for identity_source in [IdentitySource::Config, IdentitySource::Core] {
            for gate in Gate::sequence(identity_source) {
                let mut snapshot = all_met(identity_source);
                unset(&mut snapshot, *gate);
                let expected = match gate {
                    Gate::Config => UnitStatus::Blocked(
                        "The following configurations are not valid: ['f1Port']".to_string(),
                    ),
                    gate => gate.unmet(),
                };
                assert_eq!(evaluate_status(&snapshot), expected, "{gate:?}");
            }
        }
    }

    #[test]
    fn first_unmet_gate_wins() {
        let sequence = Gate::sequence(IdentitySource::Core);
        for (position, gate) in sequence.iter().enumerate() {
            let mut snapshot = all_met(IdentitySource::Core);
            for later in &sequence[position..] {
                unset(&mut snapshot, *later);
            }
            let expected = match gate {
                Gate::Config => UnitStatus::Blocked(
                    "The following configurations are not valid: ['f1Port']".to_string(),
                ),
                gate => gate.unmet(),
            };
            assert_eq!(evaluate_status(&snapshot), expected, "{gate:?}");
        }
    }

    #[test]
    fn config_identity_ignores_core_gates() {
        let mut snapshot = all_met(IdentitySource::Config);
        snapshot.core_gnb_relation_created = false;
        snapshot.n3_route = false;
        snapshot.gnb_name_published = false;
        assert_eq!(evaluate_status(&snapshot), UnitStatus::Active);
    }

    #[test]
    fn exact_messages() {
        let mut snapshot = all_met(IdentitySource::Config);
        snapshot.leader = false;
        assert_eq!(
            evaluate_status(&snapshot),
            UnitStatus::Blocked("Scaling is not implemented for this charm".to_string())
        );

        let mut snapshot = all_met(IdentitySource::Core);
        snapshot.gnb_name_published = false;
        assert_eq!(
            evaluate_status(&snapshot),
            UnitStatus::Blocked("Waiting for gNB name to be published".to_string())
        );
        assert_eq!(
            Gate::PodIp.unmet(),
            UnitStatus::Waiting("Waiting for Pod IP address to be available".to_string())
        );
    }

    #[test]
    fn status_accessors() {
        let waiting = UnitStatus::Waiting("Waiting for N2 information".to_string());
        assert_eq!(waiting.state(), "Waiting");
        assert_eq!(waiting.message(), "Waiting for N2 information");
        assert_eq!(waiting.to_string(), "Waiting: Waiting for N2 information");
        assert!(UnitStatus::Active.is_active());
        assert_eq!(UnitStatus::Active.message(), "");
    }
}
