//! Reconciliation of one RAN Central Unit.
//!
//! A pass is driven by a [`Trigger`]. Both entry points, [`converge`] and
//! [`evaluate_status`], walk the same ordered [`Gate`] list; leadership,
//! configuration and peer information are passed in explicitly.

use std::collections::BTreeMap;

use tracing::info;

use crate::api::v1alpha1::IdentitySource;
use crate::config::{ConfigInvalid, CuConfig};
use crate::network::NetworkAttachments;
use crate::privileged::PrivilegedPatcher;
use crate::relations::core_gnb::{CoreGnbRequires, CORE_GNB_RELATION_NAME};
use crate::relations::f1::{F1Provides, F1_RELATION_NAME};
use crate::relations::gnb_identity::GNB_IDENTITY_RELATION_NAME;
use crate::relations::n2::{N2Requires, N2_RELATION_NAME};
use crate::relations::{Relation, RelationStore, Role};
use crate::service::ServicePatcher;
use crate::util::errors::Result;
use crate::workload::Workload;

pub mod converge;
mod route;
pub mod status;
pub mod trigger;

pub use converge::{converge, remove, ConvergeOutcome};
pub use status::{evaluate_status, Gate, Snapshot, UnitStatus};
pub use trigger::{classify, Trigger};

/// External services a pass talks to
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub network: &'a dyn NetworkAttachments,
    pub privileged: &'a dyn PrivilegedPatcher,
    pub service: &'a dyn ServicePatcher,
    pub workload: &'a dyn Workload,
    pub relations: &'a dyn RelationStore,
}

/// Names identifying the unit towards its peers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitIdentity {
    pub namespace: String,
    pub app_name: String,
    pub container: String,
}

impl UnitIdentity {
    pub fn gnb_name(&self) -> String {
        format!("{}-{}-cu", self.namespace, self.app_name)
    }
}

/// Relation data read once per pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeerInfo {
    pub n2: Vec<Relation>,
    pub f1: Vec<Relation>,
    pub gnb_identity: Vec<Relation>,
    pub core_gnb: Vec<Relation>,
}

impl PeerInfo {
    pub async fn observe(store: &dyn RelationStore) -> Result<Self> {
        Ok(PeerInfo {
            n2: store.relations(N2_RELATION_NAME, Role::Requirer).await?,
            f1: store.relations(F1_RELATION_NAME, Role::Provider).await?,
            gnb_identity: store.relations(GNB_IDENTITY_RELATION_NAME, Role::Provider).await?,
            core_gnb: store.relations(CORE_GNB_RELATION_NAME, Role::Requirer).await?,
        })
    }

    pub fn n2_requirer(&self) -> N2Requires<'_> {
        N2Requires::new(&self.n2)
    }

    pub fn f1_provider(&self) -> F1Provides<'_> {
        F1Provides::new(&self.f1)
    }

    pub fn core_gnb_requirer(&self) -> CoreGnbRequires<'_> {
        CoreGnbRequires::new(&self.core_gnb)
    }

    /// Relation id to data version, over every endpoint
    pub fn versions(&self) -> BTreeMap<String, String> {
        [&self.n2, &self.f1, &self.gnb_identity, &self.core_gnb]
            .into_iter()
            .flatten()
            .map(|relation| (relation.id.clone(), relation.version.clone().unwrap_or_default()))
            .collect()
    }

    /// First relation gate not met for the identity source
    pub fn missing_relation(&self, identity_source: IdentitySource) -> Option<Gate> {
        if !self.n2_requirer().is_created() {
            return Some(Gate::N2RelationCreated);
        }
        if identity_source == IdentitySource::Core && !self.core_gnb_requirer().is_created() {
            return Some(Gate::CoreGnbRelationCreated);
        }
        None
    }
}

/// Result of one pass, recorded in the resource status
#[derive(Clone, Debug, PartialEq)]
pub struct PassReport {
    pub trigger: Trigger,
    pub outcome: ConvergeOutcome,
    /// `None` once the unit has been removed
    pub status: Option<UnitStatus>,
    pub workload_version: Option<String>,
    pub relation_versions: BTreeMap<String, String>,
}

/// Runs one pass for `trigger`.
///
/// Relations are read again after convergence so that data published during
/// the pass is reflected in the evaluated status.
pub async fn handle(
    trigger: Trigger,
    leader: bool,
    config: Result<CuConfig, ConfigInvalid>,
    unit: &UnitIdentity,
    collaborators: Collaborators<'_>,
) -> Result<PassReport> {
    info!("Handling {} for {}", trigger, unit.app_name);
    if trigger == Trigger::Removed {
        remove(leader, collaborators.network).await?;
        return Ok(PassReport {
            trigger,
            outcome: ConvergeOutcome::default(),
            status: None,
            workload_version: None,
            relation_versions: BTreeMap::new(),
        });
    }

    let peers = PeerInfo::observe(collaborators.relations).await?;
    let outcome = converge(leader, &config, unit, &peers, collaborators).await?;

    let peers = PeerInfo::observe(collaborators.relations).await?;
    let snapshot = Snapshot::observe(leader, config, unit, &peers, collaborators).await?;
    Ok(PassReport {
        trigger,
        outcome,
        status: Some(evaluate_status(&snapshot)),
        workload_version: snapshot.workload_version,
        relation_versions: peers.versions(),
    })
}
