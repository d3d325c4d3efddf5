use std::collections::BTreeMap;

use tracing::{debug, info, instrument, warn};

use super::{route, Collaborators, Gate, PeerInfo, UnitIdentity};
use crate::api::v1alpha1::IdentitySource;
use crate::config::{host, ConfigInvalid, CuConfig};
use crate::cu_config::{render, RenderInputs};
use crate::network::{NetworkAttachments, NetworkPlan};
use crate::relations::core_gnb::{CoreGnbRequires, CORE_GNB_RELATION_NAME};
use crate::relations::f1::{F1Provides, DU_F1_DEFAULT_PORT, F1_RELATION_NAME};
use crate::relations::gnb_identity::{GnbIdentityProvides, GNB_IDENTITY_RELATION_NAME};
use crate::relations::{publish, PlmnConfig, Relation, RelationStore};
use crate::service::service_ports;
use crate::util::errors::Result;
use crate::workload::{cu_layer, Workload, BASE_CONFIG_PATH, CONFIG_FILE_PATH, SERVICE_NAME};

/// What a convergence pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvergeOutcome {
    /// Gate that ended the pass early
    pub stopped_at: Option<Gate>,
    /// The configuration could not be rendered from the available data
    pub render_failed: bool,
    pub patch_requested: bool,
    pub service_patched: bool,
    pub route_requested: bool,
    pub config_written: bool,
    pub layer_replaced: bool,
    pub restarted: bool,
}

impl ConvergeOutcome {
    fn stopped(mut self, gate: Gate) -> Self {
        debug!("Convergence stopped at {:?}", gate);
        self.stopped_at = Some(gate);
        self
    }
}

/// Brings the workload in line with the configuration and peer data.
///
/// Writes happen only at declared points and only when something differs, so
/// an unchanged pass is a no-op.
#[instrument(skip_all, fields(app = %unit.app_name))]
pub async fn converge(
    leader: bool,
    config: &Result<CuConfig, ConfigInvalid>,
    unit: &UnitIdentity,
    peers: &PeerInfo,
    collaborators: Collaborators<'_>,
) -> Result<ConvergeOutcome> {
    let mut outcome = ConvergeOutcome::default();
    if !leader {
        return Ok(outcome.stopped(Gate::Leader));
    }
    let config = match config {
        Ok(config) => config,
        Err(invalid) => {
            warn!("{}", invalid);
            return Ok(outcome.stopped(Gate::Config));
        }
    };

    let ports = service_ports(config.f1_port);
    if !collaborators.service.is_patched(&ports).await? {
        collaborators.service.patch(&ports).await?;
        outcome.service_patched = true;
    }

    publish_ahead(config, unit, peers, collaborators.relations).await?;

    let network = collaborators.network;
    if !network.available().await? {
        return Ok(outcome.stopped(Gate::MultusAvailable));
    }
    let plan = NetworkPlan::from_config(config);
    network.reconcile(&plan).await?;
    if !network.ready(&plan).await? {
        return Ok(outcome.stopped(Gate::MultusReady));
    }
    if let Some(gate) = peers.missing_relation(config.identity_source) {
        return Ok(outcome.stopped(gate));
    }

    let workload = collaborators.workload;
    if !workload.can_connect().await? {
        return Ok(outcome.stopped(Gate::ContainerConnectable));
    }
    if workload.pod_ip().await?.is_none() {
        return Ok(outcome.stopped(Gate::PodIp));
    }
    if !collaborators.privileged.is_patched(&unit.container).await? {
        info!("Patching StatefulSet to run container '{}' privileged", unit.container);
        collaborators.privileged.patch(&unit.container).await?;
        outcome.patch_requested = true;
    }
    if !workload.exists(BASE_CONFIG_PATH).await? {
        return Ok(outcome.stopped(Gate::Storage));
    }
    let Some(n2) = peers.n2_requirer().information() else {
        return Ok(outcome.stopped(Gate::N2Information));
    };

    let (tac, plmns) = match config.identity_source {
        IdentitySource::Config => (
            config.tac,
            vec![PlmnConfig::new(&config.mcc, &config.mnc, config.sst, config.sd)?],
        ),
        IdentitySource::Core => {
            if !route::n3_route_exists(workload, config).await {
                outcome.route_requested = true;
                route::create_n3_route(workload, config).await;
            }
            let Some(identity) = peers.core_gnb_requirer().identity() else {
                return Ok(outcome.stopped(Gate::CoreIdentity));
            };
            (identity.tac, identity.plmns)
        }
    };

    let Some(amf_external_address) = n2.amf_ip_address else {
        warn!("AMF IP address is not available on the N2 relation, not rendering the config file");
        outcome.render_failed = true;
        return Ok(outcome);
    };
    let du_f1_port = match peers.f1_provider().requirer_f1_port() {
        Some(port) => port,
        None => {
            info!("DU F1 port information not available, using default {}", DU_F1_DEFAULT_PORT);
            DU_F1_DEFAULT_PORT
        }
    };
    let content = render(&RenderInputs {
        gnb_name: unit.gnb_name(),
        cu_f1_interface_name: config.f1_interface_name.clone(),
        cu_f1_ip_address: host(&config.f1_ip_address),
        cu_f1_port: config.f1_port,
        du_f1_port,
        cu_n2_interface_name: config.n2_interface_name.clone(),
        cu_n2_ip_address: host(&config.n2_ip_address),
        cu_n3_interface_name: config.n3_interface_name.clone(),
        cu_n3_ip_address: host(&config.n3_ip_address),
        amf_external_address,
        tac,
        plmns,
    });

    outcome.config_written = write_if_changed(workload, CONFIG_FILE_PATH, &content).await?;
    outcome.layer_replaced = install_layer(workload).await?;
    if outcome.config_written {
        workload.restart(SERVICE_NAME).await?;
        info!("Restarted service '{}'", SERVICE_NAME);
        outcome.restarted = true;
    }
    Ok(outcome)
}

/// Publishes whatever the peers can learn before the workload is up.
async fn publish_ahead(
    config: &CuConfig,
    unit: &UnitIdentity,
    peers: &PeerInfo,
    store: &dyn RelationStore,
) -> Result<()> {
    let f1_address = host(&config.f1_ip_address);
    match config.identity_source {
        IdentitySource::Config => {
            let identity = GnbIdentityProvides::gnb_identity_data(&unit.gnb_name(), config.tac)?;
            publish_if_related(store, GNB_IDENTITY_RELATION_NAME, &peers.gnb_identity, &identity).await?;

            let f1 = F1Provides::f1_information_data(&f1_address, config.f1_port, None, None)?;
            publish_if_related(store, F1_RELATION_NAME, &peers.f1, &f1).await?;
        }
        IdentitySource::Core => {
            let gnb_name = CoreGnbRequires::gnb_name_data(&unit.gnb_name())?;
            publish_if_related(store, CORE_GNB_RELATION_NAME, &peers.core_gnb, &gnb_name).await?;

            match peers.core_gnb_requirer().identity() {
                Some(identity) => {
                    let f1 = F1Provides::f1_information_data(
                        &f1_address,
                        config.f1_port,
                        Some(identity.tac),
                        Some(&identity.plmns),
                    )?;
                    publish_if_related(store, F1_RELATION_NAME, &peers.f1, &f1).await?;
                }
                None => debug!("TAC and PLMNs not known yet, F1 information not published"),
            }
        }
    }
    Ok(())
}

async fn publish_if_related(
    store: &dyn RelationStore,
    endpoint: &str,
    relations: &[Relation],
    data: &BTreeMap<String, String>,
) -> Result<()> {
    if relations.is_empty() {
        info!("No {} relations found.", endpoint);
        return Ok(());
    }
    publish(store, endpoint, relations, data).await
}

/// Pushes `content` unless the file already holds exactly these bytes.
async fn write_if_changed(workload: &dyn Workload, path: &str, content: &str) -> Result<bool> {
    if workload.exists(path).await? && workload.pull(path).await? == content {
        debug!("{} is up to date", path);
        return Ok(false);
    }
    workload.push(path, content).await?;
    info!("Config file written");
    Ok(true)
}

async fn install_layer(workload: &dyn Workload) -> Result<bool> {
    let layer = cu_layer();
    let plan = workload.plan().await?;
    if plan.services == layer.services {
        return Ok(false);
    }
    workload.add_layer(SERVICE_NAME, &layer).await?;
    workload.replan().await?;
    info!("Pebble layer '{}' added", SERVICE_NAME);
    Ok(true)
}

/// Deletes the network attachments created for the unit. Only the leader acts.
pub async fn remove(leader: bool, network: &dyn NetworkAttachments) -> Result<bool> {
    if !leader {
        debug!("Not the leader, leaving network attachments in place");
        return Ok(false);
    }
    network.remove().await?;
    info!("Network attachment definitions removed");
    Ok(true)
}
