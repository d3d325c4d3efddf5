use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::{
    api::{Api, ListParams, Patch, PatchParams, ResourceExt},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        events::{Event, EventType, Recorder, Reporter},
        finalizer::{finalizer, Event as Finalizer},
        reflector::ObjectRef,
        watcher::{self, Config},
    },
    Resource,
};
use serde::Serialize;
use serde_json::json;
use tokio::{sync::RwLock, time::Duration};
use tracing::*;

use crate::api::v1alpha1::{RanCentralUnit, RanCentralUnitStatus, API_VERSION, RAN_CENTRAL_UNIT_FINALIZER};
use crate::config::CuConfig;
use crate::leader::{LeaderElector, LeaderStatus};
use crate::network::multus::MultusClient;
use crate::privileged::StatefulSetPatcher;
use crate::service::KubeServicePatcher;
use crate::reconciler::{self, classify, Collaborators, PassReport, PeerInfo, Trigger, UnitIdentity};
use crate::relations::{ConfigMapRelationStore, RELATION_PROVIDER_LABEL, RELATION_REQUIRER_LABEL, RELATION_ENDPOINT_LABEL};
use crate::util::status::{ready_condition, set_status_condition};
use crate::util::{errors, errors::Result, metrics, telemetry};
use crate::workload::PebbleWorkload;

pub const FIELD_MANAGER: &str = "ran-cu-operator";
/// Retry delay after a command inside the workload container failed
const EXEC_RETRY: Duration = Duration::from_secs(30);
const APP_NAME_LABEL: &str = "app.kubernetes.io/name";

/// Operator runtime settings, read from the environment
#[derive(Clone, Debug)]
pub struct Settings {
    /// Identity held on the leadership lease
    pub pod_name: String,
    /// Namespace of the leadership lease
    pub namespace: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Settings {
            pod_name: std::env::var("POD_NAME").unwrap_or_else(|_| FIELD_MANAGER.to_string()),
            namespace: std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string()),
        }
    }
}

/// Kubernetes backed collaborators for one unit
struct KubeCollaborators {
    network: MultusClient,
    privileged: StatefulSetPatcher,
    service: KubeServicePatcher,
    workload: PebbleWorkload,
    relations: ConfigMapRelationStore,
}

impl KubeCollaborators {
    fn new(client: Client, cu: &RanCentralUnit, ns: &str) -> Self {
        let stateful_set = cu.stateful_set_name();
        let container = &cu.spec.container_name;
        KubeCollaborators {
            network: MultusClient::new(client.clone(), ns, &cu.name_any(), &stateful_set, container),
            privileged: StatefulSetPatcher::new(client.clone(), ns, &stateful_set),
            service: KubeServicePatcher::new(client.clone(), ns, &stateful_set),
            workload: PebbleWorkload::new(client.clone(), ns, &cu.pod_name(), container),
            relations: ConfigMapRelationStore::new(client, ns, &cu.app_name()),
        }
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            network: &self.network,
            privileged: &self.privileged,
            service: &self.service,
            workload: &self.workload,
            relations: &self.relations,
        }
    }
}

fn namespace(cu: &RanCentralUnit) -> Result<String> {
    cu.namespace()
        .ok_or_else(|| errors::Error::StdError(errors::StdError::MetadataMissing("namespace".to_string())))
}

impl RanCentralUnit {
    fn unit_identity(&self, ns: &str) -> UnitIdentity {
        UnitIdentity {
            namespace: ns.to_string(),
            app_name: self.app_name(),
            container: self.spec.container_name.clone(),
        }
    }

    // Reconcile (for non-finalizer related changes)
    async fn reconcile(&self, ctx: Arc<Context>) -> Result<Action> {
        let client = ctx.client.clone();
        let recorder = ctx.diagnostics.read().await.recorder(client.clone());
        let ns = namespace(self)?;
        let kube = KubeCollaborators::new(client.clone(), self, &ns);
        let collaborators = kube.collaborators();

        let peers = PeerInfo::observe(collaborators.relations).await?;
        let container_ready = collaborators.workload.can_connect().await?;
        let trigger = classify(self, &peers.versions(), container_ready);

        let report = reconciler::handle(
            trigger,
            true,
            CuConfig::from_spec(&self.spec),
            &self.unit_identity(&ns),
            collaborators,
        )
        .await
        .map_err(|e| e.requeue_exec_failure(EXEC_RETRY))?;

        if report.outcome.config_written {
            ctx.metrics.config_writes.inc();
            self.publish_event(&recorder, "ConfigWritten", "Configuring", "CU configuration file written")
                .await?;
        }
        if report.outcome.restarted {
            ctx.metrics.restarts.inc();
            self.publish_event(&recorder, "Restarted", "Restarting", "CU service restarted")
                .await?;
        }
        if report.outcome.patch_requested {
            self.publish_event(
                &recorder,
                "PrivilegedPatchRequested",
                "Patching",
                "StatefulSet patched to run the CU privileged",
            )
            .await?;
        }

        let status = next_status(self, &report, container_ready);
        let cus: Api<RanCentralUnit> = Api::namespaced(client, &ns);
        let new_status = Patch::Apply(json!({
            "apiVersion": API_VERSION,
            "kind": "RanCentralUnit",
            "status": status
        }));
        let ps = PatchParams::apply(FIELD_MANAGER).force();
        let _o = cus
            .patch_status(&self.name_any(), &ps, &new_status)
            .await
            .map_err(|e| errors::Error::StdError(errors::StdError::KubeError(e)))?;

        ctx.diagnostics.write().await.record(self, &report, true);

        // If no events were received, check back every 5 minutes
        Ok(Action::requeue(Duration::from_secs(5 * 60)))
    }

    // Finalizer cleanup (the object was deleted, remove the network attachments)
    async fn cleanup(&self, ctx: Arc<Context>) -> Result<Action> {
        let recorder = ctx.diagnostics.read().await.recorder(ctx.client.clone());
        let ns = namespace(self)?;
        let kube = KubeCollaborators::new(ctx.client.clone(), self, &ns);

        let report = reconciler::handle(
            Trigger::Removed,
            true,
            CuConfig::from_spec(&self.spec),
            &self.unit_identity(&ns),
            kube.collaborators(),
        )
        .await?;
        ctx.diagnostics.write().await.record(self, &report, true);

        self.publish_event(
            &recorder,
            "DeleteRequested",
            "Deleting",
            &format!("Delete `{}`", self.name_any()),
        )
        .await?;
        Ok(Action::await_change())
    }

    async fn publish_event(&self, recorder: &Recorder, reason: &str, action: &str, note: &str) -> Result<()> {
        recorder
            .publish(
                &Event {
                    type_: EventType::Normal,
                    reason: reason.into(),
                    note: Some(note.into()),
                    action: action.into(),
                    secondary: None,
                },
                &self.object_ref(&()),
            )
            .await
            .map_err(|e| errors::Error::StdError(errors::StdError::KubeError(e)))
    }

    /// Status evaluation only, for replicas that do not hold the lease
    async fn observe(&self, ctx: Arc<Context>) -> Result<Action> {
        let ns = namespace(self)?;
        let kube = KubeCollaborators::new(ctx.client.clone(), self, &ns);
        let report = reconciler::handle(
            Trigger::PeriodicCheck,
            false,
            CuConfig::from_spec(&self.spec),
            &self.unit_identity(&ns),
            kube.collaborators(),
        )
        .await
        .map_err(|e| e.requeue_exec_failure(EXEC_RETRY))?;
        ctx.diagnostics.write().await.record(self, &report, false);
        Ok(Action::requeue(Duration::from_secs(60)))
    }
}

/// Status written back after a pass
pub fn next_status(cu: &RanCentralUnit, report: &PassReport, container_ready: bool) -> RanCentralUnitStatus {
    let previous = cu.status.clone().unwrap_or_default();
    let conditions = match &report.status {
        Some(status) => set_status_condition(&previous.conditions, ready_condition(status, cu.metadata.generation)).0,
        None => previous.conditions.clone(),
    };
    RanCentralUnitStatus {
        conditions,
        state: report.status.as_ref().map(|s| s.state().to_string()).or(previous.state),
        message: report.status.as_ref().map(|s| s.message().to_string()).or(previous.message),
        workload_version: report.workload_version.clone().or(previous.workload_version),
        last_trigger: Some(report.trigger.to_string()),
        observed_generation: cu.metadata.generation,
        observed_relations: report.relation_versions.clone(),
        container_ready,
    }
}

/// Units whose relations live in this ConfigMap
pub fn relation_owners(config_map: &ConfigMap) -> Vec<ObjectRef<RanCentralUnit>> {
    let labels = config_map.labels();
    if !labels.contains_key(RELATION_ENDPOINT_LABEL) {
        return Vec::new();
    }
    let ns = config_map.namespace().unwrap_or_default();
    [RELATION_PROVIDER_LABEL, RELATION_REQUIRER_LABEL]
        .iter()
        .filter_map(|label| labels.get(*label))
        .map(|app| ObjectRef::new(app).within(&ns))
        .collect()
}

fn workload_owner(pod: &Pod) -> Option<ObjectRef<RanCentralUnit>> {
    let app = pod.labels().get(APP_NAME_LABEL)?;
    Some(ObjectRef::new(app).within(&pod.namespace()?))
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub fn to_context(&self, client: Client, settings: &Settings, leader: LeaderStatus) -> Arc<Context> {
        Arc::new(Context {
            identity: settings.pod_name.clone(),
            leader,
            client,
            metrics: metrics::Metrics::default().register(&self.registry).unwrap(),
            diagnostics: self.diagnostics.clone(),
        })
    }
}

// Context for our reconciler
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: metrics::Metrics,
    /// Leadership kept current by the lease renewal loop
    pub leader: LeaderStatus,
    pub identity: String,
}

#[instrument(skip(ctx, cu), fields(trace_id))]
pub async fn reconcile(cu: Arc<RanCentralUnit>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.count_and_measure(&cu.name_any());
    ctx.diagnostics.write().await.last_event = Utc::now();

    let ns = namespace(&cu)?;
    let cus: Api<RanCentralUnit> = Api::namespaced(ctx.client.clone(), &ns);

    if !ctx.leader.is_leader() {
        debug!("{} does not hold the lease, observing only", ctx.identity);
        return cu.observe(ctx.clone()).await;
    }

    info!("Reconciling RanCentralUnit \"{}\" in {}", cu.name_any(), ns);
    finalizer(&cus, RAN_CENTRAL_UNIT_FINALIZER, cu.clone(), |event| async {
        match event {
            Finalizer::Apply(cu) => cu.reconcile(ctx.clone()).await,
            Finalizer::Cleanup(cu) => cu.cleanup(ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| errors::Error::StdError(errors::StdError::FinalizerError(Box::new(e))))
}

/// Last pass seen for one unit
#[derive(Clone, Debug, Serialize)]
pub struct UnitDiagnostics {
    pub leader: bool,
    pub trigger: Trigger,
    pub status: Option<String>,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
    pub units: BTreeMap<String, UnitDiagnostics>,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: FIELD_MANAGER.into(),
            units: BTreeMap::new(),
        }
    }
}
impl Diagnostics {
    fn recorder(&self, client: Client) -> Recorder {
        Recorder::new(client, self.reporter.clone())
    }

    fn record(&mut self, cu: &RanCentralUnit, report: &PassReport, leader: bool) {
        let key = format!("{}/{}", cu.namespace().unwrap_or_default(), cu.name_any());
        if report.trigger == Trigger::Removed {
            self.units.remove(&key);
            return;
        }
        self.units.insert(
            key,
            UnitDiagnostics {
                leader,
                trigger: report.trigger,
                status: report.status.as_ref().map(ToString::to_string),
            },
        );
    }
}

fn error_policy(cu: Arc<RanCentralUnit>, error: &errors::Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed: {:?}", error);
    ctx.metrics.reconcile_failure(&cu, error);
    match error.requeue_duration() {
        Some(duration) => Action::requeue(duration),
        None => Action::requeue(Duration::from_secs(5 * 60)),
    }
}

/// Initialize the controller and shared state (given the crd is installed)
pub async fn run(state: State, settings: Settings) {
    let client = Client::try_default().await.expect("failed to create kube Client");

    let cus = Api::<RanCentralUnit>::all(client.clone());
    if let Err(e) = cus.list(&ListParams::default().limit(1)).await {
        error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        std::process::exit(1);
    }

    let leader = LeaderStatus::default();
    let elector = LeaderElector::new(client.clone(), &settings.namespace, &settings.pod_name);
    tokio::spawn(elector.run(leader.clone()));

    Controller::new(cus, Config::default().any_semantic())
        .watches(
            Api::<ConfigMap>::all(client.clone()),
            watcher::Config::default().labels(RELATION_ENDPOINT_LABEL),
            |config_map| relation_owners(&config_map),
        )
        .watches(
            Api::<Pod>::all(client.clone()),
            watcher::Config::default().labels(APP_NAME_LABEL),
            |pod| workload_owner(&pod),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, state.to_context(client, &settings, leader))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha1::RanCentralUnitSpec;
    use crate::reconciler::{ConvergeOutcome, UnitStatus};
    use kube::api::ObjectMeta;

    fn report(status: Option<UnitStatus>) -> PassReport {
        PassReport {
            trigger: Trigger::RelationChanged,
            outcome: ConvergeOutcome::default(),
            status,
            workload_version: Some("2.1.0".to_string()),
            relation_versions: BTreeMap::from([("fiveg-n2-amf".to_string(), "12".to_string())]),
        }
    }

    fn cu() -> RanCentralUnit {
        let mut cu = RanCentralUnit::new("oai-ran-cu", RanCentralUnitSpec::default());
        cu.metadata.namespace = Some("ran".to_string());
        cu.metadata.generation = Some(4);
        cu
    }

    #[test]
    fn status_records_what_the_pass_saw() {
        let status = next_status(
            &cu(),
            &report(Some(UnitStatus::Waiting("Waiting for N2 information".to_string()))),
            true,
        );

        assert_eq!(status.state.as_deref(), Some("Waiting"));
        assert_eq!(status.message.as_deref(), Some("Waiting for N2 information"));
        assert_eq!(status.observed_generation, Some(4));
        assert_eq!(status.last_trigger.as_deref(), Some("RelationChanged"));
        assert_eq!(status.workload_version.as_deref(), Some("2.1.0"));
        assert_eq!(status.observed_relations.get("fiveg-n2-amf").map(String::as_str), Some("12"));
        assert!(status.container_ready);
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, "False");
    }

    #[test]
    fn next_status_feeds_classification() {
        let mut cu = cu();
        let versions = report(None).relation_versions;
        cu.status = Some(next_status(&cu, &report(Some(UnitStatus::Active)), true));

        assert_eq!(classify(&cu, &versions, true), Trigger::PeriodicCheck);
        assert_eq!(cu.status.as_ref().unwrap().conditions[0].status, "True");
    }

    #[test]
    fn relation_config_maps_map_to_both_sides() {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some("fiveg-f1-du".to_string()),
                namespace: Some("ran".to_string()),
                labels: Some(BTreeMap::from([
                    (RELATION_ENDPOINT_LABEL.to_string(), "fiveg_f1".to_string()),
                    (RELATION_PROVIDER_LABEL.to_string(), "oai-ran-cu".to_string()),
                    (RELATION_REQUIRER_LABEL.to_string(), "oai-ran-du".to_string()),
                ])),
                ..Default::default()
            },
            ..Default::default()
        };

        let owners = relation_owners(&config_map);

        assert_eq!(
            owners,
            vec![
                ObjectRef::new("oai-ran-cu").within("ran"),
                ObjectRef::new("oai-ran-du").within("ran"),
            ]
        );
        assert!(relation_owners(&ConfigMap::default()).is_empty());
    }

    #[test]
    fn diagnostics_forget_removed_units() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.record(&cu(), &report(Some(UnitStatus::Active)), true);
        assert_eq!(diagnostics.units["ran/oai-ran-cu"].status.as_deref(), Some("Active"));

        let removed = PassReport {
            trigger: Trigger::Removed,
            status: None,
            ..report(None)
        };
        diagnostics.record(&cu(), &removed, true);
        assert!(diagnostics.units.is_empty());
    }

    #[tokio::test]
    #[ignore = "uses k8s current-context"]
    async fn integration_reconcile_should_set_status() {
        let client = Client::try_default().await.unwrap();
        let state = State::default();
        let leader = LeaderStatus::default();
        leader.set(true);
        let ctx = state.to_context(client.clone(), &Settings::from_env(), leader);

        let cus: Api<RanCentralUnit> = Api::namespaced(client, "default");
        let cu = cus.get("oai-ran-cu").await.unwrap();
        reconcile(Arc::new(cu), ctx).await.unwrap();

        let cu = cus.get("oai-ran-cu").await.unwrap();
        let status = cu.status.unwrap();
        assert!(status.state.is_some());
        assert_eq!(status.observed_generation, cu.metadata.generation);
    }
}
