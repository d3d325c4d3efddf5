//! Single-writer leadership over a `coordination.k8s.io/v1` Lease.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::{
    api::{Api, ObjectMeta, PostParams},
    Client,
};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::util::errors::{Error, Result, StdError};

pub const LEASE_NAME: &str = "ran-cu-operator-leader";
pub const LEASE_DURATION_SECS: i32 = 15;
/// Renewal period of the background loop, well inside the lease duration
pub const RENEW_INTERVAL_SECS: u64 = 5;

/// Leadership as last observed by the renewal loop, shared with reconcilers
#[derive(Clone, Default)]
pub struct LeaderStatus(Arc<AtomicBool>);

impl LeaderStatus {
    pub fn is_leader(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, leading: bool) {
        self.0.store(leading, Ordering::SeqCst);
    }
}

/// Whether `identity` may take or keep the lease at `now`
pub fn lease_is_claimable(spec: Option<&LeaseSpec>, identity: &str, now: DateTime<Utc>) -> bool {
    let Some(spec) = spec else {
        return true;
    };
    match spec.holder_identity.as_deref() {
        None | Some("") => true,
        Some(holder) if holder == identity => true,
        Some(_) => {
            let Some(MicroTime(renewed)) = spec.renew_time.as_ref().or(spec.acquire_time.as_ref()) else {
                return true;
            };
            let duration = spec.lease_duration_seconds.unwrap_or(LEASE_DURATION_SECS);
            *renewed + ChronoDuration::seconds(i64::from(duration)) < now
        }
    }
}

pub struct LeaderElector {
    client: Client,
    namespace: String,
    identity: String,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, identity: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            identity: identity.to_string(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn desired_spec(&self, current: Option<&LeaseSpec>, now: DateTime<Utc>) -> LeaseSpec {
        let held = current.and_then(|spec| spec.holder_identity.as_deref()) == Some(self.identity.as_str());
        let transitions = current.and_then(|spec| spec.lease_transitions).unwrap_or_default();
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(LEASE_DURATION_SECS),
            acquire_time: if held {
                current.and_then(|spec| spec.acquire_time.clone())
            } else {
                Some(MicroTime(now))
            },
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(if held { transitions } else { transitions + 1 }),
            ..Default::default()
        }
    }

    /// Takes the lease when free or expired and renews it when held.
    ///
    /// Losing a write race (409) reads as not being the leader.
    pub async fn try_acquire_or_renew(&self) -> Result<bool> {
        let leases: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let now = Utc::now();

        let result = match leases.get(LEASE_NAME).await {
            Ok(mut lease) => {
                if !lease_is_claimable(lease.spec.as_ref(), &self.identity, now) {
                    debug!("Lease {} is held by another replica", LEASE_NAME);
                    return Ok(false);
                }
                lease.spec = Some(self.desired_spec(lease.spec.as_ref(), now));
                leases.replace(LEASE_NAME, &PostParams::default(), &lease).await
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                info!("Creating lease {} for {}", LEASE_NAME, self.identity);
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(LEASE_NAME.to_string()),
                        namespace: Some(self.namespace.clone()),
                        ..Default::default()
                    },
                    spec: Some(self.desired_spec(None, now)),
                };
                leases.create(&PostParams::default(), &lease).await
            }
            Err(e) => return Err(Error::StdError(StdError::KubeError(e))),
        };

        match result {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => Ok(false),
            Err(e) => Err(Error::StdError(StdError::KubeError(e))),
        }
    }

    /// Keeps the lease renewed for as long as the operator runs.
    ///
    /// Reconcile passes only read `status`, so a long pass never outlives the
    /// lease it started under. A failed renewal drops leadership until the
    /// next successful one.
    pub async fn run(self, status: LeaderStatus) {
        let mut interval = tokio::time::interval(Duration::from_secs(RENEW_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let leading = match self.try_acquire_or_renew().await {
                Ok(leading) => leading,
                Err(e) => {
                    warn!("Lease {} renewal failed: {}", LEASE_NAME, e);
                    false
                }
            };
            if leading != status.is_leader() {
                info!("{} leadership of {}: {}", self.identity, LEASE_NAME, leading);
            }
            status.set(leading);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held_by(holder: &str, renewed: DateTime<Utc>) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(holder.to_string()),
            lease_duration_seconds: Some(LEASE_DURATION_SECS),
            renew_time: Some(MicroTime(renewed)),
            ..Default::default()
        }
    }

    #[test]
    fn free_lease_is_claimable() {
        let now = Utc::now();
        assert!(lease_is_claimable(None, "operator-0", now));
        assert!(lease_is_claimable(Some(&LeaseSpec::default()), "operator-0", now));
    }

    #[test]
    fn our_lease_is_renewable() {
        let now = Utc::now();
        let spec = held_by("operator-0", now - ChronoDuration::seconds(5));
        assert!(lease_is_claimable(Some(&spec), "operator-0", now));
    }

    #[test]
    fn live_lease_of_another_replica_is_not() {
        let now = Utc::now();
        let spec = held_by("operator-1", now - ChronoDuration::seconds(5));
        assert!(!lease_is_claimable(Some(&spec), "operator-0", now));
    }

    #[test]
    fn expired_lease_is_claimable() {
        let now = Utc::now();
        let spec = held_by("operator-1", now - ChronoDuration::seconds(60));
        assert!(lease_is_claimable(Some(&spec), "operator-0", now));
    }

    #[test]
    fn renewed_lease_stays_held_through_a_long_pass() {
        let start = Utc::now();
        let renew = ChronoDuration::seconds(RENEW_INTERVAL_SECS as i64);
        // the holder renews on every tick while another replica checks every second
        for second in 0..120 {
            let now = start + ChronoDuration::seconds(second);
            let ticks = (now - start).num_seconds() / renew.num_seconds();
            let spec = held_by("operator-0", start + renew * ticks as i32);
            assert!(
                !lease_is_claimable(Some(&spec), "operator-1", now),
                "lease claimable {second}s into the pass"
            );
        }
    }

    #[test]
    fn lease_expires_once_renewals_stop() {
        let renewed = Utc::now();
        let spec = held_by("operator-0", renewed);
        let expiry = renewed + ChronoDuration::seconds(i64::from(LEASE_DURATION_SECS));
        assert!(!lease_is_claimable(Some(&spec), "operator-1", expiry));
        assert!(lease_is_claimable(Some(&spec), "operator-1", expiry + ChronoDuration::seconds(1)));
    }

    #[test]
    fn status_starts_as_follower() {
        let status = LeaderStatus::default();
        assert!(!status.is_leader());
        let shared = status.clone();
        shared.set(true);
        assert!(status.is_leader());
    }
}
