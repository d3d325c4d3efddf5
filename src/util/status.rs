use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

use crate::reconciler::UnitStatus;

pub const READY_CONDITION: &str = "Ready";

/// Sets the corresponding condition in conditions to new_condition and returns
/// a tuple containing the new conditions vector and whether it was changed.
///
/// LastTransitionTime only moves when the status flips, or when the condition is new.
pub fn set_status_condition(
    conditions: &[Condition],
    mut new_condition: Condition,
) -> (Vec<Condition>, bool) {
    let mut new_conditions = Vec::from(conditions);

    let Some(existing) = new_conditions
        .iter_mut()
        .find(|c| c.type_ == new_condition.type_)
    else {
        new_condition.last_transition_time = Time(Utc::now());
        new_conditions.push(new_condition);
        return (new_conditions, true);
    };

    let mut changed = false;
    if existing.status != new_condition.status {
        existing.status = new_condition.status;
        existing.last_transition_time = Time(Utc::now());
        changed = true;
    }
    if existing.reason != new_condition.reason {
        existing.reason = new_condition.reason;
        changed = true;
    }
    if existing.message != new_condition.message {
        existing.message = new_condition.message;
        changed = true;
    }
    if existing.observed_generation != new_condition.observed_generation {
        existing.observed_generation = new_condition.observed_generation;
        changed = true;
    }

    (new_conditions, changed)
}

/// Ready condition mirroring the unit status; only Active is `True`.
pub fn ready_condition(status: &UnitStatus, observed_generation: Option<i64>) -> Condition {
    Condition {
        type_: READY_CONDITION.to_string(),
        status: if status.is_active() { "True" } else { "False" }.to_string(),
        reason: status.state().to_string(),
        message: status.message().to_string(),
        last_transition_time: Time(Utc::now()),
        observed_generation,
    }
}
