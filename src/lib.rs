/// Custom resource definitions
pub mod api;

/// Typed, validated view of the resource spec
pub mod config;

/// Expose all controller components used by main
pub mod controller;
pub use crate::controller::*;

/// Rendering of the CU configuration file
pub mod cu_config;

/// Lease based leadership
pub mod leader;

/// Multus network attachments
pub mod network;

/// Privileged security context on the workload StatefulSet
pub mod privileged;

/// Ports exposed on the workload Service
pub mod service;

/// Gate evaluation and convergence of one unit
pub mod reconciler;

/// Relation data exchanged with peer applications
pub mod relations;

/// Errors, metrics, status conditions and telemetry
pub mod util;

/// The workload container and its process supervisor
pub mod workload;

#[cfg(test)]
pub mod fixtures;
