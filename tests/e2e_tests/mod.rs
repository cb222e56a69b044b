//! Entitlement scenarios
//!
//! - `entitlements`: stories about workloads consuming the cluster's
//!   entitlement secret, directly from a pod and through a shared secret in a
//!   Shipwright build
//!
//! Every scenario owns its fixtures: they are applied before the body runs and
//! deleted afterwards whatever the outcome.

mod entitlements;
mod helpers;
