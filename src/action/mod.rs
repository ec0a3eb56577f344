// SPDX-License-Identifier: GPL-3.0-only

//! Action drivers (§4.4): side-effect modules that observe the effective
//! profile and environment but do not own it. Unlike profile drivers they
//! never fail the recomputation — a write failure here is logged and
//! otherwise swallowed, since no bus caller is waiting on an action.

pub mod amdgpu_dpm;
pub mod amdgpu_panel_power;
pub mod trickle_charge;

use crate::{gateway::Gateway, profile::Profile};

/// Environment visible to an action at evaluation time.
pub struct ActionContext<'a> {
    pub gateway: &'a Gateway,
    pub effective_profile: Profile,
    /// `None` when upower is disabled or unavailable.
    pub battery_percentage: Option<f64>,
}

/// True if `/proc/cpuinfo` reports an AMD CPU (`vendor_id : AuthenticAMD`),
/// the host gate for the AMD-only actions (§4.4).
pub fn is_amd_cpu(gateway: &Gateway) -> bool {
    gateway
        .read("/proc/cpuinfo")
        .map(|contents| {
            contents.lines().any(|line| {
                let mut parts = line.splitn(2, ':');
                let key = parts.next().map(str::trim);
                let value = parts.next().map(str::trim);
                key == Some("vendor_id") && value == Some("AuthenticAMD")
            })
        })
        .unwrap_or(false)
}

/// Capability contract implemented by each side-effect module (§4.4).
pub trait ActionDriver: Send {
    /// Stable identifier published in the `Actions` bus property.
    fn name(&self) -> &'static str;

    /// Whether this action applies to the current host at all (e.g. an
    /// AMD-only action on an Intel host). Called once at startup.
    fn probe(&mut self, ctx: &ActionContext<'_>) -> bool;

    /// Re-evaluates the action's sysfs knobs against the current state.
    /// Individual write failures are the action's own concern to log; the
    /// arbiter does not roll back on an action failure.
    fn evaluate(&mut self, ctx: &ActionContext<'_>);
}
