// SPDX-License-Identifier: GPL-3.0-only

//! The profile driver capability contract (§4.3) and its concrete backends.
//! Modeled as a narrow trait implemented by a handful of variants rather
//! than a class hierarchy, per §9: each driver owns no shared state, and
//! receives a [`DriverContext`] at call time.

pub mod cpu;
pub mod fake;
pub mod placeholder;
pub mod platform;

use crate::{
    errors::DriverIoFailed,
    gateway::Gateway,
    profile::{Degradation, Profile},
};
use std::collections::BTreeSet;

/// What `kind()` reports, used to fix the activation order in §4.5 step 3
/// (`Cpu` before `Platform`) and to compose `DriverDescriptor.Driver`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DriverKind {
    Cpu,
    Platform,
    Fake,
}

/// Outcome of a one-time probe at startup.
pub enum ProbeOutcome {
    /// The driver is usable; carries the profiles it backs.
    Probed(BTreeSet<Profile>),
    /// The underlying kernel node doesn't exist yet but may appear later;
    /// `watch_path` names the path the arbiter should subscribe for
    /// re-probing (§4.3 `platform_profile` deferred-choices case).
    Deferred { watch_path: std::path::PathBuf },
    /// Not applicable to this host; never reconsidered.
    Unavailable,
}

/// Environment visible to a driver at probe and activation time.
pub struct DriverContext<'a> {
    pub gateway: &'a Gateway,
    pub on_battery: bool,
    pub disable_logind: bool,
}

/// Capability contract implemented by each hardware backend (§4.3).
pub trait ProfileDriver: Send + std::any::Any {
    /// Stable identifier published as `Driver`/`CpuDriver`/`PlatformDriver`.
    fn name(&self) -> &'static str;

    /// Lets the arbiter recover a concrete driver type for the few
    /// operations (§4.8 firmware-edit mapping) that aren't part of the
    /// generic contract. Implementations are always `fn as_any(&self) -> &dyn Any { self }`.
    fn as_any(&self) -> &dyn std::any::Any;

    fn kind(&self) -> DriverKind;

    /// Probes the driver against the current host. Called once at startup
    /// (and again after a deferred watch path fires).
    fn probe(&mut self, ctx: &DriverContext<'_>) -> ProbeOutcome;

    /// The subset of `{power-saver, balanced, performance}` this driver
    /// backs, valid only after a successful probe.
    fn profiles_supported(&self) -> BTreeSet<Profile>;

    /// Applies `profile`. Must be idempotent; on `Err` must leave the
    /// hardware in a state from which activating the previous profile
    /// succeeds (§4.3).
    fn activate(&mut self, ctx: &DriverContext<'_>, profile: Profile) -> Result<(), DriverIoFailed>;

    /// Pure read of this driver's current contribution to the degradation
    /// set; called whenever a watched input changes (§4.3).
    fn degradation(&self, _ctx: &DriverContext<'_>) -> Degradation { Degradation::new() }

    fn on_battery_changed(&mut self, _ctx: &DriverContext<'_>, _on_battery: bool) {}

    fn on_resume(&mut self, _ctx: &DriverContext<'_>, _effective: Profile) {}

    fn on_suspend(&mut self, _ctx: &DriverContext<'_>) {}

    /// Paths this driver wants the watcher to monitor once probed (e.g.
    /// `dytc_lapmode` for lap-mode transitions).
    fn watched_paths(&self) -> Vec<std::path::PathBuf> { Vec::new() }
}
