// SPDX-License-Identifier: GPL-3.0-only

//! The arbiter (§4.5): single-owner, serial event processor. Owns the
//! selected profile, the hold table, the degradation set, and drives
//! recomputation. Deliberately unaware of the bus — [`crate::bus`] wraps an
//! `Arc<tokio::sync::Mutex<Arbiter>>` and translates [`RecomputeEffects`]
//! into `PropertiesChanged`/`ProfileReleased` signals, the same separation
//! the teacher draws between `PowerDaemon` state and its `#[zbus::interface]`
//! impls.

use crate::{
    action::{ActionContext, ActionDriver},
    config::{Config, State, StoredProfile},
    driver::{DriverContext, DriverKind, ProbeOutcome, ProfileDriver},
    errors::ArbiterError,
    gateway::Gateway,
    profile::{join_degradation, CookieAllocator, Degradation, DriverDescriptor, Hold, Profile},
};
use std::collections::BTreeSet;

/// Bus property names, used so callers of [`Arbiter`] don't need to know
/// the wire-level spelling.
pub const PROP_ACTIVE_PROFILE: &str = "ActiveProfile";
pub const PROP_PERFORMANCE_DEGRADED: &str = "PerformanceDegraded";
pub const PROP_PROFILES: &str = "Profiles";
pub const PROP_ACTIVE_PROFILE_HOLDS: &str = "ActiveProfileHolds";
pub const PROP_ACTIONS: &str = "Actions";

/// What changed as a result of one arbiter event, for the bus layer to act
/// on (§4.5 step 5).
#[derive(Default, Debug)]
pub struct RecomputeEffects {
    pub changed_properties: BTreeSet<&'static str>,
    pub released_cookies: Vec<u32>,
}

impl RecomputeEffects {
    fn merge(&mut self, other: RecomputeEffects) {
        self.changed_properties.extend(other.changed_properties);
        self.released_cookies.extend(other.released_cookies);
    }
}

struct DriverSlot {
    driver: Box<dyn ProfileDriver>,
}

pub struct Arbiter {
    gateway: Gateway,
    config: Config,
    disable_logind: bool,

    profile_drivers: Vec<DriverSlot>,
    action_drivers: Vec<Box<dyn ActionDriver>>,

    selected_profile: Profile,
    last_applied: Option<Profile>,
    holds: Vec<Hold>,
    cookies: CookieAllocator,
    degradation: Degradation,

    on_battery: bool,
    battery_percentage: Option<f64>,
}

impl Arbiter {
    /// Builds an arbiter from already-probed drivers (probing is a startup
    /// concern driven by [`crate::daemon`]; the arbiter only orders and
    /// activates what it is handed). `profile_drivers` must already be
    /// ordered `Cpu` before `Platform`/`Fake`, the fixed order §4.5 step 3
    /// requires.
    pub fn new(
        gateway: Gateway,
        config: Config,
        profile_drivers: Vec<Box<dyn ProfileDriver>>,
        action_drivers: Vec<Box<dyn ActionDriver>>,
        disable_logind: bool,
    ) -> Self {
        let state = config.load();
        Self {
            gateway,
            config,
            disable_logind,
            profile_drivers: profile_drivers.into_iter().map(|driver| DriverSlot { driver }).collect(),
            action_drivers,
            selected_profile: state.last_manual_profile.0,
            last_applied: None,
            holds: Vec::new(),
            cookies: CookieAllocator::new(),
            degradation: Degradation::new(),
            on_battery: false,
            battery_percentage: None,
        }
    }

    /// The lowest-power profile among active holds, or `selected_profile`
    /// when there are none (§3, §4.5 steps 1-2).
    pub fn effective_profile(&self) -> Profile {
        self.holds.iter().map(|hold| hold.profile).min().unwrap_or(self.selected_profile)
    }

    pub fn active_profile(&self) -> Profile { self.last_applied.unwrap_or_else(|| self.effective_profile()) }

    /// Applies the loaded/default profile to the freshly-probed drivers
    /// before the event loop starts (§5): with `last_applied` still `None`,
    /// real sysfs state would otherwise sit unwritten until the first
    /// external stimulus arrives.
    pub fn activate_initial(&mut self) -> RecomputeEffects {
        self.recompute().unwrap_or_default()
    }

    pub fn performance_degraded(&self) -> String { join_degradation(&self.degradation) }

    pub fn holds(&self) -> &[Hold] { &self.holds }

    /// The last `OnBattery`/`Percentage` values observed, so a handler for
    /// one upower property can re-supply the other unchanged (§4.6: each
    /// property is pushed independently over its own stream).
    pub fn on_battery_hint(&self) -> bool { self.on_battery }

    pub fn battery_percentage_hint(&self) -> Option<f64> { self.battery_percentage }

    pub fn actions(&self) -> Vec<&'static str> { self.action_drivers.iter().map(|a| a.name()).collect() }

    pub fn version(&self) -> &'static str { env!("CARGO_PKG_VERSION") }

    /// Builds the `Profiles` bus property (§3 `DriverDescriptor`, §4.3
    /// composition rule).
    pub fn driver_descriptors(&self) -> Vec<DriverDescriptor> {
        Profile::ALL
            .into_iter()
            .filter_map(|profile| {
                let mut cpu = None;
                let mut platform = None;
                for slot in &self.profile_drivers {
                    if !slot.driver.profiles_supported().contains(&profile) {
                        continue;
                    }
                    match slot.driver.kind() {
                        DriverKind::Cpu => cpu = Some(slot.driver.name()),
                        DriverKind::Platform | DriverKind::Fake => platform = Some(slot.driver.name()),
                    }
                }

                let driver = match (cpu, platform) {
                    (Some(_), Some(_)) => Some("multiple"),
                    (Some(name), None) | (None, Some(name)) => Some(name),
                    (None, None) => None,
                }?;

                Some(DriverDescriptor { profile, driver, cpu_driver: cpu, platform_driver: platform })
            })
            .collect()
    }

    fn recompute_degradation(&mut self) -> bool {
        let ctx = DriverContext {
            gateway: &self.gateway,
            on_battery: self.on_battery,
            disable_logind: self.disable_logind,
        };
        let union: Degradation = self.profile_drivers.iter().flat_map(|slot| slot.driver.degradation(&ctx)).collect();
        let changed = union != self.degradation;
        self.degradation = union;
        changed
    }

    fn run_actions(&mut self, effective: Profile) {
        let ctx = ActionContext {
            gateway: &self.gateway,
            effective_profile: effective,
            battery_percentage: self.battery_percentage,
        };
        for action in &mut self.action_drivers {
            action.evaluate(&ctx);
        }
    }

    /// Activates `target` across every profile driver in fixed order,
    /// rolling back to `self.last_applied` on the first failure (§4.5 step 3).
    fn activate(&mut self, target: Profile) -> Result<(), ArbiterError> {
        let ctx = DriverContext {
            gateway: &self.gateway,
            on_battery: self.on_battery,
            disable_logind: self.disable_logind,
        };
        let previous = self.last_applied.unwrap_or(self.selected_profile);
        let mut succeeded = 0;

        for index in 0..self.profile_drivers.len() {
            if let Err(err) = self.profile_drivers[index].driver.activate(&ctx, target) {
                for rollback_index in 0..succeeded {
                    let _ = self.profile_drivers[rollback_index].driver.activate(&ctx, previous);
                }
                return Err(err.into());
            }
            succeeded += 1;
        }

        self.last_applied = Some(target);
        Ok(())
    }

    fn recompute(&mut self) -> Result<RecomputeEffects, ArbiterError> {
        let target = self.effective_profile();
        let previous_active = self.active_profile();

        if self.last_applied != Some(target) {
            self.activate(target)?;
        }

        let mut effects = RecomputeEffects::default();
        if previous_active != self.active_profile() {
            effects.changed_properties.insert(PROP_ACTIVE_PROFILE);
        }
        if self.recompute_degradation() {
            effects.changed_properties.insert(PROP_PERFORMANCE_DEGRADED);
        }

        self.run_actions(self.active_profile());
        Ok(effects)
    }

    fn persist(&self) {
        let state = State { last_manual_profile: StoredProfile(self.selected_profile) };
        if let Err(why) = self.config.save(&state) {
            log::warn!("arbiter: failed to persist state: {why}");
        }
    }

    fn release_all_holds(&mut self) -> Vec<Hold> {
        self.holds.drain(..).collect()
    }

    /// `SelectProfile` (§4.5): clears every hold, persists, recomputes. If
    /// recomputation fails, the drained holds are restored rather than
    /// discarded — a failed attempt must not silently drop a client's hold
    /// with no `ProfileReleased` and no error (§4.5).
    pub fn select_profile(&mut self, profile: Profile) -> Result<RecomputeEffects, ArbiterError> {
        if !self.profile_supported(profile) {
            return Err(ArbiterError::UnsupportedProfile(profile.as_str()));
        }

        let previous_selected = self.selected_profile;
        let released = self.release_all_holds();
        self.selected_profile = profile;

        match self.recompute() {
            Ok(mut effects) => {
                self.persist();
                if !released.is_empty() {
                    effects.changed_properties.insert(PROP_ACTIVE_PROFILE_HOLDS);
                }
                effects.released_cookies = released.iter().map(|hold| hold.cookie).collect();
                Ok(effects)
            }
            Err(err) => {
                self.selected_profile = previous_selected;
                self.holds = released;
                Err(err)
            }
        }
    }

    fn profile_supported(&self, profile: Profile) -> bool {
        self.profile_drivers.iter().any(|slot| slot.driver.profiles_supported().contains(&profile))
    }

    /// `HoldProfile` (§4.5, §3): only `power-saver`/`performance` are valid.
    pub fn hold_profile(
        &mut self,
        profile: Profile,
        reason: String,
        application_id: String,
        owner: String,
    ) -> Result<(u32, RecomputeEffects), ArbiterError> {
        if profile == Profile::Balanced {
            return Err(ArbiterError::UnknownProfile(profile.as_str().to_owned()));
        }
        if !self.profile_supported(profile) {
            return Err(ArbiterError::UnsupportedProfile(profile.as_str()));
        }

        let cookie = self.cookies.allocate();
        self.holds.push(Hold { cookie, profile, reason, application_id, owner });

        let mut effects = self.recompute()?;
        effects.changed_properties.insert(PROP_ACTIVE_PROFILE_HOLDS);
        Ok((cookie, effects))
    }

    /// `ReleaseProfile` (§4.5): a no-op (not an error) if the cookie is
    /// unknown or owned by a different caller — §7 `InvalidCookie`.
    pub fn release_profile(&mut self, cookie: u32, owner: &str) -> Option<RecomputeEffects> {
        let position = self.holds.iter().position(|hold| hold.cookie == cookie && hold.owner == owner)?;
        self.holds.remove(position);

        let mut effects = self.recompute().ok()?;
        effects.changed_properties.insert(PROP_ACTIVE_PROFILE_HOLDS);
        effects.released_cookies.push(cookie);
        Some(effects)
    }

    /// `BusNameLost` (§4.5): releases every hold owned by `name`.
    pub fn bus_name_lost(&mut self, name: &str) -> RecomputeEffects {
        let released: Vec<u32> =
            self.holds.iter().filter(|hold| hold.owner == name).map(|hold| hold.cookie).collect();
        self.holds.retain(|hold| hold.owner != name);

        if released.is_empty() {
            return RecomputeEffects::default();
        }

        let mut effects = self.recompute().unwrap_or_default();
        effects.changed_properties.insert(PROP_ACTIVE_PROFILE_HOLDS);
        effects.released_cookies = released;
        effects
    }

    /// `ExternalProfileEdit` (§4.5, §4.8): a firmware/user key-press edit is
    /// treated exactly like a user-initiated `SelectProfile`.
    pub fn external_profile_edit(&mut self, observed: Profile) -> Result<RecomputeEffects, ArbiterError> {
        self.select_profile(observed)
    }

    pub fn battery_changed(&mut self, on_battery: bool, percentage: Option<f64>) -> RecomputeEffects {
        self.on_battery = on_battery;
        self.battery_percentage = percentage;
        let ctx = DriverContext {
            gateway: &self.gateway,
            on_battery: self.on_battery,
            disable_logind: self.disable_logind,
        };
        for slot in &mut self.profile_drivers {
            slot.driver.on_battery_changed(&ctx, on_battery);
        }
        self.recompute().unwrap_or_default()
    }

    pub fn sleep_edge(&mut self, entering: bool) -> RecomputeEffects {
        let effective = self.active_profile();
        let ctx = DriverContext {
            gateway: &self.gateway,
            on_battery: self.on_battery,
            disable_logind: self.disable_logind,
        };
        for slot in &mut self.profile_drivers {
            if entering {
                slot.driver.on_suspend(&ctx);
            } else {
                slot.driver.on_resume(&ctx, effective);
            }
        }
        RecomputeEffects::default()
    }

    /// A watched driver input changed (lap mode, `no_turbo`, …): re-derive
    /// degradation and re-run actions without touching `selected_profile`.
    pub fn driver_input_changed(&mut self) -> RecomputeEffects {
        let mut effects = RecomputeEffects::default();
        if self.recompute_degradation() {
            effects.changed_properties.insert(PROP_PERFORMANCE_DEGRADED);
        }
        self.run_actions(self.active_profile());
        effects
    }

    /// Every path a probed driver wants the watcher to monitor, paired with
    /// its index in `profile_drivers` (§4.2, §4.3) — used by the daemon to
    /// register inotify watches once after startup.
    pub fn driver_watched_paths(&self) -> Vec<(usize, std::path::PathBuf)> {
        self.profile_drivers
            .iter()
            .enumerate()
            .flat_map(|(index, slot)| slot.driver.watched_paths().into_iter().map(move |path| (index, path)))
            .collect()
    }

    /// §4.8: the `platform_profile` file changed. If it now holds a value
    /// this driver did not itself just write, a firmware key-press or
    /// another process changed it — map the string back to a logical
    /// profile and handle it exactly like `SelectProfile`. A value this
    /// driver wrote itself, or one that maps to no known profile, is
    /// ignored.
    pub fn platform_profile_firmware_changed(&mut self) -> Result<Option<RecomputeEffects>, ArbiterError> {
        let Ok(observed) = self.gateway.read(crate::driver::platform::PROFILE_PATH) else {
            return Ok(None);
        };

        let mapped = self.profile_drivers.iter().find_map(|slot| {
            let platform = slot.driver.as_any().downcast_ref::<crate::driver::platform::PlatformProfile>()?;
            if platform.last_written() == Some(observed.as_str()) {
                return None;
            }
            platform.profile_for_choice(&observed)
        });

        match mapped {
            Some(profile) => self.external_profile_edit(profile).map(Some),
            None => Ok(None),
        }
    }

    /// Re-probes a deferred driver at `index` after its watch path fired,
    /// merging any newly-supported profiles into `Profiles` (§4.3, §8
    /// scenario 8).
    pub fn reprobe(&mut self, index: usize) -> Option<RecomputeEffects> {
        let ctx = DriverContext {
            gateway: &self.gateway,
            on_battery: self.on_battery,
            disable_logind: self.disable_logind,
        };
        let slot = self.profile_drivers.get_mut(index)?;
        match slot.driver.probe(&ctx) {
            ProbeOutcome::Probed(_) => {
                let mut effects = RecomputeEffects::default();
                effects.changed_properties.insert(PROP_PROFILES);
                effects.merge(self.recompute().unwrap_or_default());
                Some(effects)
            }
            _ => None,
        }
    }
}
