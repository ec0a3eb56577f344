// SPDX-License-Identifier: GPL-3.0-only

//! The ACPI `platform_profile` driver (§4.3), including the `thinkpad_acpi`
//! lap-mode degradation variant.

use super::{DriverContext, DriverKind, ProbeOutcome, ProfileDriver};
use crate::{
    errors::DriverIoFailed,
    profile::{Degradation, Profile, DEGRADATION_LAP_DETECTED},
};
use std::{collections::BTreeMap, path::PathBuf};

pub const CHOICES_PATH: &str = "/sys/firmware/acpi/platform_profile_choices";
pub const PROFILE_PATH: &str = "/sys/firmware/acpi/platform_profile";
pub const DYTC_LAPMODE_PATH: &str = "/sys/devices/platform/thinkpad_acpi/dytc_lapmode";

/// First-match priority lists per logical profile (§4.3).
const POWER_SAVER_PRIORITY: &[&str] = &["low-power", "quiet", "cool"];
const BALANCED_PRIORITY: &[&str] = &["balanced", "balanced-performance"];
const PERFORMANCE_PRIORITY: &[&str] = &["performance"];

pub struct PlatformProfile {
    /// logical profile -> firmware choice string, only entries this host
    /// actually offers a choice for.
    mapping: BTreeMap<Profile, &'static str>,
    last_written: Option<&'static str>,
    has_lapmode: bool,
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self { mapping: BTreeMap::new(), last_written: None, has_lapmode: false }
    }
}

fn pick(choices: &[&str], priority: &'static [&'static str]) -> Option<&'static str> {
    priority.iter().find(|candidate| choices.contains(candidate)).copied()
}

impl PlatformProfile {
    pub fn new() -> Self { Self::default() }

    /// Maps an observed firmware string (e.g. after an external edit) back
    /// to the logical profile that produces it, for the firmware-write
    /// reactor (§4.8).
    pub fn profile_for_choice(&self, choice: &str) -> Option<Profile> {
        self.mapping.iter().find(|(_, v)| **v == choice).map(|(p, _)| *p)
    }

    pub fn last_written(&self) -> Option<&'static str> { self.last_written }
}

impl ProfileDriver for PlatformProfile {
    fn name(&self) -> &'static str { "platform_profile" }

    fn as_any(&self) -> &dyn std::any::Any { self }

    fn kind(&self) -> DriverKind { DriverKind::Platform }

    fn probe(&mut self, ctx: &DriverContext<'_>) -> ProbeOutcome {
        let raw = match ctx.gateway.read(CHOICES_PATH) {
            Ok(raw) => raw,
            Err(_) => return ProbeOutcome::Unavailable,
        };

        let choices: Vec<&str> = raw.split_whitespace().collect();
        if choices.is_empty() {
            return ProbeOutcome::Deferred { watch_path: PathBuf::from(CHOICES_PATH) };
        }

        self.mapping.clear();
        if let Some(choice) = pick(&choices, POWER_SAVER_PRIORITY) {
            self.mapping.insert(Profile::PowerSaver, choice);
        }
        if let Some(choice) = pick(&choices, BALANCED_PRIORITY) {
            self.mapping.insert(Profile::Balanced, choice);
        }
        if let Some(choice) = pick(&choices, PERFORMANCE_PRIORITY) {
            self.mapping.insert(Profile::Performance, choice);
        }

        self.has_lapmode = ctx.gateway.exists(DYTC_LAPMODE_PATH);

        ProbeOutcome::Probed(self.mapping.keys().copied().collect())
    }

    fn profiles_supported(&self) -> std::collections::BTreeSet<Profile> {
        self.mapping.keys().copied().collect()
    }

    fn activate(&mut self, ctx: &DriverContext<'_>, profile: Profile) -> Result<(), DriverIoFailed> {
        let Some(choice) = self.mapping.get(&profile).copied() else {
            // No driver-level mapping for this profile: nothing to write.
            // The arbiter only calls activate() for profiles this driver
            // reported as supported, so this is defensive.
            return Ok(());
        };

        ctx.gateway
            .write(PROFILE_PATH, choice)
            .map_err(|err| DriverIoFailed::from_gateway(self.name(), err))?;

        self.last_written = Some(choice);
        Ok(())
    }

    fn degradation(&self, ctx: &DriverContext<'_>) -> Degradation {
        let mut set = Degradation::new();
        if self.has_lapmode {
            if let Ok(value) = ctx.gateway.read(DYTC_LAPMODE_PATH) {
                if value.trim() == "1" {
                    set.insert(DEGRADATION_LAP_DETECTED);
                }
            }
        }
        set
    }

    fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(PROFILE_PATH)];
        if self.has_lapmode {
            paths.push(PathBuf::from(DYTC_LAPMODE_PATH));
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Gateway;

    fn write_choices(dir: &std::path::Path, choices: &str) {
        std::fs::create_dir_all(dir.join("sys/firmware/acpi")).unwrap();
        std::fs::write(dir.join("sys/firmware/acpi/platform_profile_choices"), choices).unwrap();
        std::fs::write(dir.join("sys/firmware/acpi/platform_profile"), "balanced").unwrap();
    }

    fn ctx(gateway: &Gateway) -> DriverContext<'_> {
        DriverContext { gateway, on_battery: false, disable_logind: false }
    }

    #[test]
    fn maps_first_match_priority() {
        let dir = tempfile::tempdir().unwrap();
        write_choices(dir.path(), "low-power quiet balanced performance\n");
        let gateway = Gateway::rooted(dir.path());
        let mut driver = PlatformProfile::new();
        let c = ctx(&gateway);
        match driver.probe(&c) {
            ProbeOutcome::Probed(profiles) => assert_eq!(profiles.len(), 3),
            _ => panic!("expected Probed"),
        }
        assert_eq!(driver.mapping[&Profile::PowerSaver], "low-power");
        assert_eq!(driver.mapping[&Profile::Balanced], "balanced");
        assert_eq!(driver.mapping[&Profile::Performance], "performance");
    }

    #[test]
    fn empty_choices_defers() {
        let dir = tempfile::tempdir().unwrap();
        write_choices(dir.path(), "\n");
        let gateway = Gateway::rooted(dir.path());
        let mut driver = PlatformProfile::new();
        let c = ctx(&gateway);
        assert!(matches!(driver.probe(&c), ProbeOutcome::Deferred { .. }));
    }

    #[test]
    fn activate_writes_mapped_choice() {
        let dir = tempfile::tempdir().unwrap();
        write_choices(dir.path(), "cool balanced performance\n");
        let gateway = Gateway::rooted(dir.path());
        let mut driver = PlatformProfile::new();
        let c = ctx(&gateway);
        driver.probe(&c);
        driver.activate(&c, Profile::PowerSaver).unwrap();
        assert_eq!(gateway.read(PROFILE_PATH).unwrap(), "cool");
    }

    #[test]
    fn lapmode_contributes_degradation_only_when_set() {
        let dir = tempfile::tempdir().unwrap();
        write_choices(dir.path(), "low-power balanced performance\n");
        std::fs::create_dir_all(dir.path().join("sys/devices/platform/thinkpad_acpi")).unwrap();
        std::fs::write(dir.path().join("sys/devices/platform/thinkpad_acpi/dytc_lapmode"), "0").unwrap();

        let gateway = Gateway::rooted(dir.path());
        let mut driver = PlatformProfile::new();
        let c = ctx(&gateway);
        driver.probe(&c);
        assert!(driver.degradation(&c).is_empty());

        gateway.write(DYTC_LAPMODE_PATH, "1").unwrap();
        assert!(driver.degradation(&c).contains(DEGRADATION_LAP_DETECTED));
    }

    #[test]
    fn maps_firmware_choice_back_to_profile() {
        let dir = tempfile::tempdir().unwrap();
        write_choices(dir.path(), "low-power balanced performance\n");
        let gateway = Gateway::rooted(dir.path());
        let mut driver = PlatformProfile::new();
        let c = ctx(&gateway);
        driver.probe(&c);
        assert_eq!(driver.profile_for_choice("performance"), Some(Profile::Performance));
        assert_eq!(driver.profile_for_choice("low-power"), Some(Profile::PowerSaver));
        assert_eq!(driver.profile_for_choice("quiet"), None);
    }
}
