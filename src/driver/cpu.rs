// SPDX-License-Identifier: GPL-3.0-only

//! The Intel P-State / AMD P-State CPU driver (§4.3). A single
//! implementation parameterized by [`Vendor`], since the two backends
//! differ only in which sysfs nodes exist and which string values they
//! accept — the per-policy write sequence is identical.

use super::{DriverContext, DriverKind, ProbeOutcome, ProfileDriver};
use crate::{
    errors::DriverIoFailed,
    gateway::Gateway,
    profile::{Degradation, Profile, DEGRADATION_HIGH_TEMPERATURE},
};
use std::collections::BTreeSet;

const CPUFREQ_ROOT: &str = "/sys/devices/system/cpu/cpufreq";
const BOOST_PATH: &str = "/sys/devices/system/cpu/cpufreq/boost";
const PM_PROFILE_PATH: &str = "/sys/firmware/acpi/pm_profile";
const SERVER_PM_PROFILE: &str = "4";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Vendor {
    Intel,
    Amd,
}

impl Vendor {
    fn status_path(self) -> &'static str {
        match self {
            Vendor::Intel => "/sys/devices/system/cpu/intel_pstate/status",
            Vendor::Amd => "/sys/devices/system/cpu/amd_pstate/status",
        }
    }

    fn no_turbo_path(self) -> &'static str { "/sys/devices/system/cpu/intel_pstate/no_turbo" }

    fn driver_name(self) -> &'static str {
        match self {
            Vendor::Intel => "intel_pstate",
            Vendor::Amd => "amd_pstate",
        }
    }
}

pub struct CpuDriver {
    vendor: Vendor,
    policies: Vec<String>,
}

impl CpuDriver {
    pub fn new(vendor: Vendor) -> Self { Self { vendor, policies: Vec::new() } }

    fn policy_path(&self, policy: &str, leaf: &str) -> String {
        format!("{CPUFREQ_ROOT}/{policy}/{leaf}")
    }

    fn energy_performance_preference(&self, profile: Profile, on_battery: bool) -> &'static str {
        match (self.vendor, profile) {
            (Vendor::Amd, Profile::PowerSaver) => "power",
            (Vendor::Amd, Profile::Balanced) => {
                if on_battery {
                    "balance_power"
                } else {
                    "balance_performance"
                }
            }
            (Vendor::Amd, Profile::Performance) => "performance",
            (Vendor::Intel, Profile::PowerSaver) => {
                if on_battery {
                    "balance_power"
                } else {
                    "balance_performance"
                }
            }
            (Vendor::Intel, Profile::Balanced) => {
                if on_battery {
                    "balance_power"
                } else {
                    "balance_performance"
                }
            }
            (Vendor::Intel, Profile::Performance) => "performance",
        }
    }

    fn scaling_governor(&self, profile: Profile) -> &'static str {
        match (self.vendor, profile) {
            (Vendor::Amd, Profile::Performance) => "performance",
            _ => "powersave",
        }
    }

    fn write_policy(
        &self,
        ctx: &DriverContext<'_>,
        policy: &str,
        profile: Profile,
    ) -> Result<(), DriverIoFailed> {
        let gateway = ctx.gateway;
        let fail = |err| DriverIoFailed::from_gateway(self.name(), err);

        gateway
            .write(
                self.policy_path(policy, "energy_performance_preference"),
                self.energy_performance_preference(profile, ctx.on_battery),
            )
            .map_err(fail)?;

        gateway
            .write(self.policy_path(policy, "scaling_governor"), self.scaling_governor(profile))
            .map_err(fail)?;

        let min_nonlinear_path = self.policy_path(policy, "amd_pstate_lowest_nonlinear_freq");
        if gateway.exists(&min_nonlinear_path) {
            let target = match profile {
                Profile::PowerSaver => gateway.read(self.policy_path(policy, "cpuinfo_min_freq")),
                Profile::Balanced | Profile::Performance => gateway.read(&min_nonlinear_path),
            };
            if let Ok(value) = target {
                gateway.write(self.policy_path(policy, "scaling_min_freq"), value).map_err(fail)?;
            }
        }

        let epb_path = self.policy_path(policy, "cpu0/power/energy_perf_bias");
        if matches!(self.vendor, Vendor::Intel) && gateway.exists(&epb_path) {
            let value = match profile {
                Profile::PowerSaver => "15",
                Profile::Balanced => "6",
                Profile::Performance => "0",
            };
            gateway.write(&epb_path, value).map_err(fail)?;
        }

        Ok(())
    }

    fn write_boost(&self, ctx: &DriverContext<'_>, profile: Profile) -> Result<(), DriverIoFailed> {
        if !ctx.gateway.exists(BOOST_PATH) {
            return Ok(());
        }

        let value = match profile {
            Profile::Performance => Some("1"),
            Profile::PowerSaver => Some("0"),
            Profile::Balanced => None,
        };

        if let Some(value) = value {
            ctx.gateway
                .write(BOOST_PATH, value)
                .map_err(|err| DriverIoFailed::from_gateway(self.name(), err))?;
        }

        Ok(())
    }
}

impl ProfileDriver for CpuDriver {
    fn name(&self) -> &'static str { self.vendor.driver_name() }

    fn as_any(&self) -> &dyn std::any::Any { self }

    fn kind(&self) -> DriverKind { DriverKind::Cpu }

    fn probe(&mut self, ctx: &DriverContext<'_>) -> ProbeOutcome {
        if ctx.gateway.read(PM_PROFILE_PATH).map(|v| v == SERVER_PM_PROFILE).unwrap_or(false) {
            return ProbeOutcome::Unavailable;
        }

        match ctx.gateway.read(self.vendor.status_path()) {
            Ok(status) if status == "active" => {}
            _ => return ProbeOutcome::Unavailable,
        }

        self.policies = ctx
            .gateway
            .read_dir(CPUFREQ_ROOT)
            .unwrap_or_default()
            .into_iter()
            .filter(|name| name.starts_with("policy"))
            .collect();

        if self.policies.is_empty() {
            return ProbeOutcome::Unavailable;
        }

        ProbeOutcome::Probed(Profile::ALL.into_iter().collect())
    }

    fn profiles_supported(&self) -> BTreeSet<Profile> { Profile::ALL.into_iter().collect() }

    fn activate(&mut self, ctx: &DriverContext<'_>, profile: Profile) -> Result<(), DriverIoFailed> {
        for policy in self.policies.clone() {
            self.write_policy(ctx, &policy, profile)?;
        }
        self.write_boost(ctx, profile)?;
        Ok(())
    }

    fn degradation(&self, ctx: &DriverContext<'_>) -> Degradation {
        let mut set = Degradation::new();
        if matches!(self.vendor, Vendor::Intel) {
            if let Ok(value) = ctx.gateway.read(self.vendor.no_turbo_path()) {
                if value == "1" {
                    set.insert(DEGRADATION_HIGH_TEMPERATURE);
                }
            }
        }
        set
    }

    fn on_resume(&mut self, ctx: &DriverContext<'_>, effective: Profile) {
        if ctx.disable_logind {
            return;
        }
        if let Err(why) = self.activate(ctx, effective) {
            log::warn!("{}: failed to reapply profile on resume: {why}", self.name());
        }
    }
}

/// Builds both vendor drivers for the registry; each independently probes
/// and only one is expected to succeed on a given host.
pub fn candidates() -> Vec<Box<dyn ProfileDriver>> {
    vec![Box::new(CpuDriver::new(Vendor::Intel)), Box::new(CpuDriver::new(Vendor::Amd))]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_policy(dir: &std::path::Path, vendor: Vendor) {
        std::fs::create_dir_all(dir.join("sys/devices/system/cpu/cpufreq/policy0")).unwrap();
        let status_path = match vendor {
            Vendor::Intel => "sys/devices/system/cpu/intel_pstate",
            Vendor::Amd => "sys/devices/system/cpu/amd_pstate",
        };
        std::fs::create_dir_all(dir.join(status_path)).unwrap();
        std::fs::write(dir.join(status_path).join("status"), "active").unwrap();
    }

    fn ctx(gateway: &Gateway, on_battery: bool) -> DriverContext<'_> {
        DriverContext { gateway, on_battery, disable_logind: false }
    }

    #[test]
    fn amd_performance_uses_performance_governor() {
        let dir = tempfile::tempdir().unwrap();
        setup_policy(dir.path(), Vendor::Amd);
        let gateway = Gateway::rooted(dir.path());
        let mut driver = CpuDriver::new(Vendor::Amd);
        let c = ctx(&gateway, false);
        assert!(matches!(driver.probe(&c), ProbeOutcome::Probed(_)));
        driver.activate(&c, Profile::Performance).unwrap();
        assert_eq!(
            gateway.read("sys/devices/system/cpu/cpufreq/policy0/scaling_governor").unwrap(),
            "performance"
        );
        assert_eq!(
            gateway
                .read("sys/devices/system/cpu/cpufreq/policy0/energy_performance_preference")
                .unwrap(),
            "performance"
        );
    }

    #[test]
    fn amd_balanced_on_battery_uses_balance_power() {
        let dir = tempfile::tempdir().unwrap();
        setup_policy(dir.path(), Vendor::Amd);
        let gateway = Gateway::rooted(dir.path());
        let mut driver = CpuDriver::new(Vendor::Amd);
        let c = ctx(&gateway, true);
        driver.probe(&c);
        driver.activate(&c, Profile::Balanced).unwrap();
        assert_eq!(
            gateway
                .read("sys/devices/system/cpu/cpufreq/policy0/energy_performance_preference")
                .unwrap(),
            "balance_power"
        );

        let off_battery = ctx(&gateway, false);
        driver.activate(&off_battery, Profile::Balanced).unwrap();
        assert_eq!(
            gateway
                .read("sys/devices/system/cpu/cpufreq/policy0/energy_performance_preference")
                .unwrap(),
            "balance_performance"
        );
    }

    #[test]
    fn intel_power_saver_on_battery_uses_balance_power() {
        let dir = tempfile::tempdir().unwrap();
        setup_policy(dir.path(), Vendor::Intel);
        let gateway = Gateway::rooted(dir.path());
        let mut driver = CpuDriver::new(Vendor::Intel);
        let c = ctx(&gateway, true);
        driver.probe(&c);
        driver.activate(&c, Profile::PowerSaver).unwrap();
        assert_eq!(
            gateway
                .read("sys/devices/system/cpu/cpufreq/policy0/energy_performance_preference")
                .unwrap(),
            "balance_power"
        );
        assert_eq!(
            gateway.read("sys/devices/system/cpu/cpufreq/policy0/scaling_governor").unwrap(),
            "powersave"
        );
    }

    #[test]
    fn passive_status_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        setup_policy(dir.path(), Vendor::Intel);
        let gateway = Gateway::rooted(dir.path());
        gateway.write("sys/devices/system/cpu/intel_pstate/status", "passive").unwrap();
        let mut driver = CpuDriver::new(Vendor::Intel);
        let c = ctx(&gateway, false);
        assert!(matches!(driver.probe(&c), ProbeOutcome::Unavailable));
    }

    #[test]
    fn server_pm_profile_declines_to_probe() {
        let dir = tempfile::tempdir().unwrap();
        setup_policy(dir.path(), Vendor::Amd);
        std::fs::create_dir_all(dir.path().join("sys/firmware/acpi")).unwrap();
        std::fs::write(dir.path().join("sys/firmware/acpi/pm_profile"), "4").unwrap();
        let gateway = Gateway::rooted(dir.path());
        let mut driver = CpuDriver::new(Vendor::Amd);
        let c = ctx(&gateway, false);
        assert!(matches!(driver.probe(&c), ProbeOutcome::Unavailable));
    }

    #[test]
    fn intel_no_turbo_degrades_only_when_set() {
        let dir = tempfile::tempdir().unwrap();
        setup_policy(dir.path(), Vendor::Intel);
        std::fs::write(dir.path().join("sys/devices/system/cpu/intel_pstate/no_turbo"), "0").unwrap();
        let gateway = Gateway::rooted(dir.path());
        let mut driver = CpuDriver::new(Vendor::Intel);
        let c = ctx(&gateway, false);
        driver.probe(&c);
        assert!(driver.degradation(&c).is_empty());

        gateway.write("sys/devices/system/cpu/intel_pstate/no_turbo", "1").unwrap();
        assert!(driver.degradation(&c).contains(DEGRADATION_HIGH_TEMPERATURE));
    }

    #[test]
    fn amd_does_not_report_temperature_degradation() {
        let dir = tempfile::tempdir().unwrap();
        setup_policy(dir.path(), Vendor::Amd);
        let gateway = Gateway::rooted(dir.path());
        let mut driver = CpuDriver::new(Vendor::Amd);
        let c = ctx(&gateway, false);
        driver.probe(&c);
        assert!(driver.degradation(&c).is_empty());
    }

    #[test]
    fn amd_lowest_nonlinear_freq_sets_scaling_min() {
        let dir = tempfile::tempdir().unwrap();
        setup_policy(dir.path(), Vendor::Amd);
        let policy_dir = dir.path().join("sys/devices/system/cpu/cpufreq/policy0");
        std::fs::write(policy_dir.join("amd_pstate_lowest_nonlinear_freq"), "1400000").unwrap();
        std::fs::write(policy_dir.join("cpuinfo_min_freq"), "400000").unwrap();
        let gateway = Gateway::rooted(dir.path());
        let mut driver = CpuDriver::new(Vendor::Amd);
        let c = ctx(&gateway, false);
        driver.probe(&c);

        driver.activate(&c, Profile::Balanced).unwrap();
        assert_eq!(gateway.read(policy_dir.join("scaling_min_freq")).unwrap(), "1400000");

        driver.activate(&c, Profile::PowerSaver).unwrap();
        assert_eq!(gateway.read(policy_dir.join("scaling_min_freq")).unwrap(), "400000");
    }
}
