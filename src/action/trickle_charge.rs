// SPDX-License-Identifier: GPL-3.0-only

//! Forces USB/Device-scoped power supplies to trickle-charge in
//! `power-saver`, and back to fast charging otherwise (§4.4). System-scoped
//! supplies (the machine's own battery) are never touched.

use super::{ActionContext, ActionDriver};
use crate::profile::Profile;

const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

fn applicable_devices(ctx: &ActionContext<'_>) -> Vec<String> {
    ctx.gateway
        .read_dir(POWER_SUPPLY_ROOT)
        .unwrap_or_default()
        .into_iter()
        .filter(|name| {
            let scope_path = format!("{POWER_SUPPLY_ROOT}/{name}/scope");
            let has_charge_type = ctx.gateway.exists(format!("{POWER_SUPPLY_ROOT}/{name}/charge_type"));
            has_charge_type
                && ctx.gateway.read(scope_path).map(|scope| scope == "Device").unwrap_or(false)
        })
        .collect()
}

#[derive(Default)]
pub struct TrickleCharge;

impl ActionDriver for TrickleCharge {
    fn name(&self) -> &'static str { "trickle_charge" }

    fn probe(&mut self, ctx: &ActionContext<'_>) -> bool { !applicable_devices(ctx).is_empty() }

    fn evaluate(&mut self, ctx: &ActionContext<'_>) {
        let value = match ctx.effective_profile {
            Profile::PowerSaver => "Trickle",
            Profile::Balanced | Profile::Performance => "Fast",
        };

        for device in applicable_devices(ctx) {
            let path = format!("{POWER_SUPPLY_ROOT}/{device}/charge_type");
            if let Err(err) = ctx.gateway.write(&path, value) {
                log::warn!("trickle_charge: failed to write {path}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Gateway;

    fn device(dir: &std::path::Path, name: &str, scope: &str) {
        let path = dir.join("sys/class/power_supply").join(name);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("scope"), scope).unwrap();
        std::fs::write(path.join("charge_type"), "Fast").unwrap();
    }

    fn ctx<'a>(gateway: &'a Gateway, profile: Profile) -> ActionContext<'a> {
        ActionContext { gateway, effective_profile: profile, battery_percentage: None }
    }

    #[test]
    fn only_device_scope_is_forced_to_trickle() {
        let dir = tempfile::tempdir().unwrap();
        device(dir.path(), "usb-mouse", "Device");
        device(dir.path(), "BAT0", "System");
        let gateway = Gateway::rooted(dir.path());

        let mut action = TrickleCharge;
        assert!(action.probe(&ctx(&gateway, Profile::Balanced)));
        action.evaluate(&ctx(&gateway, Profile::PowerSaver));

        assert_eq!(
            gateway.read("sys/class/power_supply/usb-mouse/charge_type").unwrap(),
            "Trickle"
        );
        assert_eq!(gateway.read("sys/class/power_supply/BAT0/charge_type").unwrap(), "Fast");
    }

    #[test]
    fn non_power_saver_profiles_use_fast_charging() {
        let dir = tempfile::tempdir().unwrap();
        device(dir.path(), "usb-mouse", "Device");
        let gateway = Gateway::rooted(dir.path());
        gateway.write("sys/class/power_supply/usb-mouse/charge_type", "Trickle").unwrap();

        let mut action = TrickleCharge;
        action.evaluate(&ctx(&gateway, Profile::Performance));
        assert_eq!(gateway.read("sys/class/power_supply/usb-mouse/charge_type").unwrap(), "Fast");
    }

    #[test]
    fn probe_is_false_with_no_applicable_devices() {
        let dir = tempfile::tempdir().unwrap();
        device(dir.path(), "BAT0", "System");
        let gateway = Gateway::rooted(dir.path());
        let mut action = TrickleCharge;
        assert!(!action.probe(&ctx(&gateway, Profile::Balanced)));
    }
}
