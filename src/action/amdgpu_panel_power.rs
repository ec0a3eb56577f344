// SPDX-License-Identifier: GPL-3.0-only

//! Tunes panel power-savings on connected AMDGPU outputs by battery band
//! (§4.4). With no upower attached the action stays idle rather than
//! guessing a battery level.

use super::{is_amd_cpu, ActionContext, ActionDriver};
use crate::profile::Profile;

const DRM_ROOT: &str = "/sys/class/drm";

fn connector_paths(ctx: &ActionContext<'_>) -> Vec<String> {
    ctx.gateway
        .read_dir(DRM_ROOT)
        .unwrap_or_default()
        .into_iter()
        .filter(|name| name.starts_with("card") && name.contains('-'))
        .filter(|name| {
            ctx.gateway
                .read(format!("{DRM_ROOT}/{name}/status"))
                .map(|status| status == "connected")
                .unwrap_or(false)
        })
        .map(|name| format!("{DRM_ROOT}/{name}/amdgpu/panel_power_savings"))
        .filter(|path| ctx.gateway.exists(path))
        .collect()
}

/// Picks the savings level for `profile` at `battery_percentage` (§4.4).
fn level_for(profile: Profile, battery_percentage: f64) -> &'static str {
    match profile {
        Profile::Performance => "0",
        Profile::Balanced => {
            if battery_percentage >= 30.0 {
                "0"
            } else {
                "1"
            }
        }
        Profile::PowerSaver => {
            if battery_percentage >= 50.0 {
                "0"
            } else if battery_percentage >= 20.0 {
                "1"
            } else {
                "3"
            }
        }
    }
}

#[derive(Default)]
pub struct AmdgpuPanelPower;

impl ActionDriver for AmdgpuPanelPower {
    fn name(&self) -> &'static str { "amdgpu_panel_power" }

    fn probe(&mut self, ctx: &ActionContext<'_>) -> bool {
        is_amd_cpu(ctx.gateway) && !connector_paths(ctx).is_empty()
    }

    fn evaluate(&mut self, ctx: &ActionContext<'_>) {
        let Some(percentage) = ctx.battery_percentage else {
            return;
        };

        let value = level_for(ctx.effective_profile, percentage);
        for path in connector_paths(ctx) {
            if let Err(err) = ctx.gateway.write(&path, value) {
                log::warn!("amdgpu_panel_power: failed to write {path}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Gateway;

    fn connector(dir: &std::path::Path, name: &str, status: &str) {
        let base = dir.join("sys/class/drm").join(name);
        std::fs::create_dir_all(base.join("amdgpu")).unwrap();
        std::fs::write(base.join("status"), status).unwrap();
        std::fs::write(base.join("amdgpu/panel_power_savings"), "0").unwrap();
    }

    fn amd_cpuinfo(dir: &std::path::Path) {
        std::fs::create_dir_all(dir.join("proc")).unwrap();
        std::fs::write(dir.join("proc/cpuinfo"), "vendor_id\t: AuthenticAMD\ncpu family\t: 25\n").unwrap();
    }

    fn ctx(gateway: &Gateway, profile: Profile, battery_percentage: Option<f64>) -> ActionContext<'_> {
        ActionContext { gateway, effective_profile: profile, battery_percentage }
    }

    #[test]
    fn power_saver_bands() {
        let dir = tempfile::tempdir().unwrap();
        connector(dir.path(), "card0-DP-1", "connected");
        amd_cpuinfo(dir.path());
        let gateway = Gateway::rooted(dir.path());
        let mut action = AmdgpuPanelPower;
        assert!(action.probe(&ctx(&gateway, Profile::Balanced, None)));

        let path = "sys/class/drm/card0-DP-1/amdgpu/panel_power_savings";

        action.evaluate(&ctx(&gateway, Profile::PowerSaver, Some(70.0)));
        assert_eq!(gateway.read(path).unwrap(), "0");

        action.evaluate(&ctx(&gateway, Profile::PowerSaver, Some(49.0)));
        assert_eq!(gateway.read(path).unwrap(), "1");

        action.evaluate(&ctx(&gateway, Profile::PowerSaver, Some(15.0)));
        assert_eq!(gateway.read(path).unwrap(), "3");
    }

    #[test]
    fn disconnected_outputs_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        connector(dir.path(), "card0-DP-1", "disconnected");
        let gateway = Gateway::rooted(dir.path());
        let mut action = AmdgpuPanelPower;
        assert!(!action.probe(&ctx(&gateway, Profile::Balanced, Some(50.0))));
    }

    #[test]
    fn non_amd_host_is_not_probed() {
        let dir = tempfile::tempdir().unwrap();
        connector(dir.path(), "card0-DP-1", "connected");
        std::fs::create_dir_all(dir.path().join("proc")).unwrap();
        std::fs::write(dir.path().join("proc/cpuinfo"), "vendor_id\t: GenuineIntel\n").unwrap();
        let gateway = Gateway::rooted(dir.path());
        let mut action = AmdgpuPanelPower;
        assert!(!action.probe(&ctx(&gateway, Profile::Balanced, Some(50.0))));
    }

    #[test]
    fn without_upower_stays_idle() {
        let dir = tempfile::tempdir().unwrap();
        connector(dir.path(), "card0-DP-1", "connected");
        let gateway = Gateway::rooted(dir.path());
        gateway
            .write("sys/class/drm/card0-DP-1/amdgpu/panel_power_savings", "0")
            .unwrap();
        let mut action = AmdgpuPanelPower;
        action.evaluate(&ctx(&gateway, Profile::PowerSaver, None));
        assert_eq!(
            gateway.read("sys/class/drm/card0-DP-1/amdgpu/panel_power_savings").unwrap(),
            "0"
        );
    }
}
