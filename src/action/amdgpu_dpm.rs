// SPDX-License-Identifier: GPL-3.0-only

//! Sets the AMDGPU dynamic power management force level per profile (§4.4).
//! A user's explicit `manual` selection is never overridden.

use super::{is_amd_cpu, ActionContext, ActionDriver};
use crate::profile::Profile;

const DRM_ROOT: &str = "/sys/class/drm";

fn force_level_paths(ctx: &ActionContext<'_>) -> Vec<String> {
    ctx.gateway
        .read_dir(DRM_ROOT)
        .unwrap_or_default()
        .into_iter()
        .filter(|name| name.starts_with("card") && !name.contains('-'))
        .map(|name| format!("{DRM_ROOT}/{name}/device/power_dpm_force_performance_level"))
        .filter(|path| ctx.gateway.exists(path))
        .collect()
}

#[derive(Default)]
pub struct AmdgpuDpm;

impl ActionDriver for AmdgpuDpm {
    fn name(&self) -> &'static str { "amdgpu_dpm" }

    fn probe(&mut self, ctx: &ActionContext<'_>) -> bool {
        is_amd_cpu(ctx.gateway) && !force_level_paths(ctx).is_empty()
    }

    fn evaluate(&mut self, ctx: &ActionContext<'_>) {
        let value = match ctx.effective_profile {
            Profile::PowerSaver => "low",
            Profile::Balanced | Profile::Performance => "auto",
        };

        for path in force_level_paths(ctx) {
            match ctx.gateway.read(&path) {
                Ok(current) if current == "manual" => continue,
                _ => {}
            }
            if let Err(err) = ctx.gateway.write(&path, value) {
                log::warn!("amdgpu_dpm: failed to write {path}: {err}");
            }
        }
    }
}
