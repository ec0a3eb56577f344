// SPDX-License-Identifier: GPL-3.0-only

//! Synthesizes all three profiles with no hardware side effects, enabled by
//! `POWER_PROFILE_DAEMON_FAKE_DRIVER=1` (§4.3, §6). Exists to decouple tests
//! from kernel assumptions — a legitimate variant, not a test-only hack.

use super::{DriverContext, DriverKind, ProbeOutcome, ProfileDriver};
use crate::{errors::DriverIoFailed, profile::Profile};
use std::collections::BTreeSet;

pub const ENV_VAR: &str = "POWER_PROFILE_DAEMON_FAKE_DRIVER";

pub fn enabled_by_env() -> bool {
    std::env::var(ENV_VAR).map(|v| v == "1").unwrap_or(false)
}

#[derive(Default)]
pub struct Fake {
    active: Option<Profile>,
}

impl ProfileDriver for Fake {
    fn name(&self) -> &'static str { "fake" }

    fn as_any(&self) -> &dyn std::any::Any { self }

    fn kind(&self) -> DriverKind { DriverKind::Fake }

    fn probe(&mut self, _ctx: &DriverContext<'_>) -> ProbeOutcome {
        ProbeOutcome::Probed(Profile::ALL.into_iter().collect())
    }

    fn profiles_supported(&self) -> BTreeSet<Profile> { Profile::ALL.into_iter().collect() }

    fn activate(&mut self, _ctx: &DriverContext<'_>, profile: Profile) -> Result<(), DriverIoFailed> {
        self.active = Some(profile);
        Ok(())
    }
}
