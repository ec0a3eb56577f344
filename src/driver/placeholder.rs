// SPDX-License-Identifier: GPL-3.0-only

//! The no-op driver that covers profile values no real driver backs (§4.3).
//! Always available; `activate` never fails.

use super::{DriverContext, DriverKind, ProbeOutcome, ProfileDriver};
use crate::{errors::DriverIoFailed, profile::Profile};
use std::collections::BTreeSet;

pub struct Placeholder {
    supported: BTreeSet<Profile>,
}

impl Placeholder {
    /// A placeholder covering exactly `profiles` — the arbiter constructs
    /// one per profile value left unbacked after real drivers probe.
    pub fn new(profiles: BTreeSet<Profile>) -> Self { Self { supported: profiles } }
}

impl ProfileDriver for Placeholder {
    fn name(&self) -> &'static str { "placeholder" }

    fn as_any(&self) -> &dyn std::any::Any { self }

    fn kind(&self) -> DriverKind { DriverKind::Platform }

    fn probe(&mut self, _ctx: &DriverContext<'_>) -> ProbeOutcome {
        ProbeOutcome::Probed(self.supported.clone())
    }

    fn profiles_supported(&self) -> BTreeSet<Profile> { self.supported.clone() }

    fn activate(&mut self, _ctx: &DriverContext<'_>, _profile: Profile) -> Result<(), DriverIoFailed> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_fails_and_reports_only_assigned_profiles() {
        let mut supported = BTreeSet::new();
        supported.insert(Profile::Performance);
        let mut driver = Placeholder::new(supported.clone());
        assert_eq!(driver.profiles_supported(), supported);

        let gateway = crate::gateway::Gateway::new();
        let ctx = DriverContext { gateway: &gateway, on_battery: false, disable_logind: false };
        assert!(driver.activate(&ctx, Profile::Performance).is_ok());
    }
}
