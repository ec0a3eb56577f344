// SPDX-License-Identifier: GPL-3.0-only

//! The data model of §3: [`Profile`], [`Degradation`] and [`Hold`].

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// Discrete power-management intent, ordered `PowerSaver < Balanced <
/// Performance`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum Profile {
    PowerSaver,
    Balanced,
    Performance,
}

impl Profile {
    pub const ALL: [Profile; 3] = [Profile::PowerSaver, Profile::Balanced, Profile::Performance];

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::PowerSaver => "power-saver",
            Profile::Balanced => "balanced",
            Profile::Performance => "performance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "power-saver" => Some(Profile::PowerSaver),
            "balanced" => Some(Profile::Balanced),
            "performance" => Some(Profile::Performance),
            _ => None,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl Default for Profile {
    fn default() -> Self { Profile::Balanced }
}

/// A reason tag explaining why `performance` cannot be fully realized.
pub type Degradation = BTreeSet<&'static str>;

pub const DEGRADATION_LAP_DETECTED: &str = "lap-detected";
pub const DEGRADATION_HIGH_TEMPERATURE: &str = "high-operating-temperature";

/// Joins a degradation set the way `PerformanceDegraded` is serialized:
/// comma-separated, in the set's natural (sorted, stable) order.
pub fn join_degradation(set: &Degradation) -> String {
    set.iter().copied().collect::<Vec<_>>().join(",")
}

/// One entry of the `Profiles` bus property (§3 `DriverDescriptor`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriverDescriptor {
    pub profile: Profile,
    /// `placeholder`, `multiple`, or the single backing driver's name.
    pub driver: &'static str,
    pub cpu_driver: Option<&'static str>,
    pub platform_driver: Option<&'static str>,
}

/// A client-owned reservation forcing the effective profile (§3 `Hold`).
/// Only `PowerSaver` and `Performance` are valid hold profiles.
#[derive(Clone, Debug)]
pub struct Hold {
    pub cookie: u32,
    pub profile: Profile,
    pub reason: String,
    pub application_id: String,
    pub owner: String,
}

/// Monotonic, never-zero, never-reused-while-active cookie allocator.
#[derive(Debug, Default)]
pub struct CookieAllocator {
    next: u32,
}

impl CookieAllocator {
    pub fn new() -> Self { Self { next: 1 } }

    pub fn allocate(&mut self) -> u32 {
        let cookie = self.next;
        // Cookie 0 is reserved; wrapping past it skips back to 1. In practice
        // a process would need to outlive 2^32 holds for this to matter.
        self.next = self.next.wrapping_add(1);
        if self.next == 0 {
            self.next = 1;
        }
        cookie
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_ordering() {
        assert!(Profile::PowerSaver < Profile::Balanced);
        assert!(Profile::Balanced < Profile::Performance);
    }

    #[test]
    fn round_trips_through_string() {
        for p in Profile::ALL {
            assert_eq!(Profile::parse(p.as_str()), Some(p));
        }
        assert_eq!(Profile::parse("bogus"), None);
    }

    #[test]
    fn cookies_are_dense_nonzero_and_monotonic() {
        let mut alloc = CookieAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert!(b > a);
    }

    #[test]
    fn degradation_join_is_sorted_and_stable() {
        let mut set = Degradation::new();
        set.insert(DEGRADATION_LAP_DETECTED);
        set.insert(DEGRADATION_HIGH_TEMPERATURE);
        assert_eq!(join_degradation(&set), "high-operating-temperature,lap-detected");
    }
}
