#![deny(clippy::all)]
#![allow(clippy::missing_safety_doc)]

//! Core of the power profile arbitration daemon: the profile state machine,
//! the driver model, the external-signal reactors, and the authenticated
//! bus surface. See `SPEC_FULL.md` at the repository root for the full
//! behavioral contract.

pub mod action;
pub mod arbiter;
pub mod bus;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod driver;
pub mod errors;
pub mod gateway;
pub mod logging;
pub mod logind;
pub mod polkit;
pub mod profile;
pub mod upower;
pub mod watcher;

/// Primary bus name, mirroring upstream `power-profiles-daemon`.
pub static DBUS_NAME: &str = "org.freedesktop.UPower.PowerProfiles";
pub static DBUS_PATH: &str = "/org/freedesktop/UPower/PowerProfiles";

/// Legacy compatibility name/path kept for clients written against the
/// older `net.hadess.PowerProfiles` interface (e.g. gnome-shell).
pub static HADESS_DBUS_NAME: &str = "net.hadess.PowerProfiles";
pub static HADESS_DBUS_PATH: &str = "/net/hadess/PowerProfiles";
