// SPDX-License-Identifier: GPL-3.0-only

//! Persisted daemon state (§3, §6): the last manually-selected profile,
//! saved atomically and reloaded at startup. Tolerates a missing or corrupt
//! file by falling back to `balanced`, per §6.

use crate::profile::Profile;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::{Path, PathBuf}};

const DEFAULT_STATE_DIR: &str = "/var/lib/power-profiles-arbiter";
const STATE_FILE: &str = "state.toml";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct State {
    #[serde(default)]
    pub last_manual_profile: StoredProfile,
}

impl Default for State {
    fn default() -> Self { Self { last_manual_profile: StoredProfile(Profile::Balanced) } }
}

/// Newtype so `Profile` can round-trip through TOML via its `&str` form
/// rather than leaking the enum's Rust variant names into the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredProfile(pub Profile);

impl Default for StoredProfile {
    fn default() -> Self { Self(Profile::Balanced) }
}

impl Serialize for StoredProfile {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for StoredProfile {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self(Profile::parse(&raw).unwrap_or(Profile::Balanced)))
    }
}

pub struct Config {
    path: PathBuf,
}

impl Config {
    pub fn new() -> Self { Self::at(Path::new(DEFAULT_STATE_DIR).join(STATE_FILE)) }

    pub fn at(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

    /// Loads the persisted state, defaulting to `balanced` on any I/O or
    /// parse failure rather than failing startup over it.
    pub fn load(&self) -> State {
        match fs::read_to_string(&self.path) {
            Ok(raw) => toml::from_str(&raw).unwrap_or_else(|why| {
                log::warn!("config: {:?} is corrupt ({why}), defaulting to balanced", self.path);
                State::default()
            }),
            Err(why) if why.kind() == io::ErrorKind::NotFound => State::default(),
            Err(why) => {
                log::warn!("config: failed to read {:?} ({why}), defaulting to balanced", self.path);
                State::default()
            }
        }
    }

    /// Atomically writes `state`: serialize to a sibling temp file, then
    /// rename over the target so a concurrent reader never observes a
    /// partial write.
    pub fn save(&self, state: &State) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let serialized =
            toml::to_string_pretty(state).map_err(|why| io::Error::new(io::ErrorKind::Other, why))?;

        let tmp_path = self.path.with_extension("toml.tmp");
        fs::write(&tmp_path, serialized)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_defaults_to_balanced() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::at(dir.path().join("missing.toml"));
        assert_eq!(config.load().last_manual_profile.0, Profile::Balanced);
    }

    #[test]
    fn corrupt_file_defaults_to_balanced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, "not valid toml {{{").unwrap();
        let config = Config::at(path);
        assert_eq!(config.load().last_manual_profile.0, Profile::Balanced);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::at(dir.path().join("state.toml"));
        let state = State { last_manual_profile: StoredProfile(Profile::PowerSaver) };
        config.save(&state).unwrap();
        assert_eq!(config.load(), state);
    }

    #[test]
    fn save_is_atomic_no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::at(dir.path().join("state.toml"));
        config.save(&State::default()).unwrap();
        assert!(!dir.path().join("state.toml.tmp").exists());
        assert!(dir.path().join("state.toml").exists());
    }
}
