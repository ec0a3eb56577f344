// SPDX-License-Identifier: GPL-3.0-only

//! The bus surface (§4.7, §6): `#[zbus::interface]` objects for
//! `org.freedesktop.UPower.PowerProfiles` and the legacy
//! `net.hadess.PowerProfiles` alias, wrapping a single `Arc<Mutex<Arbiter>>`
//! the same way the teacher's `System76Power`/`UPowerPowerProfiles` wrap
//! `Arc<Mutex<PowerDaemon>>`. Every state-changing method first resolves the
//! caller's unique name from the message header and checks it against
//! polkit before touching the arbiter. The object keeps its own
//! `zbus::Connection` (as the teacher's `PowerDaemon` does) so it can build
//! a `SignalContext` itself rather than relying on the macro-injected one —
//! the legacy wrapper needs to re-emit the same changes without a
//! dispatch-time context of its own.

use crate::{
    arbiter::{Arbiter, RecomputeEffects, PROP_ACTIVE_PROFILE, PROP_ACTIVE_PROFILE_HOLDS, PROP_PERFORMANCE_DEGRADED, PROP_PROFILES},
    polkit::{self, ACTION_HOLD_PROFILE, ACTION_SWITCH_PROFILE},
    profile::Profile,
    DBUS_PATH,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use zbus::{fdo, message::Header, zvariant};

fn denied() -> fdo::Error { fdo::Error::AccessDenied("not authorized".into()) }

fn unknown_profile(value: &str) -> fdo::Error { fdo::Error::InvalidArgs(format!("unknown power profile '{value}'")) }

fn from_arbiter_error(err: crate::errors::ArbiterError) -> fdo::Error {
    use crate::errors::ArbiterError;
    match err {
        ArbiterError::DriverIoFailed(why) => fdo::Error::Failed(why.to_string()),
        ArbiterError::PermissionDenied => denied(),
        ArbiterError::UnknownProfile(p) => unknown_profile(&p),
        ArbiterError::UnsupportedProfile(p) => {
            fdo::Error::NotSupported(format!("profile '{p}' is not supported on this system"))
        }
    }
}

async fn authorize(connection: &zbus::Connection, header: &Header<'_>, action: &str) -> fdo::Result<String> {
    let Some(sender) = header.sender().map(|s| s.to_string()) else {
        return Err(denied());
    };
    if polkit::is_authorized(connection, &sender, action).await {
        Ok(sender)
    } else {
        Err(denied())
    }
}

fn profile_to_map(
    profile: Profile,
    driver: &'static str,
    cpu: Option<&'static str>,
    platform: Option<&'static str>,
) -> HashMap<&'static str, zvariant::Value<'static>> {
    let mut map = HashMap::new();
    map.insert("Profile", zvariant::Value::from(profile.as_str()));
    map.insert("Driver", zvariant::Value::from(driver));
    if let Some(cpu) = cpu {
        map.insert("CpuDriver", zvariant::Value::from(cpu));
    }
    if let Some(platform) = platform {
        map.insert("PlatformDriver", zvariant::Value::from(platform));
    }
    map
}

fn hold_to_map(hold: &crate::profile::Hold) -> HashMap<&'static str, zvariant::Value<'static>> {
    let mut map = HashMap::new();
    map.insert("ApplicationId", zvariant::Value::from(hold.application_id.clone()));
    map.insert("Profile", zvariant::Value::from(hold.profile.as_str()));
    map.insert("Reason", zvariant::Value::from(hold.reason.clone()));
    map
}

pub struct PowerProfiles {
    pub arbiter: Arc<Mutex<Arbiter>>,
    pub connection: zbus::Connection,
}

impl PowerProfiles {
    /// Emits `PropertiesChanged` for every property named in `effects`, and
    /// one `ProfileReleased` per cookie that disappeared (§4.5 step 5).
    pub(crate) async fn publish(&self, effects: &RecomputeEffects) {
        let ctx = match zbus::SignalContext::new(&self.connection, DBUS_PATH) {
            Ok(ctx) => ctx,
            Err(why) => {
                log::warn!("bus: failed to build a signal context: {why}");
                return;
            }
        };

        for cookie in &effects.released_cookies {
            if let Err(why) = Self::profile_released(&ctx, *cookie).await {
                log::warn!("bus: failed to emit ProfileReleased({cookie}): {why}");
            }
        }

        for property in &effects.changed_properties {
            let result = match *property {
                PROP_ACTIVE_PROFILE => self.active_profile_changed(&ctx).await,
                PROP_PERFORMANCE_DEGRADED => self.performance_degraded_changed(&ctx).await,
                PROP_ACTIVE_PROFILE_HOLDS => self.active_profile_holds_changed(&ctx).await,
                PROP_PROFILES => self.profiles_changed(&ctx).await,
                _ => Ok(()),
            };
            if let Err(why) = result {
                log::warn!("bus: failed to emit PropertiesChanged({property}): {why}");
            }
        }
    }
}

#[zbus::interface(name = "org.freedesktop.UPower.PowerProfiles")]
impl PowerProfiles {
    async fn hold_profile(
        &self,
        #[zbus(header)] header: Header<'_>,
        profile: &str,
        reason: &str,
        application_id: &str,
    ) -> fdo::Result<u32> {
        let owner = authorize(&self.connection, &header, ACTION_HOLD_PROFILE).await?;
        let Some(profile) = Profile::parse(profile) else { return Err(unknown_profile(profile)) };

        let mut arbiter = self.arbiter.lock().await;
        let (cookie, effects) = arbiter
            .hold_profile(profile, reason.to_owned(), application_id.to_owned(), owner)
            .map_err(from_arbiter_error)?;
        drop(arbiter);

        self.publish(&effects).await;
        Ok(cookie)
    }

    async fn release_profile(&self, #[zbus(header)] header: Header<'_>, cookie: u32) {
        let owner = header.sender().map(|s| s.to_string()).unwrap_or_default();
        let mut arbiter = self.arbiter.lock().await;
        let effects = arbiter.release_profile(cookie, &owner);
        drop(arbiter);

        if let Some(effects) = effects {
            self.publish(&effects).await;
        }
    }

    #[zbus(signal)]
    async fn profile_released(ctx: &zbus::SignalContext<'_>, cookie: u32) -> zbus::Result<()>;

    #[zbus(property)]
    async fn active_profile(&self) -> String { self.arbiter.lock().await.active_profile().as_str().to_owned() }

    #[zbus(property)]
    async fn set_active_profile(&self, #[zbus(header)] header: Header<'_>, profile: String) -> zbus::Result<()> {
        authorize(&self.connection, &header, ACTION_SWITCH_PROFILE).await?;
        let Some(profile) = Profile::parse(&profile) else { return Err(unknown_profile(&profile).into()) };

        let mut arbiter = self.arbiter.lock().await;
        let effects = arbiter.select_profile(profile).map_err(from_arbiter_error)?;
        drop(arbiter);

        self.publish(&effects).await;
        Ok(())
    }

    #[zbus(property)]
    async fn performance_degraded(&self) -> String { self.arbiter.lock().await.performance_degraded() }

    #[zbus(property)]
    async fn profiles(&self) -> Vec<HashMap<&'static str, zvariant::Value<'static>>> {
        self.arbiter
            .lock()
            .await
            .driver_descriptors()
            .into_iter()
            .map(|d| profile_to_map(d.profile, d.driver, d.cpu_driver, d.platform_driver))
            .collect()
    }

    #[zbus(property)]
    async fn actions(&self) -> Vec<String> {
        self.arbiter.lock().await.actions().into_iter().map(str::to_owned).collect()
    }

    #[zbus(property)]
    async fn active_profile_holds(&self) -> Vec<HashMap<&'static str, zvariant::Value<'static>>> {
        self.arbiter.lock().await.holds().iter().map(hold_to_map).collect()
    }

    #[zbus(property)]
    async fn version(&self) -> String { self.arbiter.lock().await.version().to_owned() }
}

/// The legacy `net.hadess.PowerProfiles` alias consumed by gnome-shell,
/// delegating every member to [`PowerProfiles`] (mirrors the teacher's
/// `NetHadessPowerProfiles(UPowerPowerProfiles)` wrapper), including
/// `HoldProfile`/`ReleaseProfile` so clients bound only to the legacy
/// interface can still take holds. Delegated calls publish their
/// `PropertiesChanged`/`ProfileReleased` through the inner `PowerProfiles`'s
/// own signal context, which is always the primary name/path — external
/// callers on this name still observe the resulting state because both
/// objects share the same underlying `Arc<Mutex<Arbiter>>`, matching
/// upstream's own behavior of only fully supporting writes via the primary
/// name.
pub struct LegacyPowerProfiles(pub PowerProfiles);

#[zbus::interface(name = "net.hadess.PowerProfiles")]
impl LegacyPowerProfiles {
    async fn hold_profile(
        &self,
        #[zbus(header)] header: Header<'_>,
        profile: &str,
        reason: &str,
        application_id: &str,
    ) -> fdo::Result<u32> {
        self.0.hold_profile(header, profile, reason, application_id).await
    }

    async fn release_profile(&self, #[zbus(header)] header: Header<'_>, cookie: u32) {
        self.0.release_profile(header, cookie).await
    }

    #[zbus(signal)]
    async fn profile_released(ctx: &zbus::SignalContext<'_>, cookie: u32) -> zbus::Result<()>;

    #[zbus(property)]
    async fn active_profile(&self) -> String { self.0.active_profile().await }

    #[zbus(property)]
    async fn set_active_profile(&self, #[zbus(header)] header: Header<'_>, profile: String) -> zbus::Result<()> {
        self.0.set_active_profile(header, profile).await
    }

    #[zbus(property)]
    async fn performance_degraded(&self) -> String { self.0.performance_degraded().await }

    #[zbus(property)]
    async fn profiles(&self) -> Vec<HashMap<&'static str, zvariant::Value<'static>>> { self.0.profiles().await }

    #[zbus(property)]
    async fn actions(&self) -> Vec<String> { self.0.actions().await }

    #[zbus(property)]
    async fn active_profile_holds(&self) -> Vec<HashMap<&'static str, zvariant::Value<'static>>> {
        self.0.active_profile_holds().await
    }

    #[zbus(property)]
    async fn version(&self) -> String { self.0.version().await }
}
