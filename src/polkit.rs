// SPDX-License-Identifier: GPL-3.0-only

//! Authorization bridge (§4.7): every state-changing bus call is gated by an
//! async permission check against polkit, keyed by an action string. Mirrors
//! the teacher's `src/polkit.rs`, rebased onto `zbus_polkit` instead of
//! hand-rolled `dbus` calls now that the rest of the bus surface is `zbus`.

use zbus::Connection;
use zbus_polkit::policykit1::{AuthorityProxy, CheckAuthorizationFlags, Subject};

pub const ACTION_SWITCH_PROFILE: &str = "org.freedesktop.UPower.PowerProfiles.switch-profile";
pub const ACTION_HOLD_PROFILE: &str = "org.freedesktop.UPower.PowerProfiles.hold-profile";

/// Resolves the PID backing a caller's unique bus name, the same
/// `GetConnectionUnixProcessID` pattern the teacher uses for
/// `set-charge-thresholds`.
pub async fn connection_pid(connection: &Connection, sender: &str) -> zbus::Result<u32> {
    let dbus = zbus::fdo::DBusProxy::new(connection).await?;
    dbus.get_connection_unix_process_id(sender.try_into()?).await
}

/// Checks whether the caller identified by `sender` is authorized for
/// `action_id`. Any bus- or polkit-level failure is treated as denial: an
/// authorization check that cannot complete must not silently grant access.
pub async fn is_authorized(connection: &Connection, sender: &str, action_id: &str) -> bool {
    match check(connection, sender, action_id).await {
        Ok(authorized) => authorized,
        Err(err) => {
            log::warn!("polkit check for '{action_id}' failed, denying: {err}");
            false
        }
    }
}

async fn check(connection: &Connection, sender: &str, action_id: &str) -> zbus::Result<bool> {
    let pid = connection_pid(connection, sender).await?;
    let subject = Subject::new_for_owner(pid, None, None)?;

    let authority = AuthorityProxy::new(connection).await?;
    let result = authority
        .check_authorization(
            &subject,
            action_id,
            &std::collections::HashMap::new(),
            CheckAuthorizationFlags::AllowUserInteraction.into(),
            "",
        )
        .await?;

    Ok(result.is_authorized)
}
