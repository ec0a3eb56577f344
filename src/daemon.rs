// SPDX-License-Identifier: GPL-3.0-only

//! Startup and the main event loop (§5): probes drivers, loads config,
//! connects optional collaborators, registers the bus names, and merges
//! every external stimulus into `Arbiter` calls. Mirrors the teacher's
//! `daemon::daemon()` — `#[tokio::main(flavor = "current_thread")]`,
//! `ConnectionBuilder::system().name(..).serve_at(..).build()` per name,
//! `futures_lite::future::zip` to run signal handling alongside the main
//! loop — generalized from one bus name to three shared objects and from a
//! fixed profile function set to a probed driver registry.

use crate::{
    action::{amdgpu_dpm::AmdgpuDpm, amdgpu_panel_power::AmdgpuPanelPower, trickle_charge::TrickleCharge, ActionContext, ActionDriver},
    arbiter::Arbiter,
    bus::{LegacyPowerProfiles, PowerProfiles},
    cli::Args,
    config::Config,
    driver::{cpu, fake::Fake, fake::ENV_VAR as FAKE_DRIVER_ENV, placeholder::Placeholder, platform::PlatformProfile, DriverContext, ProbeOutcome, ProfileDriver},
    errors::StartupError,
    gateway::Gateway,
    logind::Logind,
    profile::Profile,
    upower::Upower,
    watcher::Watcher,
    DBUS_NAME, DBUS_PATH, HADESS_DBUS_NAME, HADESS_DBUS_PATH,
};
use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::Mutex,
};

static CONTINUE: AtomicBool = AtomicBool::new(true);

async fn signal_handling() {
    let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut hup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    let sig = tokio::select! {
        _ = int.recv() => "SIGINT",
        _ = hup.recv() => "SIGHUP",
        _ = term.recv() => "SIGTERM",
    };

    log::info!("caught signal: {sig}");
    CONTINUE.store(false, Ordering::SeqCst);
}

/// Probes every non-blocked profile driver in fixed `Cpu`-then-`Platform`
/// order (§4.5 step 3), keeping `Deferred` drivers around for re-probing,
/// and fills any profile no real driver backs with a [`Placeholder`] (§4.3).
fn probe_profile_drivers(args: &Args, gateway: &Gateway) -> Vec<Box<dyn ProfileDriver>> {
    let ctx = DriverContext { gateway, on_battery: false, disable_logind: args.disable_logind };

    if std::env::var(FAKE_DRIVER_ENV).map(|v| v == "1").unwrap_or(false) {
        log::info!("{FAKE_DRIVER_ENV}=1: using the fake profile driver");
        return vec![Box::new(Fake::default())];
    }

    let mut candidates: Vec<Box<dyn ProfileDriver>> = Vec::new();
    candidates.extend(cpu::candidates());
    candidates.push(Box::new(PlatformProfile::new()));

    let mut kept: Vec<Box<dyn ProfileDriver>> = Vec::new();
    let mut covered: BTreeSet<Profile> = BTreeSet::new();

    for mut driver in candidates {
        if args.blocks_driver(driver.name()) {
            log::info!("driver '{}' blocked by --block-driver", driver.name());
            continue;
        }

        match driver.probe(&ctx) {
            ProbeOutcome::Probed(profiles) => {
                log::info!("driver '{}' probed, backs {:?}", driver.name(), profiles);
                covered.extend(profiles);
                kept.push(driver);
            }
            ProbeOutcome::Deferred { watch_path } => {
                log::info!("driver '{}' deferred, watching {watch_path:?}", driver.name());
                kept.push(driver);
            }
            ProbeOutcome::Unavailable => {
                log::debug!("driver '{}' unavailable on this host", driver.name());
            }
        }
    }

    let missing: BTreeSet<Profile> = Profile::ALL.into_iter().filter(|p| !covered.contains(p)).collect();
    if !missing.is_empty() {
        log::info!("no real driver backs {missing:?}, filling with placeholder");
        kept.push(Box::new(Placeholder::new(missing)));
    }

    kept
}

/// Probes every non-blocked action driver (§4.4), dropping any that report
/// themselves inapplicable to this host.
fn probe_action_drivers(args: &Args, gateway: &Gateway) -> Vec<Box<dyn ActionDriver>> {
    let ctx = ActionContext { gateway, effective_profile: Profile::Balanced, battery_percentage: None };

    let mut candidates: Vec<Box<dyn ActionDriver>> =
        vec![Box::new(TrickleCharge), Box::new(AmdgpuDpm), Box::new(AmdgpuPanelPower::default())];

    candidates
        .drain(..)
        .filter(|action| {
            if args.blocks_action(action.name()) {
                log::info!("action '{}' blocked by --block-action", action.name());
                return false;
            }
            true
        })
        .filter_map(|mut action| {
            if action.probe(&ctx) {
                log::info!("action '{}' applies to this host", action.name());
                Some(action)
            } else {
                log::debug!("action '{}' does not apply to this host", action.name());
                None
            }
        })
        .collect()
}

/// The per-path reaction a watcher notification drives, resolved once at
/// startup so the event loop doesn't need to re-derive it per event.
enum WatchEffect {
    /// `platform_profile` itself: check for a firmware/user key-press edit.
    FirmwareEdit,
    /// Some other driver input changed (lap mode, a deferred choices file).
    Reprobe(usize),
    DriverInput,
}

fn watch_effects(drivers: &[Box<dyn ProfileDriver>]) -> Vec<(PathBuf, WatchEffect)> {
    let mut effects = Vec::new();
    for driver in drivers.iter() {
        for path in driver.watched_paths() {
            if path == PathBuf::from(crate::driver::platform::PROFILE_PATH) {
                effects.push((path, WatchEffect::FirmwareEdit));
            } else {
                effects.push((path, WatchEffect::DriverInput));
            }
        }
    }

    // The deferred-choices path is not part of `watched_paths()` (that only
    // exists once a driver has already probed successfully), so the
    // platform driver's choices file is watched separately if still absent.
    if drivers.iter().any(|d| d.name() == "platform_profile" && d.profiles_supported().is_empty()) {
        if let Some(index) = drivers.iter().position(|d| d.name() == "platform_profile") {
            effects.push((PathBuf::from(crate::driver::platform::CHOICES_PATH), WatchEffect::Reprobe(index)));
        }
    }

    effects
}

/// Awaits the next item of an optionally-present stream, never resolving
/// while it's absent (`--disable-upower`/`--disable-logind`, or a failed
/// subscription) so a `tokio::select!` branch built on this genuinely stays
/// unready instead of spinning on a freshly-re-evaluated `None` every loop
/// iteration.
async fn next_of<S>(stream: &mut Option<S>) -> Option<S::Item>
where
    S: futures_lite::Stream + Unpin,
{
    use futures_lite::StreamExt;
    match stream {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}

#[tokio::main(flavor = "current_thread")]
pub async fn run(args: Args) -> Result<(), StartupError> {
    let signal_handling_fut = signal_handling();

    let gateway = Gateway::new();
    let profile_drivers = probe_profile_drivers(&args, &gateway);
    let action_drivers = probe_action_drivers(&args, &gateway);
    let watches = watch_effects(&profile_drivers);

    let config = Config::new();
    let arbiter = Arc::new(Mutex::new(Arbiter::new(
        gateway,
        config,
        profile_drivers,
        action_drivers,
        args.disable_logind,
    )));

    let connection = zbus::Connection::system()
        .await
        .map_err(|err| StartupError::BusConnection(err.into()))?;

    let power_profiles = PowerProfiles { arbiter: arbiter.clone(), connection: connection.clone() };
    let legacy = LegacyPowerProfiles(PowerProfiles { arbiter: arbiter.clone(), connection: connection.clone() });

    let _connection = zbus::ConnectionBuilder::system()
        .map_err(|err| StartupError::BusConnection(err.into()))?
        .name(DBUS_NAME)
        .map_err(|err| StartupError::ServeFailed(err.into()))?
        .serve_at(DBUS_PATH, power_profiles)
        .map_err(|err| StartupError::ServeFailed(err.into()))?
        .build()
        .await
        .map_err(|_| StartupError::NameTaken(DBUS_NAME))?;

    let _connection = zbus::ConnectionBuilder::system()
        .map_err(|err| StartupError::BusConnection(err.into()))?
        .name(HADESS_DBUS_NAME)
        .map_err(|err| StartupError::ServeFailed(err.into()))?
        .serve_at(HADESS_DBUS_PATH, legacy)
        .map_err(|err| StartupError::ServeFailed(err.into()))?
        .build()
        .await
        .map_err(|_| StartupError::NameTaken(HADESS_DBUS_NAME))?;

    let bus = PowerProfiles { arbiter: arbiter.clone(), connection: connection.clone() };

    {
        let mut initial = arbiter.lock().await;
        let effects = initial.activate_initial();
        drop(initial);
        bus.publish(&effects).await;
    }

    let mut watcher = Watcher::new().map_err(|err| StartupError::BusConnection(err.into()))?;
    for (path, _) in &watches {
        if let Err(why) = watcher.watch(path) {
            log::debug!("daemon: not watching {path:?} yet: {why}");
        }
    }
    let mut watch_rx = watcher.spawn();

    let upower = if args.disable_upower {
        None
    } else {
        match Upower::connect(&connection).await {
            Ok(upower) => Some(upower),
            Err(why) => {
                log::info!("daemon: upower unavailable, battery-aware behavior disabled: {why}");
                None
            }
        }
    };

    let logind = if args.disable_logind {
        None
    } else {
        match Logind::connect(&connection).await {
            Ok(logind) => Some(logind),
            Err(why) => {
                log::info!("daemon: logind unavailable, resume re-apply disabled: {why}");
                None
            }
        }
    };

    let dbus_proxy = zbus::fdo::DBusProxy::new(&connection).await.map_err(|err| StartupError::BusConnection(err.into()))?;
    let mut name_owner_changes =
        dbus_proxy.receive_name_owner_changed().await.map_err(|err| StartupError::BusConnection(err.into()))?;

    let mut on_battery_stream = match &upower {
        Some(upower) => Some(upower.on_battery_changed().await),
        None => None,
    };
    let mut percentage_stream = match &upower {
        Some(upower) => Some(upower.percentage_changed().await),
        None => None,
    };
    let mut sleep_stream = match &logind {
        Some(logind) => logind.sleep_edges().await.ok(),
        None => None,
    };

    let main_loop = async move {
        use futures_lite::StreamExt;

        while CONTINUE.load(Ordering::SeqCst) {
            tokio::select! {
                Some(changed_path) = watch_rx.recv() => {
                    let effect = watches.iter().find(|(path, _)| path == &changed_path).map(|(_, effect)| effect);
                    let mut arbiter = arbiter.lock().await;
                    match effect {
                        Some(WatchEffect::FirmwareEdit) => {
                            match arbiter.platform_profile_firmware_changed() {
                                Ok(Some(effects)) => { drop(arbiter); bus.publish(&effects).await; }
                                Ok(None) => {}
                                Err(why) => log::warn!("daemon: firmware edit reactor failed: {why}"),
                            }
                        }
                        Some(WatchEffect::DriverInput) => {
                            let effects = arbiter.driver_input_changed();
                            drop(arbiter);
                            bus.publish(&effects).await;
                        }
                        Some(WatchEffect::Reprobe(index)) => {
                            let effects = arbiter.reprobe(*index);
                            drop(arbiter);
                            if let Some(effects) = effects {
                                bus.publish(&effects).await;
                            }
                        }
                        None => {}
                    }
                }

                Some(name_owner_change) = name_owner_changes.next() => {
                    if let Ok(args) = name_owner_change.args() {
                        if args.new_owner.is_none() {
                            let mut arbiter = arbiter.lock().await;
                            let effects = arbiter.bus_name_lost(args.name.as_str());
                            drop(arbiter);
                            bus.publish(&effects).await;
                        }
                    }
                }

                Some(on_battery) = next_of(&mut on_battery_stream) => {
                    let value = on_battery.get().await.unwrap_or(false);
                    let mut arbiter = arbiter.lock().await;
                    let percentage = arbiter.battery_percentage_hint();
                    let effects = arbiter.battery_changed(value, percentage);
                    drop(arbiter);
                    bus.publish(&effects).await;
                }

                Some(percentage) = next_of(&mut percentage_stream) => {
                    let value = percentage.get().await.ok();
                    let mut arbiter = arbiter.lock().await;
                    let on_battery = arbiter.on_battery_hint();
                    let effects = arbiter.battery_changed(on_battery, value);
                    drop(arbiter);
                    bus.publish(&effects).await;
                }

                Some(entering) = next_of(&mut sleep_stream) => {
                    if let Ok(args) = entering.args() {
                        let mut arbiter = arbiter.lock().await;
                        let effects = arbiter.sleep_edge(args.start);
                        drop(arbiter);
                        bus.publish(&effects).await;
                    }
                }

                else => { tokio::time::sleep(std::time::Duration::from_millis(200)).await; }
            }
        }
    };

    log::info!("handling dbus requests");
    futures_lite::future::zip(signal_handling_fut, main_loop).await;

    log::info!("daemon exited from loop");
    Ok(())
}
