// SPDX-License-Identifier: GPL-3.0-only

use fern::{Dispatch, InitError};
use log::LevelFilter;
use std::io;

/// Sets up the global logger: only this crate's own log target is emitted,
/// at the level selected by CLI verbosity (`-v`/`-vv`); everything else is
/// silenced.
pub fn setup(filter: LevelFilter) -> Result<(), InitError> {
    Dispatch::new()
        .level(LevelFilter::Off)
        .level_for("power_profiles_arbiter", filter)
        .format(|out, message, record| out.finish(format_args!("[{}] {}", record.level(), message)))
        .chain(io::stderr())
        .apply()?;
    Ok(())
}
