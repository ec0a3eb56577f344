// SPDX-License-Identifier: GPL-3.0-only

//! The daemon binary's own flag surface (§6), distinct from the companion
//! CLI wrapper the spec scopes out. Modernizes the teacher's
//! `clap::Clap`/`AppSettings` `daemon` subcommand (`src/cli/daemon.rs`) into
//! a single top-level `derive(Parser)`, since this binary has no
//! subcommands of its own left to dispatch between.

use clap::Parser;
use log::LevelFilter;

/// Arbitrates the machine-wide power profile and the hardware drivers that
/// realize it.
#[derive(Parser, Debug)]
#[command(name = "power-profilesd", version, about)]
pub struct Args {
    /// Increase log verbosity; repeat for debug-level logs (`-vv`)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Exclude a profile driver from probing, by name (repeatable)
    #[arg(long = "block-driver", value_name = "NAME")]
    pub block_driver: Vec<String>,

    /// Exclude an action driver from probing, by name (repeatable)
    #[arg(long = "block-action", value_name = "NAME")]
    pub block_action: Vec<String>,

    /// Do not subscribe to upower; treat the system as always on mains power
    #[arg(long)]
    pub disable_upower: bool,

    /// Do not subscribe to logind; never re-apply drivers on resume
    #[arg(long)]
    pub disable_logind: bool,
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn blocks_driver(&self, name: &str) -> bool {
        self.block_driver.iter().any(|blocked| blocked == name)
    }

    pub fn blocks_action(&self, name: &str) -> bool {
        self.block_action.iter().any(|blocked| blocked == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_escalates_with_repeated_flag() {
        assert_eq!(Args::parse_from(["power-profilesd"]).log_level(), LevelFilter::Info);
        assert_eq!(Args::parse_from(["power-profilesd", "-v"]).log_level(), LevelFilter::Debug);
        assert_eq!(Args::parse_from(["power-profilesd", "-vv"]).log_level(), LevelFilter::Trace);
    }

    #[test]
    fn block_lists_are_repeatable() {
        let args = Args::parse_from([
            "power-profilesd",
            "--block-driver",
            "cpu",
            "--block-driver",
            "platform",
            "--block-action",
            "trickle_charge",
        ]);
        assert!(args.blocks_driver("cpu"));
        assert!(args.blocks_driver("platform"));
        assert!(!args.blocks_driver("fake"));
        assert!(args.blocks_action("trickle_charge"));
        assert!(!args.blocks_action("amdgpu_dpm"));
    }

    #[test]
    fn disable_flags_default_to_false() {
        let args = Args::parse_from(["power-profilesd"]);
        assert!(!args.disable_upower);
        assert!(!args.disable_logind);
    }
}
