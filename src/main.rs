// SPDX-License-Identifier: GPL-3.0-only

use clap::Parser;
use power_profiles_arbiter::cli::Args;

fn main() {
    let args = Args::parse();

    if let Err(why) = power_profiles_arbiter::logging::setup(args.log_level()) {
        eprintln!("failed to set up logging: {why}");
        std::process::exit(1);
    }

    if let Err(why) = power_profiles_arbiter::daemon::run(args) {
        log::error!("{why}");
        std::process::exit(1);
    }
}
