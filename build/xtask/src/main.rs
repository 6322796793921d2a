// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cargo;
mod config;
mod discover;
mod dist;
mod sizes;

#[derive(Debug, Parser)]
#[clap(
    max_term_width = 80,
    about = "extra tasks to help you build programs on an address ladder"
)]
struct Xtask {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Builds every program in the ladder, each linked at its own
    /// non-overlapping base address.
    Dist {
        /// Request verbosity from tools we shell out to.
        #[clap(short)]
        verbose: bool,
        /// Stop at the first program that fails to build.
        #[clap(long)]
        fail_fast: bool,
        /// Path to the ladder configuration file, in TOML.
        cfg: PathBuf,
    },

    /// Builds one or more programs at the address they would get from
    /// `dist`, without building the rest. This is useful for iterating on a
    /// single program.
    Build {
        /// Request verbosity from tools we shell out to.
        #[clap(short)]
        verbose: bool,
        /// Path to the ladder configuration file, in TOML.
        cfg: PathBuf,
        /// Name of program(s) to build.
        #[clap(min_values = 1)]
        programs: Vec<String>,
    },

    /// Prints the address assigned to each program, without building.
    Plan {
        /// Path to the ladder configuration file, in TOML.
        cfg: PathBuf,
    },
}

fn main() -> Result<()> {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");

    env_logger::init_from_env(env);

    let xtask = Xtask::parse();

    match xtask.cmd {
        Command::Dist {
            verbose,
            fail_fast,
            cfg,
        } => {
            dist::package(verbose, fail_fast, &cfg, None)?;
        }
        Command::Build {
            verbose,
            cfg,
            programs,
        } => {
            dist::package(verbose, false, &cfg, Some(programs))?;
        }
        Command::Plan { cfg } => {
            dist::plan(&cfg)?;
        }
    }

    Ok(())
}
