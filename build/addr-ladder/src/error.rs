// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors that stop a ladder run outright.
///
/// Anything touching the shared linker script is fatal: once we can't say
/// what's in that file, building another program on top of it would produce
/// a binary at an unknown address.
#[derive(Debug, Error)]
pub enum LadderError {
    #[error("step must be non-zero")]
    ZeroStep,

    #[error("program '{next}' is not sorted after '{prev}'")]
    Unsorted { prev: String, next: String },

    #[error("program name is empty")]
    EmptyName,

    #[error("rung {index} overflows: {base:#x} + {index} * {step:#x}")]
    Overflow { base: u64, step: u64, index: usize },

    #[error("{count} programs exceed the ladder capacity of {capacity}")]
    Capacity { count: usize, capacity: usize },

    #[error("program '{program}' ends at {end:#x}, past the limit {limit:#x}")]
    Limit { program: String, end: u64, limit: u64 },

    #[error("bad placeholder: {reason}")]
    Placeholder { reason: String },

    #[error("could not read linker script {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("linker script {} is not valid UTF-8", path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("could not write linker script {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The original linker script could not be put back. The file on disk is
    /// left holding some other program's address.
    #[error(
        "FAILED TO RESTORE linker script {}; it must be repaired by hand",
        path.display()
    )]
    Restore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LadderError {
    /// True if the shared linker script may have been left modified.
    pub fn is_restore_failure(&self) -> bool {
        matches!(self, LadderError::Restore { .. })
    }
}

/// Failure of a single program's build. These are collected per program
/// rather than stopping the run.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("could not run {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build failed ({status})")]
    Failed { status: ExitStatus },

    #[error(
        "image spans {start:#x}..{end:#x}, outside its rung \
         {rung_start:#x}..{rung_end:#x}"
    )]
    Oversize {
        start: u64,
        end: u64,
        rung_start: u64,
        rung_end: u64,
    },

    #[error("could not inspect {}: {reason}", path.display())]
    Inspect { path: PathBuf, reason: String },

    #[error("interrupted before build")]
    Interrupted,
}
