// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::{
    render_address, Assignment, BuildError, Ladder, LadderError, LinkScript,
    Placeholder, ProgramId,
};

/// What to do once a program fails to build.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure and go on to the next program.
    #[default]
    Continue,
    /// Stop after the first failure; later programs are neither built nor
    /// reported.
    FailFast,
}

/// Result of building one program.
#[derive(Debug)]
pub struct Outcome {
    pub program: ProgramId,
    pub address: u64,
    pub result: Result<(), BuildError>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Builds every assigned program in turn, each with its own address written
/// into the linker script at `script_path`.
///
/// The script is read once, up front. For each program, the placeholder in
/// that snapshot is replaced with the program's address and the result is
/// written out; `build` runs; then the snapshot is written back, whether
/// `build` succeeded, failed, or panicked. Only then does the next program
/// start.
///
/// A failing `build` is recorded in that program's [`Outcome`]. Failing to
/// read or write the script stops everything and is returned as the error;
/// a [`LadderError::Restore`] means the script on disk is no longer the
/// original.
pub fn build_all<F>(
    assignments: &[Assignment],
    script_path: &Path,
    placeholder: &Placeholder,
    policy: FailurePolicy,
    mut build: F,
) -> Result<Vec<Outcome>, LadderError>
where
    F: FnMut(&ProgramId, u64) -> Result<(), BuildError>,
{
    let mut script = LinkScript::open(script_path)?;

    match placeholder.count(script.original()) {
        0 => warn!(
            "{} does not contain {}; every program will link at the same \
             address",
            script.path().display(),
            placeholder
        ),
        n => info!(
            "{}: {} occurrence(s) of {}",
            script.path().display(),
            n,
            placeholder
        ),
    }

    let mut outcomes = Vec::with_capacity(assignments.len());
    for a in assignments {
        let edited = placeholder.substitute(script.original(), a.address);
        let edit = script.edit(&edited)?;

        info!(
            "program {} starts at {}",
            a.program,
            render_address(a.address)
        );
        let result = build(&a.program, a.address);

        if let Err(e) = edit.restore() {
            error!("{}", e);
            return Err(e);
        }

        if let Err(e) = &result {
            warn!("program {} failed: {}", a.program, e);
        }
        let failed = result.is_err();
        outcomes.push(Outcome {
            program: a.program.clone(),
            address: a.address,
            result,
        });

        if failed && policy == FailurePolicy::FailFast {
            warn!("stopping after first failure");
            break;
        }
    }

    if !script.is_pristine()? {
        warn!(
            "{} no longer matches its original contents; something else \
             wrote to it during the run",
            script.path().display()
        );
    }

    Ok(outcomes)
}

/// Bundles a [`Ladder`] with the linker script and placeholder it is
/// written through.
#[derive(Clone, Debug)]
pub struct AddressLadderBuilder {
    ladder: Ladder,
    script: PathBuf,
    placeholder: Placeholder,
    policy: FailurePolicy,
}

impl AddressLadderBuilder {
    /// Uses the ladder's base address, as a hex literal, as the placeholder.
    pub fn new(
        ladder: Ladder,
        script: impl Into<PathBuf>,
    ) -> Result<Self, LadderError> {
        Ok(AddressLadderBuilder {
            ladder,
            script: script.into(),
            placeholder: Placeholder::address(ladder.base())?,
            policy: FailurePolicy::default(),
        })
    }

    pub fn placeholder(self, placeholder: Placeholder) -> Self {
        AddressLadderBuilder {
            placeholder,
            ..self
        }
    }

    pub fn policy(self, policy: FailurePolicy) -> Self {
        AddressLadderBuilder { policy, ..self }
    }

    pub fn ladder(&self) -> &Ladder {
        &self.ladder
    }

    pub fn plan(
        &self,
        programs: &[ProgramId],
    ) -> Result<Vec<Assignment>, LadderError> {
        self.ladder.allocate(programs)
    }

    pub fn run<F>(
        &self,
        assignments: &[Assignment],
        build: F,
    ) -> Result<Vec<Outcome>, LadderError>
    where
        F: FnMut(&ProgramId, u64) -> Result<(), BuildError>,
    {
        build_all(
            assignments,
            &self.script,
            &self.placeholder,
            self.policy,
            build,
        )
    }
}
