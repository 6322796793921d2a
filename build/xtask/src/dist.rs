// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use addr_ladder::{
    render_address, Assignment, BuildError, Ladder, Outcome, PlaceholderKind,
    ProgramId,
};
use anyhow::{bail, Context, Result};

use crate::cargo::CargoBuild;
use crate::config::Config;
use crate::{discover, sizes};

/// Set by the Ctrl-C handler. Builds that haven't started yet are skipped;
/// the one in flight gets the signal itself, since cargo shares our process
/// group.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Builds every program in the ladder described by `ladder_toml`, or only
/// those named in `programs_to_build`. Either way, each program links at
/// its address in the full ladder.
pub fn package(
    verbose: bool,
    fail_fast: bool,
    ladder_toml: &Path,
    programs_to_build: Option<Vec<String>>,
) -> Result<()> {
    let toml = Config::from_file(ladder_toml)?;
    let programs = discover::programs(&toml.bin_dir)?;
    let builder = toml.builder(fail_fast)?;

    let mut plan = builder.plan(&programs)?;
    if let Some(names) = programs_to_build.as_ref() {
        plan = select(plan, &programs, names)?;
    }

    ctrlc::set_handler(|| {
        if !INTERRUPTED.swap(true, Ordering::SeqCst) {
            log::warn!("interrupted; stopping once cargo exits");
        }
    })
    .context("could not install Ctrl-C handler")?;

    let cargo = CargoBuild::new(&toml, verbose);

    let step = builder.ladder().step();
    let mut used = vec![];
    let outcomes = builder.run(&plan, |program, address| {
        if INTERRUPTED.load(Ordering::SeqCst) {
            return Err(BuildError::Interrupted);
        }
        let elf = cargo.build(program)?;

        if toml.check_size {
            let elf = elf.ok_or_else(|| BuildError::Inspect {
                path: PathBuf::from(program.as_str()),
                reason: "cargo reported no executable".to_string(),
            })?;
            let size = sizes::check(&elf, &(address..address + step))?;
            used.push((program.to_string(), size));
        }
        Ok(())
    });
    let outcomes = outcomes.with_context(|| {
        format!("could not build ladder '{}'", toml.name)
    })?;

    let out_dir = toml.out_dir();
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("could not create {}", out_dir.display()))?;
    let report = out_dir.join("allocations.txt");
    std::fs::write(&report, allocations(builder.ladder(), &outcomes))
        .with_context(|| format!("could not write {}", report.display()))?;

    sizes::summarize(builder.ladder(), &outcomes, &used)?;

    if INTERRUPTED.load(Ordering::SeqCst) {
        bail!("interrupted");
    }
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed != 0 {
        bail!("{} of {} programs failed to build", failed, plan.len());
    }
    Ok(())
}

/// Prints the ladder without building anything.
pub fn plan(ladder_toml: &Path) -> Result<()> {
    let toml = Config::from_file(ladder_toml)?;
    let programs = discover::programs(&toml.bin_dir)?;
    let builder = toml.builder(false)?;

    match toml.placeholder.kind() {
        PlaceholderKind::Address(a) => log::info!(
            "{} links at {}; each program gets its own address",
            toml.linker_script.display(),
            render_address(*a)
        ),
        PlaceholderKind::Marker(m) => log::info!(
            "{} is rewritten at marker {}",
            toml.linker_script.display(),
            m
        ),
    }

    for a in builder.plan(&programs)? {
        let span = builder.ladder().span(&a);
        println!(
            "{} {} {}",
            render_address(span.start),
            render_address(span.end),
            a.program
        );
    }
    Ok(())
}

/// Keeps the assignments for `names`, rejecting any name that isn't a
/// program.
fn select(
    plan: Vec<Assignment>,
    programs: &[ProgramId],
    names: &[String],
) -> Result<Vec<Assignment>> {
    // Quick sanity-check, in the same spirit as `cargo build --bin`.
    if names.is_empty() {
        bail!(
            "Running `cargo xtask build` without specifying programs has no \
             effect.\nDid you mean to run `cargo xtask dist`?"
        );
    }
    if let Some(name) =
        names.iter().find(|n| !programs.iter().any(|p| p.as_str() == *n))
    {
        bail!(Config::program_name_suggestion(programs, name));
    }

    let wanted: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    Ok(plan
        .into_iter()
        .filter(|a| wanted.contains(a.program.as_str()))
        .collect())
}

/// One line per program: `<start> <end> <program> <ok|error>`.
fn allocations(ladder: &Ladder, outcomes: &[Outcome]) -> String {
    let mut out = String::new();
    for o in outcomes {
        // Every outcome came from `ladder`, so the end can't overflow.
        let end = o.address + ladder.step();
        let status = if o.is_ok() { "ok" } else { "error" };
        // Writing to a String can't fail.
        let _ = writeln!(
            out,
            "{} {} {} {}",
            render_address(o.address),
            render_address(end),
            o.program,
            status
        );
    }
    out
}
