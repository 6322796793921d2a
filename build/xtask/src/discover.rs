// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use addr_ladder::ProgramId;
use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

/// Lists the programs in `bin_dir`, sorted by name.
///
/// Each `foo.rs` is a program `foo`, as is each directory `foo/` holding a
/// `main.rs` (cargo's layout for multi-file binaries). Anything else is
/// skipped.
pub fn programs(bin_dir: &Path) -> Result<Vec<ProgramId>> {
    if !bin_dir.is_dir() {
        bail!("{} is not a directory", bin_dir.display());
    }

    let mut out = vec![];
    for entry in WalkDir::new(bin_dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| {
            format!("could not list {}", bin_dir.display())
        })?;
        let Some(file_name) = entry.file_name().to_str() else {
            log::warn!("skipping non-UTF-8 name {:?}", entry.file_name());
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }

        // Cargo names a directory binary after the whole directory name,
        // dots included, and a file binary after its stem.
        let ty = entry.file_type();
        let id = if ty.is_dir() && entry.path().join("main.rs").is_file() {
            ProgramId::new(file_name)?
        } else if ty.is_file()
            && entry.path().extension().map_or(false, |ext| ext == "rs")
        {
            ProgramId::from_file_name(file_name)?
        } else {
            log::debug!("skipping {}", entry.path().display());
            continue;
        };

        out.push(id);
    }

    out.sort();
    if let Some(dup) = out.windows(2).find(|w| w[0] == w[1]) {
        bail!(
            "program name '{}' appears more than once in {}",
            dup[0],
            bin_dir.display()
        );
    }
    if out.is_empty() {
        log::warn!("no programs found in {}", bin_dir.display());
    }
    Ok(out)
}
