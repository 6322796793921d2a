// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use addr_ladder::{
    AddressLadderBuilder, FailurePolicy, Ladder, Placeholder, ProgramId,
};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// A `RawConfig` represents a `ladder.toml` file that has been deserialized,
/// but whose paths have not yet been resolved against its directory.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    name: String,
    base: u64,
    step: u64,
    linker_script: PathBuf,
    #[serde(default = "default_bin_dir")]
    bin_dir: PathBuf,
    #[serde(default)]
    marker: Option<String>,
    #[serde(default)]
    capacity: Option<usize>,
    #[serde(default)]
    limit: Option<u64>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default = "default_true")]
    release: bool,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    fail_fast: bool,
    #[serde(default = "default_true")]
    check_size: bool,
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from("src").join("bin")
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug)]
pub struct Config {
    pub name: String,
    /// Directory holding `ladder.toml`; cargo runs here.
    pub project_dir: PathBuf,
    pub linker_script: PathBuf,
    pub bin_dir: PathBuf,
    pub ladder: Ladder,
    pub placeholder: Placeholder,
    pub target: Option<String>,
    pub release: bool,
    pub features: Vec<String>,
    pub fail_fast: bool,
    pub check_size: bool,
}

impl Config {
    pub fn from_file(cfg: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(cfg)
            .with_context(|| format!("could not read {}", cfg.display()))?;
        let project_dir = match cfg.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::parse(&text, &project_dir)
            .with_context(|| format!("could not load {}", cfg.display()))
    }

    /// Parses `ladder.toml` text, resolving relative paths against
    /// `project_dir`.
    pub fn parse(text: &str, project_dir: &Path) -> Result<Self> {
        let toml: RawConfig = toml::from_str(text)?;

        let mut ladder = Ladder::new(toml.base, toml.step)?;
        if let Some(capacity) = toml.capacity {
            ladder = ladder.with_capacity(capacity);
        }
        if let Some(limit) = toml.limit {
            if limit <= toml.base {
                return Err(anyhow!(
                    "limit {:#x} is not above base {:#x}",
                    limit,
                    toml.base
                ));
            }
            ladder = ladder.with_limit(limit);
        }

        let placeholder = match &toml.marker {
            Some(marker) => Placeholder::marker(marker)?,
            None => Placeholder::address(toml.base)?,
        };

        Ok(Config {
            name: toml.name,
            project_dir: project_dir.to_path_buf(),
            linker_script: project_dir.join(toml.linker_script),
            bin_dir: project_dir.join(toml.bin_dir),
            ladder,
            placeholder,
            target: toml.target,
            release: toml.release,
            features: toml.features,
            fail_fast: toml.fail_fast,
            check_size: toml.check_size,
        })
    }

    /// Where reports for this ladder are written.
    pub fn out_dir(&self) -> PathBuf {
        self.project_dir.join("target").join(&self.name)
    }

    pub fn builder(&self, fail_fast: bool) -> Result<AddressLadderBuilder> {
        let policy = if fail_fast || self.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::Continue
        };
        Ok(AddressLadderBuilder::new(self.ladder, &self.linker_script)?
            .placeholder(self.placeholder.clone())
            .policy(policy))
    }

    pub fn program_name_suggestion(
        programs: &[ProgramId],
        name: &str,
    ) -> String {
        // Suggest only for very small differences
        // High number can result in inaccurate suggestions for short queries
        const MAX_DISTANCE: usize = 3;

        let mut scored: Vec<_> = programs
            .iter()
            .map(ProgramId::as_str)
            .filter_map(|s| {
                let distance = strsim::damerau_levenshtein(name, s);
                if distance <= MAX_DISTANCE {
                    Some((distance, s))
                } else {
                    None
                }
            })
            .collect();
        scored.sort();
        let mut out = format!("'{}' is not a valid program name.", name);
        if let Some((_, s)) = scored.first() {
            out.push_str(&format!(" Did you mean '{}'?", s));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addr_ladder::PlaceholderKind;
    use indoc::indoc;

    #[test]
    fn minimal() {
        let cfg = Config::parse(
            indoc! {r#"
                name = "user"
                base = 0x80400000
                step = 0x20000
                linker-script = "src/linker.ld"
            "#},
            Path::new("user"),
        )
        .unwrap();

        assert_eq!(cfg.name, "user");
        assert_eq!(cfg.ladder.base(), 0x8040_0000);
        assert_eq!(cfg.ladder.step(), 0x2_0000);
        assert_eq!(cfg.linker_script, Path::new("user/src/linker.ld"));
        assert_eq!(cfg.bin_dir, Path::new("user/src/bin"));
        assert_eq!(
            cfg.placeholder.kind(),
            &PlaceholderKind::Address(0x8040_0000)
        );
        assert!(cfg.release);
        assert!(cfg.check_size);
        assert!(!cfg.fail_fast);
        assert_eq!(cfg.out_dir(), Path::new("user/target/user"));
    }

    #[test]
    fn everything() {
        let cfg = Config::parse(
            indoc! {r#"
                name = "apps"
                base = 0x80400000
                step = 0x20000
                linker-script = "linker.ld"
                bin-dir = "programs"
                marker = "@BASE@"
                capacity = 16
                limit = 0x80800000
                target = "riscv64gc-unknown-none-elf"
                release = false
                features = ["board_qemu"]
                fail-fast = true
                check-size = false
            "#},
            Path::new("."),
        )
        .unwrap();

        assert_eq!(
            cfg.placeholder.kind(),
            &PlaceholderKind::Marker("@BASE@".to_string())
        );
        assert_eq!(cfg.target.as_deref(), Some("riscv64gc-unknown-none-elf"));
        assert_eq!(cfg.features, ["board_qemu"]);
        assert!(!cfg.release);
        assert!(!cfg.check_size);
        let ladder = Ladder::new(0x8040_0000, 0x2_0000).unwrap();
        let ladder = ladder.with_capacity(16).with_limit(0x8080_0000);
        assert_eq!(cfg.ladder, ladder);
    }

    #[test]
    fn rejects_nonsense() {
        const HEAD: &str = "name = \"x\"\n";
        let bad = [
            // unknown key
            "base = 0\nstep = 1\nlinker-script = \"l\"\nfoo = 1\n",
            // zero step
            "base = 0\nstep = 0\nlinker-script = \"l\"\n",
            // limit below base
            "base = 16\nstep = 1\nlinker-script = \"l\"\nlimit = 8\n",
            // missing linker script
            "base = 0\nstep = 1\n",
        ];
        for tail in bad {
            let text = format!("{HEAD}{tail}");
            assert!(Config::parse(&text, Path::new(".")).is_err(), "{}", text);
        }
    }

    #[test]
    fn suggestions() {
        let programs: Vec<_> = ["00hello_world", "02power", "user_shell"]
            .into_iter()
            .map(|n| ProgramId::new(n).unwrap())
            .collect();
        assert_eq!(
            Config::program_name_suggestion(&programs, "02powr"),
            "'02powr' is not a valid program name. Did you mean '02power'?"
        );
        assert_eq!(
            Config::program_name_suggestion(&programs, "initproc"),
            "'initproc' is not a valid program name."
        );
    }
}
