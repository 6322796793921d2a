// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use addr_ladder::{BuildError, ProgramId};
use serde::Deserialize;

use crate::config::Config;

/// Arguments shared by every `cargo build --bin ...` in one ladder run.
#[derive(Clone, Debug)]
pub struct CargoBuild {
    project_dir: PathBuf,
    target: Option<String>,
    release: bool,
    features: Vec<String>,
    verbose: bool,
}

impl CargoBuild {
    pub fn new(toml: &Config, verbose: bool) -> Self {
        CargoBuild {
            project_dir: toml.project_dir.clone(),
            target: toml.target.clone(),
            release: toml.release,
            features: toml.features.clone(),
            verbose,
        }
    }

    /// The command that builds `program`.
    pub fn cmd(&self, program: &ProgramId) -> Command {
        // `cargo` is found on PATH, so a relative project_dir is fine here.
        let mut cmd = Command::new("cargo");
        cmd.arg("build")
            .arg("--message-format=json-render-diagnostics")
            .arg("--bin")
            .arg(program.as_str());
        if self.release {
            cmd.arg("--release");
        }
        if let Some(target) = &self.target {
            cmd.arg("--target").arg(target);
        }
        if !self.features.is_empty() {
            cmd.arg("--features").arg(self.features.join(","));
        }
        if self.verbose {
            cmd.arg("-v");
        }
        cmd.current_dir(&self.project_dir);
        cmd
    }

    /// Runs the build for one program, returning the executable cargo
    /// reports for it. Diagnostics go straight to our stderr.
    pub fn build(
        &self,
        program: &ProgramId,
    ) -> Result<Option<PathBuf>, BuildError> {
        let mut cmd = self.cmd(program);
        cmd.stdout(Stdio::piped()).stderr(Stdio::inherit());
        log::debug!("running {:?}", cmd);

        let output = cmd.output().map_err(|source| BuildError::Spawn {
            command: format!("{:?}", cmd),
            source,
        })?;
        if !output.status.success() {
            return Err(BuildError::Failed {
                status: output.status,
            });
        }
        Ok(executable(&String::from_utf8_lossy(&output.stdout), program))
    }
}

/// The subset of cargo's JSON messages we care about.
#[derive(Debug, Deserialize)]
struct Message {
    reason: String,
    #[serde(default)]
    target: Option<MessageTarget>,
    #[serde(default)]
    executable: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct MessageTarget {
    name: String,
}

/// Picks the executable for `program` out of `cargo build
/// --message-format=json` output. The last matching artifact wins.
fn executable(stdout: &str, program: &ProgramId) -> Option<PathBuf> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<Message>(line).ok())
        .filter(|m| m.reason == "compiler-artifact")
        .filter(|m| {
            m.target
                .as_ref()
                .map_or(false, |t| t.name == program.as_str())
        })
        .filter_map(|m| m.executable)
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::path::Path;

    fn cargo(extra: &str) -> CargoBuild {
        let text = format!(
            "{}{}",
            indoc! {r#"
                name = "user"
                base = 0x80400000
                step = 0x20000
                linker-script = "src/linker.ld"
            "#},
            extra
        );
        let toml = Config::parse(&text, Path::new("user")).unwrap();
        CargoBuild::new(&toml, false)
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn plain_release_build() {
        let c = cargo("");
        let id = ProgramId::new("00hello_world").unwrap();
        let cmd = c.cmd(&id);

        assert_eq!(cmd.get_program(), "cargo");
        assert_eq!(
            args(&cmd),
            [
                "build",
                "--message-format=json-render-diagnostics",
                "--bin",
                "00hello_world",
                "--release"
            ]
        );
        assert_eq!(cmd.get_current_dir(), Some(Path::new("user")));
    }

    #[test]
    fn cross_debug_build() {
        let c = cargo(indoc! {r#"
            target = "riscv64gc-unknown-none-elf"
            release = false
            features = ["board_qemu", "log"]
        "#});
        let id = ProgramId::new("initproc").unwrap();

        assert_eq!(
            args(&c.cmd(&id))[2..],
            [
                "--bin",
                "initproc",
                "--target",
                "riscv64gc-unknown-none-elf",
                "--features",
                "board_qemu,log",
            ]
        );
    }

    // Where the binary lands is up to cargo (a `[build] target` in the
    // project's own config moves it), so it comes from cargo's messages.
    #[test]
    fn executable_from_messages() {
        let stdout = indoc! {r#"
            {"reason":"compiler-artifact","target":{"name":"user_lib","kind":["lib"]},"executable":null}
            {"reason":"build-script-executed","package_id":"user_lib"}
            not json at all
            {"reason":"compiler-artifact","target":{"name":"initproc","kind":["bin"]},"executable":"/p/target/riscv64gc-unknown-none-elf/release/initproc","fresh":true}
            {"reason":"build-finished","success":true}
        "#};
        let id = ProgramId::new("initproc").unwrap();
        assert_eq!(
            executable(stdout, &id),
            Some(PathBuf::from(
                "/p/target/riscv64gc-unknown-none-elf/release/initproc"
            ))
        );

        let other = ProgramId::new("user_shell").unwrap();
        assert_eq!(executable(stdout, &other), None);
        assert_eq!(executable("", &id), None);
    }
}
