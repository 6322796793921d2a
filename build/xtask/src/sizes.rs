// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::Write;
use std::ops::Range;
use std::path::Path;

use addr_ladder::{render_address, BuildError, Ladder, Outcome};
use goblin::elf::program_header::{ProgramHeader, PT_LOAD};
use termcolor::{Color, ColorSpec, WriteColor};

/// Address range covered by the loadable segments, or `None` if there are
/// none with a non-zero size.
fn load_span(phdrs: &[ProgramHeader]) -> Option<Range<u64>> {
    phdrs
        .iter()
        .filter(|p| p.p_type == PT_LOAD && p.p_memsz != 0)
        .map(|p| p.p_vaddr..p.p_vaddr.saturating_add(p.p_memsz))
        .reduce(|a, b| a.start.min(b.start)..a.end.max(b.end))
}

fn check_span(
    span: Option<Range<u64>>,
    rung: &Range<u64>,
) -> Result<u64, BuildError> {
    let Some(span) = span else {
        return Ok(0);
    };
    if span.start < rung.start || span.end > rung.end {
        return Err(BuildError::Oversize {
            start: span.start,
            end: span.end,
            rung_start: rung.start,
            rung_end: rung.end,
        });
    }
    Ok(span.end - span.start)
}

/// Checks that the ELF at `elf` loads entirely within `rung`, returning the
/// number of bytes it occupies.
pub fn check(elf: &Path, rung: &Range<u64>) -> Result<u64, BuildError> {
    let inspect = |reason: String| BuildError::Inspect {
        path: elf.to_path_buf(),
        reason,
    };
    let buffer = std::fs::read(elf).map_err(|e| inspect(e.to_string()))?;
    let elf = goblin::elf::Elf::parse(&buffer)
        .map_err(|e| inspect(e.to_string()))?;
    check_span(load_span(&elf.program_headers), rung)
}

/// `used` as a whole percentage of `step`, without overflowing for large
/// steps.
fn percent_of(used: u64, step: u64) -> u128 {
    u128::from(used) * 100 / u128::from(step)
}

/// Prints one line per program to stdout, colored if it's a terminal.
pub fn summarize(
    ladder: &Ladder,
    outcomes: &[Outcome],
    used: &[(String, u64)],
) -> anyhow::Result<()> {
    let color_choice = if atty::is(atty::Stream::Stdout) {
        termcolor::ColorChoice::Auto
    } else {
        termcolor::ColorChoice::Never
    };
    let mut out = termcolor::StandardStream::stdout(color_choice);

    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(out, "{:<24} {:<12} {:>10}", "PROGRAM", "ADDRESS", "SIZE")?;
    out.reset()?;

    for o in outcomes {
        write!(
            out,
            "{:<24} {:<12} ",
            o.program.as_str(),
            render_address(o.address)
        )?;
        let size = used
            .iter()
            .find(|(name, _)| name == o.program.as_str())
            .map(|(_, size)| *size);
        match (&o.result, size) {
            (Ok(()), Some(size)) => {
                write!(out, "{: >10}", size)?;
                let percent = percent_of(size, ladder.step());
                let mut color = ColorSpec::new();
                color.set_fg(Some(if percent >= 90 {
                    Color::Red
                } else if percent >= 50 {
                    Color::Yellow
                } else {
                    Color::Green
                }));
                out.set_color(&color)?;
                write!(out, " ({}%)", percent)?;
                out.reset()?;
                writeln!(out)?;
            }
            (Ok(()), None) => writeln!(out, "{: >10}", "-")?,
            (Err(e), _) => {
                out.set_color(
                    ColorSpec::new().set_bold(true).set_fg(Some(Color::Red)),
                )?;
                write!(out, "{: >10}", "error")?;
                out.reset()?;
                writeln!(out, ": {}", e)?;
            }
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    writeln!(
        out,
        "\n{} built, {} failed",
        outcomes.len() - failed,
        failed
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use goblin::elf::program_header::PT_NOTE;

    fn phdr(p_type: u32, p_vaddr: u64, p_memsz: u64) -> ProgramHeader {
        ProgramHeader {
            p_type,
            p_flags: 0,
            p_offset: 0,
            p_vaddr,
            p_paddr: p_vaddr,
            p_filesz: 0,
            p_memsz,
            p_align: 0x1000,
        }
    }

    #[test]
    fn span_covers_load_segments_only() {
        let phdrs = [
            phdr(PT_LOAD, 0x8040_0000, 0x1000),
            phdr(PT_NOTE, 0x1000, 0x10_0000),
            phdr(PT_LOAD, 0x8040_3000, 0x800),
            phdr(PT_LOAD, 0x9000_0000, 0),
        ];
        assert_eq!(load_span(&phdrs), Some(0x8040_0000..0x8040_3800));
        assert_eq!(load_span(&phdrs[1..2]), None);
    }

    #[test]
    fn fits_in_rung() {
        let rung = 0x8040_0000..0x8042_0000;
        let used = check_span(Some(0x8040_0000..0x8040_3800), &rung);
        assert_eq!(used.unwrap(), 0x3800);
        assert_eq!(check_span(Some(rung.clone()), &rung).unwrap(), 0x2_0000);
        assert_eq!(check_span(None, &rung).unwrap(), 0);
    }

    #[test]
    fn spills_into_next_rung() {
        let rung = 0x8040_0000..0x8042_0000;
        let err = check_span(Some(0x8040_0000..0x8042_0008), &rung)
            .unwrap_err();
        assert!(
            matches!(
                err,
                BuildError::Oversize {
                    end: 0x8042_0008,
                    rung_end: 0x8042_0000,
                    ..
                }
            ),
            "{}",
            err
        );
        // Linked below its own address: the script edit didn't take.
        assert!(check_span(Some(0x8000_0000..0x8000_1000), &rung).is_err());
    }

    #[test]
    fn percent_of_huge_rungs() {
        assert_eq!(percent_of(0x1_0000, 0x2_0000), 50);
        assert_eq!(percent_of(u64::MAX, u64::MAX), 100);
        assert_eq!(percent_of(u64::MAX / 4, u64::MAX), 24);
    }

    #[test]
    fn garbage_is_not_an_elf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog");
        std::fs::write(&path, b"not an elf").unwrap();

        let err = check(&path, &(0..0x1000)).unwrap_err();
        assert!(matches!(err, BuildError::Inspect { .. }), "{}", err);
        let missing = dir.path().join("missing");
        let err = check(&missing, &(0..0x1000)).unwrap_err();
        assert!(matches!(err, BuildError::Inspect { .. }), "{}", err);
    }
}
