// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::ops::Range;

use crate::LadderError;

/// Name of one buildable program, e.g. `00hello_world` for
/// `src/bin/00hello_world.rs`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramId(String);

impl ProgramId {
    pub fn new(name: impl Into<String>) -> Result<Self, LadderError> {
        let name = name.into();
        if name.is_empty() {
            return Err(LadderError::EmptyName);
        }
        Ok(ProgramId(name))
    }

    /// Derives a program name from a source file name by dropping everything
    /// from the first `.` onwards. A name without a `.` is kept whole.
    pub fn from_file_name(file_name: &str) -> Result<Self, LadderError> {
        let stem = match file_name.find('.') {
            Some(i) => &file_name[..i],
            None => file_name,
        };
        Self::new(stem)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A program and the base address it is linked at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assignment {
    pub program: ProgramId,
    pub address: u64,
}

/// A fixed-pitch run of load addresses: rung `i` starts at
/// `base + i * step` and is `step` bytes long.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ladder {
    base: u64,
    step: u64,
    capacity: Option<usize>,
    limit: Option<u64>,
}

impl Ladder {
    pub fn new(base: u64, step: u64) -> Result<Self, LadderError> {
        if step == 0 {
            return Err(LadderError::ZeroStep);
        }
        Ok(Ladder {
            base,
            step,
            capacity: None,
            limit: None,
        })
    }

    /// Caps the number of rungs that may be handed out.
    pub fn with_capacity(self, capacity: usize) -> Self {
        Ladder {
            capacity: Some(capacity),
            ..self
        }
    }

    /// Sets an exclusive upper bound that no rung may extend past.
    pub fn with_limit(self, limit: u64) -> Self {
        Ladder {
            limit: Some(limit),
            ..self
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// Address range reserved for rung `index`.
    pub fn rung(&self, index: usize) -> Result<Range<u64>, LadderError> {
        u64::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(self.step))
            .and_then(|off| self.base.checked_add(off))
            .and_then(|start| Some(start..start.checked_add(self.step)?))
            .ok_or(LadderError::Overflow {
                base: self.base,
                step: self.step,
                index,
            })
    }

    /// Address range reserved for an assignment made by this ladder.
    pub fn span(&self, assignment: &Assignment) -> Range<u64> {
        // allocate() already proved address + step fits
        assignment.address..assignment.address + self.step
    }

    /// Hands out one rung per program, in order.
    ///
    /// `programs` must be sorted strictly ascending, which is what makes the
    /// allocation reproducible from nothing but the list of names.
    pub fn allocate(
        &self,
        programs: &[ProgramId],
    ) -> Result<Vec<Assignment>, LadderError> {
        check_sorted(programs)?;

        if let Some(capacity) = self.capacity {
            if programs.len() > capacity {
                return Err(LadderError::Capacity {
                    count: programs.len(),
                    capacity,
                });
            }
        }

        programs
            .iter()
            .enumerate()
            .map(|(index, program)| {
                let rung = self.rung(index)?;
                if let Some(limit) = self.limit {
                    if rung.end > limit {
                        return Err(LadderError::Limit {
                            program: program.to_string(),
                            end: rung.end,
                            limit,
                        });
                    }
                }
                Ok(Assignment {
                    program: program.clone(),
                    address: rung.start,
                })
            })
            .collect()
    }
}

/// Assigns `programs[i]` the address `base + i * step`.
pub fn allocate(
    programs: &[ProgramId],
    base: u64,
    step: u64,
) -> Result<Vec<Assignment>, LadderError> {
    Ladder::new(base, step)?.allocate(programs)
}

fn check_sorted(programs: &[ProgramId]) -> Result<(), LadderError> {
    for pair in programs.windows(2) {
        if pair[0] >= pair[1] {
            return Err(LadderError::Unsorted {
                prev: pair[0].to_string(),
                next: pair[1].to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ProgramId> {
        names.iter().map(|n| ProgramId::new(*n).unwrap()).collect()
    }

    #[test]
    fn three_chapters() {
        let programs = ids(&["ch1", "ch2", "ch3"]);
        let out = allocate(&programs, 0x8040_0000, 0x2_0000).unwrap();
        let got: Vec<_> =
            out.iter().map(|a| (a.program.as_str(), a.address)).collect();
        assert_eq!(
            got,
            [
                ("ch1", 0x8040_0000),
                ("ch2", 0x8042_0000),
                ("ch3", 0x8044_0000)
            ]
        );
    }

    #[test]
    fn rungs_are_evenly_spaced() {
        let programs: Vec<_> = (0..16)
            .map(|i| ProgramId::new(format!("{i:02}app")).unwrap())
            .collect();
        let base = 0x1000;
        let step = 0x400;

        let out = allocate(&programs, base, step).unwrap();
        assert_eq!(out.len(), programs.len());
        for (i, a) in out.iter().enumerate() {
            assert_eq!(a.address, base + i as u64 * step);
            assert_eq!(a.program, programs[i]);
        }
        assert!(out.windows(2).all(|w| w[0].address < w[1].address));

        // Same input, same answer.
        assert_eq!(out, allocate(&programs, base, step).unwrap());
    }

    #[test]
    fn empty_list() {
        assert!(allocate(&[], 0x8040_0000, 0x2_0000).unwrap().is_empty());
    }

    #[test]
    fn bad_input() {
        assert!(matches!(
            allocate(&ids(&["a"]), 0, 0),
            Err(LadderError::ZeroStep)
        ));
        assert!(matches!(
            allocate(&ids(&["b", "a"]), 0, 1),
            Err(LadderError::Unsorted { .. })
        ));
        assert!(matches!(
            allocate(&ids(&["a", "a"]), 0, 1),
            Err(LadderError::Unsorted { .. })
        ));
        assert!(matches!(
            allocate(&ids(&["a", "b"]), u64::MAX - 0x10, 0x10),
            Err(LadderError::Overflow { index: 1, .. })
        ));
    }

    #[test]
    fn capacity_and_limit() {
        let ladder = Ladder::new(0x8040_0000, 0x2_0000).unwrap();
        let programs = ids(&["a", "b", "c"]);

        let err = ladder.with_capacity(2).allocate(&programs).unwrap_err();
        assert!(matches!(err, LadderError::Capacity { count: 3, capacity: 2 }));

        // Exactly filling the window is fine...
        let out = ladder.with_limit(0x8046_0000).allocate(&programs).unwrap();
        assert_eq!(ladder.span(&out[2]), 0x8044_0000..0x8046_0000);

        // ...one byte short is not.
        let err =
            ladder.with_limit(0x8045_ffff).allocate(&programs).unwrap_err();
        match err {
            LadderError::Limit { program, end, .. } => {
                assert_eq!(program, "c");
                assert_eq!(end, 0x8046_0000);
            }
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn names_from_files() {
        let id = |s| ProgramId::from_file_name(s).unwrap();
        assert_eq!(id("00hello_world.rs").as_str(), "00hello_world");
        assert_eq!(id("user_shell").as_str(), "user_shell");
        assert_eq!(id("odd.name.rs").as_str(), "odd");
        assert!(matches!(
            ProgramId::from_file_name(".hidden"),
            Err(LadderError::EmptyName)
        ));
    }
}
