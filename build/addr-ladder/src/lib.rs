// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Links a set of independently built programs at fixed, non-overlapping
//! load addresses.
//!
//! Programs are placed on a *ladder*: program `i` (in sorted order) is linked
//! at `base + i * step`. The build tool only learns the address through a
//! single shared linker script, so for each program we write the address into
//! that script, run the build, and put the script back exactly as it was
//! before moving on. [`build_all`] guarantees the script is restored on every
//! path out of a build, including a panic.
//!
//! ```no_run
//! # use addr_ladder::*;
//! # fn main() -> Result<(), LadderError> {
//! let programs = ["ch1", "ch2", "ch3"]
//!     .into_iter()
//!     .map(ProgramId::new)
//!     .collect::<Result<Vec<_>, _>>()?;
//! let plan = allocate(&programs, 0x8040_0000, 0x2_0000)?;
//! let outcomes = build_all(
//!     &plan,
//!     "src/linker.ld".as_ref(),
//!     &Placeholder::address(0x8040_0000)?,
//!     FailurePolicy::Continue,
//!     |_program, _address| Ok(()),
//! )?;
//! assert_eq!(outcomes.len(), 3);
//! # Ok(())
//! # }
//! ```

mod build;
mod error;
mod ladder;
mod placeholder;
mod script;

pub use build::{build_all, AddressLadderBuilder, FailurePolicy, Outcome};
pub use error::{BuildError, LadderError};
pub use ladder::{allocate, Assignment, Ladder, ProgramId};
pub use placeholder::{render_address, Placeholder, PlaceholderKind};
pub use script::{LinkScript, ScopedEdit};
