//! Action scorers
//!
//! Each scorer answers "how good is this attack right now" as a plain number
//! or a `PlannedAction`. Zero (or Rethink) always means "do not"; missing
//! weapons, ammunition or time short-circuit to that neutral answer.

pub mod explosive;
pub mod melee;
pub mod psi;
pub mod ranged;
pub mod waypoint;

pub use explosive::BlastContribution;
pub use melee::valid_melee_range;
pub use ranged::FireCosts;
