pub mod config;
pub mod error;
pub mod types;

pub use config::PlanningContext;
pub use error::{AiError, Result};
pub use types::{Direction, Faction, NodeId, Position, UnitId};
