//! Tactical AI - decision making for computer-controlled squad units
//!
//! A unit's turn is planned by `battle::ai::AiPlanner` against a
//! `battle::battlefield::Battlefield`; `battle::execution` carries the
//! committed actions out for headless skirmishes.

pub mod battle;
pub mod core;
