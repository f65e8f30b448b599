//! Use cases (interactors) for polysync
//!
//! Use cases are thin coordinators that delegate business rules to domain
//! methods and I/O to ports.
//!
//! ## Use Cases
//!
//! - [`order_changes`] - Orders a change batch so it can be applied sequentially
//! - [`ApplyChangesUseCase`] - Applies an ordered batch between two adapters

pub mod apply_changes;
pub mod order_changes;

pub use apply_changes::{ApplyChangesUseCase, ApplyReport, EntryOutcome, EntryStatus};
pub use order_changes::{compare_changes, order_changes, ChangeClass};
