//! polysync Core - Domain logic and adapter contract
//!
//! This crate contains the backend-agnostic synchronization substrate:
//! - **Domain entities** - `SyncEntry`, `AdapterEntryData`, `EntryTree`, change records
//! - **Fault taxonomy** - `SyncFault` and `FaultKind`, shared by every adapter
//! - **Port definitions** - `IAdapter` (plus the optional capability traits),
//!   `IReadStream`/`IWriteStream`, and `IEntryRepository`
//! - **Adapter registry** - explicit registry from adapter type ids to factories
//! - **Use cases** - change ordering and sequential application of a change batch
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure logic with no I/O. Ports define trait
//! interfaces that adapter crates (`polysync-sync`, `polysync-http`,
//! `polysync-cache`) implement. Use cases orchestrate domain entities
//! through port interfaces.

pub mod config;
pub mod domain;
pub mod ports;
pub mod registry;
pub mod usecases;
