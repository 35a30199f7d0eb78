//! Core entities and invariants (spec.md §3): `Agent`, `Sector`,
//! `DiscussionRoom`, `AgentSignal`, and cross-sector messaging. These are
//! plain data + invariant-enforcing methods; PersistenceStore owns the
//! canonical copies, per DESIGN NOTES §9 ("flat tables keyed by id").

pub mod agent;
pub mod comms;
pub mod discussion;
pub mod errors;
pub mod sector;
pub mod signal;
