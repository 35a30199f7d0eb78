//! External collaborators and I/O: durable storage and the oracle boundary.

pub mod oracle;
pub mod persistence;
