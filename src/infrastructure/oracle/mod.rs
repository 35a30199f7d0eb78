pub mod client;
pub mod request;
pub mod rule_based;

pub use client::OracleClient;
pub use request::{extract_json, OracleRequest, ReasoningOracle};
pub use rule_based::{NullOracle, RuleBasedOracle};
