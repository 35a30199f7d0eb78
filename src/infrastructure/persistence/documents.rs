//! Names of the logical JSON documents backing the engine (spec.md §6).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentName {
    Agents,
    Sectors,
    Discussions,
    /// Legacy mirror of `Discussions`, minus decision fields (spec.md §9 Open Questions).
    Debates,
    Comms,
    PriceHistory,
    ExecutionLogs,
}

impl DocumentName {
    pub fn file_name(self) -> &'static str {
        match self {
            DocumentName::Agents => "agents.json",
            DocumentName::Sectors => "sectors.json",
            DocumentName::Discussions => "discussions.json",
            DocumentName::Debates => "debates.json",
            DocumentName::Comms => "comms.json",
            DocumentName::PriceHistory => "priceHistory.json",
            DocumentName::ExecutionLogs => "executionLogs.json",
        }
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}
