use serde::{Deserialize, Serialize};

/// Result of the bogon classifier (§4.1): whether an address is routable on
/// the public Internet and, if not, why.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_reserved: bool,
    #[serde(default)]
    pub is_loopback: bool,
    #[serde(default)]
    pub is_multicast: bool,
    #[serde(default)]
    pub is_bogon: bool,
}

impl ValidationRecord {
    /// A record for a malformed input: treated as bogon per spec.md §4.1.
    #[must_use]
    pub const fn malformed() -> Self {
        Self {
            is_private: false,
            is_reserved: false,
            is_loopback: false,
            is_multicast: false,
            is_bogon: true,
        }
    }
}
