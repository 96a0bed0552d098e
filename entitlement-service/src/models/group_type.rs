//! Group type filter for list results.

use serde::{Deserialize, Serialize};

/// Group kind used to narrow `list_groups` results. Absence of a filter is
/// expressed with `Option::None` at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupType {
    Data,
    User,
    Service,
}

impl std::str::FromStr for GroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DATA" => Ok(GroupType::Data),
            "USER" => Ok(GroupType::User),
            "SERVICE" => Ok(GroupType::Service),
            _ => Err(format!("Invalid group type: {}", s)),
        }
    }
}
