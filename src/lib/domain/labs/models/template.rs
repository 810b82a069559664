use serde::{Deserialize, Serialize};

/// Read-only lab definition offered for one-click installation.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub icon: String,
    pub compose: String,
}

impl Template {
    /// Lower-cased name with whitespace runs replaced by `-`, e.g. "redis-cache".
    pub fn slug(&self) -> String {
        self.name
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-")
    }
}
