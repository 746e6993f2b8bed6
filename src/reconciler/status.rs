//! Unit status reported after every pass.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum UnitStatus {
    Active,
    Maintenance(String),
    /// Expected to resolve on a later event without user action.
    Waiting(String),
    /// Needs an operator to change configuration.
    Blocked(String),
}

impl UnitStatus {
    pub fn waiting(msg: impl Into<String>) -> Self {
        UnitStatus::Waiting(msg.into())
    }

    pub fn blocked(msg: impl Into<String>) -> Self {
        UnitStatus::Blocked(msg.into())
    }

    pub fn maintenance(msg: impl Into<String>) -> Self {
        UnitStatus::Maintenance(msg.into())
    }

    /// Lowercase status name, used as a metric label.
    pub fn name(&self) -> &'static str {
        match self {
            UnitStatus::Active => "active",
            UnitStatus::Maintenance(_) => "maintenance",
            UnitStatus::Waiting(_) => "waiting",
            UnitStatus::Blocked(_) => "blocked",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Active => "",
            UnitStatus::Maintenance(m) | UnitStatus::Waiting(m) | UnitStatus::Blocked(m) => m,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, UnitStatus::Active)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Active => f.write_str("active"),
            other => write!(f, "{}: {}", other.name(), other.message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(UnitStatus::Active.to_string(), "active");
        assert_eq!(
            UnitStatus::waiting("Waiting for leadership").to_string(),
            "waiting: Waiting for leadership"
        );
    }

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_value(UnitStatus::blocked("bad option")).unwrap();
        assert_eq!(json, serde_json::json!({"status": "blocked", "message": "bad option"}));
        let json = serde_json::to_value(UnitStatus::Active).unwrap();
        assert_eq!(json, serde_json::json!({"status": "active"}));
    }
}
