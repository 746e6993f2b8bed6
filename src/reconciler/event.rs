//! Lifecycle events and hook names.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

const PEBBLE_READY_SUFFIX: &str = "-pebble-ready";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationEventKind {
    Created,
    Changed,
    Broken,
}

impl RelationEventKind {
    fn as_str(self) -> &'static str {
        match self {
            RelationEventKind::Created => "created",
            RelationEventKind::Changed => "changed",
            RelationEventKind::Broken => "broken",
        }
    }
}

/// A lifecycle event delivered to the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Install,
    ConfigChanged,
    UpgradeCharm,
    LeaderElected,
    /// The named container's workload agent became reachable.
    WorkloadReady(String),
    UpdateStatus,
    Relation {
        endpoint: String,
        kind: RelationEventKind,
    },
    /// Any hook this operator does not know about.
    Other(String),
}

/// Discriminant of [`Event`], used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Install,
    ConfigChanged,
    UpgradeCharm,
    LeaderElected,
    WorkloadReady,
    UpdateStatus,
    Relation,
    Other,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Install => EventKind::Install,
            Event::ConfigChanged => EventKind::ConfigChanged,
            Event::UpgradeCharm => EventKind::UpgradeCharm,
            Event::LeaderElected => EventKind::LeaderElected,
            Event::WorkloadReady(_) => EventKind::WorkloadReady,
            Event::UpdateStatus => EventKind::UpdateStatus,
            Event::Relation { .. } => EventKind::Relation,
            Event::Other(_) => EventKind::Other,
        }
    }
}

impl FromStr for Event {
    type Err = Infallible;

    /// Parse a hook name. Unknown names become [`Event::Other`].
    fn from_str(hook: &str) -> Result<Self, Self::Err> {
        let event = match hook {
            "install" => Event::Install,
            "config-changed" => Event::ConfigChanged,
            "upgrade-charm" => Event::UpgradeCharm,
            "leader-elected" => Event::LeaderElected,
            "update-status" => Event::UpdateStatus,
            _ => parse_suffixed(hook).unwrap_or_else(|| Event::Other(hook.to_string())),
        };
        Ok(event)
    }
}

fn parse_suffixed(hook: &str) -> Option<Event> {
    if let Some(container) = hook.strip_suffix(PEBBLE_READY_SUFFIX) {
        return (!container.is_empty()).then(|| Event::WorkloadReady(container.to_string()));
    }

    let (endpoint, kind) = hook.rsplit_once("-relation-")?;
    let kind = match kind {
        "created" => RelationEventKind::Created,
        "changed" => RelationEventKind::Changed,
        "broken" => RelationEventKind::Broken,
        _ => return None,
    };
    (!endpoint.is_empty()).then(|| Event::Relation {
        endpoint: endpoint.to_string(),
        kind,
    })
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Install => f.write_str("install"),
            Event::ConfigChanged => f.write_str("config-changed"),
            Event::UpgradeCharm => f.write_str("upgrade-charm"),
            Event::LeaderElected => f.write_str("leader-elected"),
            Event::WorkloadReady(container) => write!(f, "{}{}", container, PEBBLE_READY_SUFFIX),
            Event::UpdateStatus => f.write_str("update-status"),
            Event::Relation { endpoint, kind } => {
                write!(f, "{}-relation-{}", endpoint, kind.as_str())
            }
            Event::Other(hook) => f.write_str(hook),
        }
    }
}
