//! Operating modes and their parameter shapes.

use chrono::{DateTime, TimeDelta, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::model::{ContainerId, ItemId};

/// The closed set of bulk operating modes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Remove messages from selected child items.
    #[default]
    Messages,
    /// Leave selected containers.
    Servers,
    /// Remove selected relationships.
    Identity,
}

/// What a mode's parameters target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetShape {
    ChildItems,
    Containers,
    Relationships,
}

/// Static configuration record of a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSpec {
    /// Literal phrase the user must type, already upper-case.
    pub phrase: &'static str,
    /// Verb shown while the operation runs.
    pub action: &'static str,
    /// Label for the units-affected counter.
    pub affected_label: &'static str,
    pub targets: TargetShape,
}

const MESSAGES: ModeSpec = ModeSpec {
    phrase: "DELETE",
    action: "Purging",
    affected_label: "Messages removed",
    targets: TargetShape::ChildItems,
};

const SERVERS: ModeSpec = ModeSpec {
    phrase: "LEAVE",
    action: "Leaving",
    affected_label: "Servers left",
    targets: TargetShape::Containers,
};

const IDENTITY: ModeSpec = ModeSpec {
    phrase: "REMOVE",
    action: "Removing",
    affected_label: "Links removed",
    targets: TargetShape::Relationships,
};

impl Mode {
    /// The configuration record for this mode.
    pub const fn spec(self) -> &'static ModeSpec {
        match self {
            Self::Messages => &MESSAGES,
            Self::Servers => &SERVERS,
            Self::Identity => &IDENTITY,
        }
    }

    /// The confirmation phrase for this mode.
    pub const fn required_phrase(self) -> &'static str {
        self.spec().phrase
    }

    /// All modes in declaration order.
    pub fn all() -> impl Iterator<Item = Mode> {
        Self::iter()
    }
}

/// Time window for message removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(ascii_case_insensitive)]
pub enum TimeRange {
    /// The last 24 hours.
    #[strum(serialize = "24h")]
    #[serde(rename = "24h")]
    Day,
    /// The last 7 days.
    #[strum(serialize = "7d")]
    #[serde(rename = "7d")]
    Week,
    /// No lower bound.
    #[default]
    #[strum(serialize = "all")]
    #[serde(rename = "all")]
    All,
}

impl TimeRange {
    /// Lower bound in milliseconds since the epoch, relative to `now`.
    pub fn start_time(self, now: DateTime<Utc>) -> Option<i64> {
        let window = match self {
            Self::Day => TimeDelta::days(1),
            Self::Week => TimeDelta::days(7),
            Self::All => return None,
        };
        Some((now - window).timestamp_millis())
    }
}

/// Filters applied by a messages-mode run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessagePurgeOptions {
    #[serde(default)]
    pub time_range: TimeRange,
    /// Only remove messages containing this text.
    #[serde(default)]
    pub search_query: Option<String>,
    /// Also remove own reactions.
    #[serde(default)]
    pub purge_reactions: bool,
    /// Only remove messages carrying attachments.
    #[serde(default)]
    pub only_attachments: bool,
    /// Count matches without removing anything.
    #[serde(default)]
    pub simulation: bool,
    /// Close direct conversations left empty.
    #[serde(default)]
    pub close_empty_dms: bool,
}

impl MessagePurgeOptions {
    /// Set the search query; an empty string clears it.
    pub fn with_search_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.search_query = if query.trim().is_empty() {
            None
        } else {
            Some(query)
        };
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = range;
        self
    }

    pub fn with_simulation(mut self, simulation: bool) -> Self {
        self.simulation = simulation;
        self
    }
}

/// Mode-specific parameters for a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ModeParameters {
    Messages {
        child_ids: Vec<ItemId>,
        options: MessagePurgeOptions,
    },
    Servers {
        container_ids: Vec<ContainerId>,
    },
    Identity {
        relationship_ids: Vec<CompactString>,
    },
}

impl ModeParameters {
    /// Messages-mode parameters.
    pub fn messages(
        child_ids: impl IntoIterator<Item = ItemId>,
        options: MessagePurgeOptions,
    ) -> Self {
        Self::Messages {
            child_ids: child_ids.into_iter().collect(),
            options,
        }
    }

    /// Servers-mode parameters. The ungrouped pseudo-container cannot be left
    /// and is dropped.
    pub fn servers(container_ids: impl IntoIterator<Item = ContainerId>) -> Self {
        Self::Servers {
            container_ids: container_ids
                .into_iter()
                .filter(|id| !id.is_ungrouped())
                .collect(),
        }
    }

    /// Identity-mode parameters.
    pub fn identity<S: Into<CompactString>>(relationship_ids: impl IntoIterator<Item = S>) -> Self {
        Self::Identity {
            relationship_ids: relationship_ids.into_iter().map(Into::into).collect(),
        }
    }

    /// The mode these parameters belong to.
    pub fn mode(&self) -> Mode {
        match self {
            Self::Messages { .. } => Mode::Messages,
            Self::Servers { .. } => Mode::Servers,
            Self::Identity { .. } => Mode::Identity,
        }
    }

    /// Number of targets in the request.
    pub fn target_count(&self) -> usize {
        match self {
            Self::Messages { child_ids, .. } => child_ids.len(),
            Self::Servers { container_ids } => container_ids.len(),
            Self::Identity { relationship_ids } => relationship_ids.len(),
        }
    }

    /// Target ids as plain strings, in request order.
    pub fn target_ids(&self) -> Vec<&str> {
        match self {
            Self::Messages { child_ids, .. } => child_ids.iter().map(ItemId::as_str).collect(),
            Self::Servers { container_ids } => {
                container_ids.iter().map(ContainerId::as_str).collect()
            }
            Self::Identity { relationship_ids } => {
                relationship_ids.iter().map(CompactString::as_str).collect()
            }
        }
    }
}
