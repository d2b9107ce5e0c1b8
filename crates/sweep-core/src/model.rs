//! Container and child item types.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Wire id of the ungrouped pseudo-container (direct conversations).
pub const UNGROUPED_ID: &str = "dms";

/// Identifier of a top-level container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub CompactString);

impl ContainerId {
    /// Create a container id.
    pub fn new(id: impl Into<CompactString>) -> Self {
        Self(id.into())
    }

    /// The distinguished ungrouped pseudo-container.
    pub fn ungrouped() -> Self {
        Self(CompactString::const_new(UNGROUPED_ID))
    }

    /// Check if this is the ungrouped pseudo-container.
    pub fn is_ungrouped(&self) -> bool {
        self.0 == UNGROUPED_ID
    }

    /// The id as the processor expects it: `None` for the ungrouped container.
    pub fn boundary_id(&self) -> Option<&str> {
        if self.is_ungrouped() {
            None
        } else {
            Some(self.0.as_str())
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of a child item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub CompactString);

impl ItemId {
    /// Create an item id.
    pub fn new(id: impl Into<CompactString>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A top-level addressable group, supplied by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub name: CompactString,
}

impl Container {
    /// Create a new container.
    pub fn new(id: impl Into<ContainerId>, name: impl Into<CompactString>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The ungrouped pseudo-container with its display name.
    pub fn ungrouped() -> Self {
        Self {
            id: ContainerId::ungrouped(),
            name: CompactString::const_new("Direct Messages"),
        }
    }
}

/// Kind of child item.
///
/// Raw values follow the processor's channel type numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    /// Text channel inside a container.
    Text,
    /// One-to-one direct conversation.
    Direct,
    /// Voice channel.
    Voice,
    /// Group conversation.
    Group,
    /// Announcement channel.
    Announcement,
    /// Forum channel.
    Forum,
    /// Any other raw type.
    Other(u8),
}

impl ItemKind {
    /// Decode a raw type number.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Text,
            1 => Self::Direct,
            2 => Self::Voice,
            3 => Self::Group,
            5 => Self::Announcement,
            15 => Self::Forum,
            other => Self::Other(other),
        }
    }

    /// Encode back to the raw type number.
    pub fn raw(self) -> u8 {
        match self {
            Self::Text => 0,
            Self::Direct => 1,
            Self::Voice => 2,
            Self::Group => 3,
            Self::Announcement => 5,
            Self::Forum => 15,
            Self::Other(raw) => raw,
        }
    }

    /// Check if this is a private conversation (direct or group).
    pub fn is_private(self) -> bool {
        matches!(self, Self::Direct | Self::Group)
    }
}

/// A leaf unit owned by exactly one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildItem {
    pub id: ItemId,
    pub name: CompactString,
    pub kind: ItemKind,
    /// Owning container.
    pub container: ContainerId,
}

impl ChildItem {
    /// Create a new child item.
    pub fn new(
        id: impl Into<ItemId>,
        name: impl Into<CompactString>,
        kind: ItemKind,
        container: impl Into<ContainerId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            container: container.into(),
        }
    }
}
