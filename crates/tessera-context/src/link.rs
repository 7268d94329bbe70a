//! Link policies
//!
//! When two contexts are connected, each side may record the other in its
//! own storage so the graph can be traversed from inside a context:
//! - Upward: the parent link is stored under a key (a linked list)
//! - SinglyDownward: the latest child link is stored under a key
//! - Downward: all child links are collected in a list under a key
//! - RootedTree: Upward + Downward
//! - DoublyLinked: Upward + SinglyDownward

pub const SUPERCONTEXT_KEY: &str = "_";
pub const SUBCONTEXT_KEY: &str = "__";

/// How a context records its neighbours on `connect`
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum LinkPolicy {
    #[default]
    None,
    Upward { key: String },
    SinglyDownward { key: String },
    Downward { key: String },
    RootedTree { up: String, down: String },
    DoublyLinked { up: String, down: String },
}

impl LinkPolicy {
    pub fn upward() -> Self {
        LinkPolicy::Upward {
            key: SUPERCONTEXT_KEY.into(),
        }
    }

    pub fn singly_downward() -> Self {
        LinkPolicy::SinglyDownward {
            key: SUBCONTEXT_KEY.into(),
        }
    }

    pub fn downward() -> Self {
        LinkPolicy::Downward {
            key: SUBCONTEXT_KEY.into(),
        }
    }

    pub fn rooted_tree() -> Self {
        LinkPolicy::RootedTree {
            up: SUPERCONTEXT_KEY.into(),
            down: SUBCONTEXT_KEY.into(),
        }
    }

    pub fn doubly_linked() -> Self {
        LinkPolicy::DoublyLinked {
            up: SUPERCONTEXT_KEY.into(),
            down: SUBCONTEXT_KEY.into(),
        }
    }

    /// Key the supercontext link is stored under, if any
    pub fn up_key(&self) -> Option<&str> {
        match self {
            LinkPolicy::Upward { key } => Some(key),
            LinkPolicy::RootedTree { up, .. } | LinkPolicy::DoublyLinked { up, .. } => Some(up),
            _ => None,
        }
    }

    /// Key the subcontext link(s) are stored under, and whether all children are kept
    pub fn down_key(&self) -> Option<(&str, bool)> {
        match self {
            LinkPolicy::SinglyDownward { key } => Some((key, false)),
            LinkPolicy::Downward { key } => Some((key, true)),
            LinkPolicy::RootedTree { down, .. } => Some((down, true)),
            LinkPolicy::DoublyLinked { down, .. } => Some((down, false)),
            _ => None,
        }
    }
}
