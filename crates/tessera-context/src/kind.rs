//! Context kinds
//!
//! A kind is the shape of a context's storage. Kinds form a small
//! subtype lattice used to check arrangement compatibility:
//! - Construct is a Dict
//! - LifoQueue and PriorityQueue are Queues
//! - AsyncLifoQueue and AsyncPriorityQueue are AsyncQueues

use crate::LinkPolicy;

/// Shape of a context
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Ordered key/value mapping
    Dict,
    /// Ordered mapping that links to its supercontext under `"_"`
    Construct,
    List,
    Deque,
    Queue,
    LifoQueue,
    PriorityQueue,
    AsyncQueue,
    AsyncLifoQueue,
    AsyncPriorityQueue,
    ByteArray,
    /// Byte buffer with a read/write cursor
    Stream,
    Counter,
}

/// Which hook variant runs around mutations of a kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookMode {
    Blocking,
    Cooperative,
}

impl ContextKind {
    /// Kind allocated when neither a type nor its descent declares one
    pub const DEFAULT: ContextKind = ContextKind::Construct;

    pub fn name(self) -> &'static str {
        match self {
            ContextKind::Dict => "dict",
            ContextKind::Construct => "construct",
            ContextKind::List => "list",
            ContextKind::Deque => "deque",
            ContextKind::Queue => "queue",
            ContextKind::LifoQueue => "lifo-queue",
            ContextKind::PriorityQueue => "priority-queue",
            ContextKind::AsyncQueue => "async-queue",
            ContextKind::AsyncLifoQueue => "async-lifo-queue",
            ContextKind::AsyncPriorityQueue => "async-priority-queue",
            ContextKind::ByteArray => "byte-array",
            ContextKind::Stream => "stream",
            ContextKind::Counter => "counter",
        }
    }

    /// Immediate supertype in the kind lattice
    pub fn base(self) -> Option<ContextKind> {
        match self {
            ContextKind::Construct => Some(ContextKind::Dict),
            ContextKind::LifoQueue | ContextKind::PriorityQueue => Some(ContextKind::Queue),
            ContextKind::AsyncLifoQueue | ContextKind::AsyncPriorityQueue => {
                Some(ContextKind::AsyncQueue)
            }
            _ => None,
        }
    }

    /// Whether a context of this kind can stand in for one of `base`
    pub fn is_compatible_with(self, base: ContextKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == base {
                return true;
            }
            current = kind.base();
        }
        false
    }

    pub fn hook_mode(self) -> HookMode {
        match self {
            ContextKind::AsyncQueue
            | ContextKind::AsyncLifoQueue
            | ContextKind::AsyncPriorityQueue => HookMode::Cooperative,
            _ => HookMode::Blocking,
        }
    }

    #[inline]
    pub fn is_mapping(self) -> bool {
        matches!(self, ContextKind::Dict | ContextKind::Construct)
    }

    #[inline]
    pub fn is_queue(self) -> bool {
        self.is_compatible_with(ContextKind::Queue) || self.is_compatible_with(ContextKind::AsyncQueue)
    }

    pub fn default_link_policy(self) -> LinkPolicy {
        match self {
            ContextKind::Construct => LinkPolicy::upward(),
            _ => LinkPolicy::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_compatibility() {
        assert!(ContextKind::Construct.is_compatible_with(ContextKind::Dict));
        assert!(!ContextKind::Dict.is_compatible_with(ContextKind::Construct));
        assert!(ContextKind::LifoQueue.is_compatible_with(ContextKind::Queue));
        assert!(!ContextKind::Queue.is_compatible_with(ContextKind::List));
        assert!(ContextKind::List.is_compatible_with(ContextKind::List));
    }

    #[test]
    fn test_async_kinds_are_cooperative() {
        assert_eq!(ContextKind::AsyncPriorityQueue.hook_mode(), HookMode::Cooperative);
        assert_eq!(ContextKind::Queue.hook_mode(), HookMode::Blocking);
        assert!(ContextKind::AsyncLifoQueue.is_queue());
    }

    #[test]
    fn test_default_kind_links_upward() {
        assert_eq!(ContextKind::DEFAULT.default_link_policy(), LinkPolicy::upward());
        assert_eq!(ContextKind::List.default_link_policy(), LinkPolicy::None);
    }
}
