//! Mutation operations
//!
//! Every change to a context is expressed as a `Mutation`. The method
//! name is what hook pools filter on.

use tessera_core::Value;

/// A mutating operation on a context
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    /// Set a mapping key (returns the previous value)
    Insert { key: String, value: Value },
    /// Remove a mapping key (returns the removed value)
    Remove { key: String },
    /// Append to a sequence or byte array
    Push(Value),
    /// Prepend to a deque
    PushFront(Value),
    /// Remove by index (`None` = last)
    Pop(Option<isize>),
    /// Remove the first element of a deque
    PopFront,
    InsertAt { index: isize, value: Value },
    SetAt { index: isize, value: Value },
    /// Remove the first element equal to the value
    RemoveItem(Value),
    Extend(Vec<Value>),
    Reverse,
    Clear,
    /// Enqueue
    Put(Value),
    /// Dequeue without waiting (returns `None` when empty)
    Take,
    /// Write bytes at the cursor (stream) or append (byte array)
    Write(Vec<u8>),
    /// Read up to n bytes from the cursor
    Read(usize),
    Seek(usize),
    /// Add a delta to a counter key
    Update { key: String, delta: i64 },
}

impl Mutation {
    pub fn insert(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Mutation::Insert {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Mutation::Remove { key: key.into() }
    }

    pub fn update(key: impl Into<String>, delta: i64) -> Self {
        Mutation::Update {
            key: key.into(),
            delta,
        }
    }

    /// Stable method name used for hook filtering
    pub fn method(&self) -> &'static str {
        match self {
            Mutation::Insert { .. } => "insert",
            Mutation::Remove { .. } => "remove",
            Mutation::Push(_) => "push",
            Mutation::PushFront(_) => "push_front",
            Mutation::Pop(_) => "pop",
            Mutation::PopFront => "pop_front",
            Mutation::InsertAt { .. } => "insert_at",
            Mutation::SetAt { .. } => "set_at",
            Mutation::RemoveItem(_) => "remove_item",
            Mutation::Extend(_) => "extend",
            Mutation::Reverse => "reverse",
            Mutation::Clear => "clear",
            Mutation::Put(_) => "put",
            Mutation::Take => "take",
            Mutation::Write(_) => "write",
            Mutation::Read(_) => "read",
            Mutation::Seek(_) => "seek",
            Mutation::Update { .. } => "update",
        }
    }
}
