//! Context storage

use std::collections::VecDeque;

use bytes::BytesMut;
use indexmap::IndexMap;
use tessera_core::{ContextId, TesseraError, TesseraResult, Value};

use crate::{ContextKind, Mutation};

/// Storage backing a context, one variant per family of kinds
#[derive(Clone, Debug)]
pub enum ContextData {
    Map(IndexMap<String, Value>),
    Seq(Vec<Value>),
    Deque(VecDeque<Value>),
    Fifo(VecDeque<Value>),
    Lifo(Vec<Value>),
    /// Kept sorted ascending; `Take` removes the smallest
    Priority(Vec<Value>),
    Bytes(Vec<u8>),
    Stream { buf: BytesMut, pos: usize },
    Counter(IndexMap<String, i64>),
}

impl ContextData {
    pub fn new(kind: ContextKind) -> Self {
        match kind {
            ContextKind::Dict | ContextKind::Construct => ContextData::Map(IndexMap::new()),
            ContextKind::List => ContextData::Seq(Vec::new()),
            ContextKind::Deque => ContextData::Deque(VecDeque::new()),
            ContextKind::Queue | ContextKind::AsyncQueue => ContextData::Fifo(VecDeque::new()),
            ContextKind::LifoQueue | ContextKind::AsyncLifoQueue => ContextData::Lifo(Vec::new()),
            ContextKind::PriorityQueue | ContextKind::AsyncPriorityQueue => {
                ContextData::Priority(Vec::new())
            }
            ContextKind::ByteArray => ContextData::Bytes(Vec::new()),
            ContextKind::Stream => ContextData::Stream {
                buf: BytesMut::new(),
                pos: 0,
            },
            ContextKind::Counter => ContextData::Counter(IndexMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ContextData::Map(m) => m.len(),
            ContextData::Seq(v) | ContextData::Lifo(v) | ContextData::Priority(v) => v.len(),
            ContextData::Deque(d) | ContextData::Fifo(d) => d.len(),
            ContextData::Bytes(b) => b.len(),
            ContextData::Stream { buf, .. } => buf.len(),
            ContextData::Counter(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mapping lookup (counters report their count as an Int)
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            ContextData::Map(m) => m.get(key).cloned(),
            ContextData::Counter(c) => c.get(key).map(|n| Value::Int(*n)),
            _ => None,
        }
    }

    /// Positional lookup for sequences, queues and byte buffers
    pub fn at(&self, index: isize) -> Option<Value> {
        let len = self.len();
        let i = normalize(index, len)?;
        match self {
            ContextData::Seq(v) | ContextData::Lifo(v) | ContextData::Priority(v) => v.get(i).cloned(),
            ContextData::Deque(d) | ContextData::Fifo(d) => d.get(i).cloned(),
            ContextData::Bytes(b) => b.get(i).map(|b| Value::UInt(*b as u64)),
            ContextData::Stream { buf, .. } => buf.get(i).map(|b| Value::UInt(*b as u64)),
            _ => None,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        match self {
            ContextData::Map(m) => m.keys().cloned().collect(),
            ContextData::Counter(c) => c.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            ContextData::Bytes(b) => Some(b),
            ContextData::Stream { buf, .. } => Some(buf),
            _ => None,
        }
    }

    /// Apply a mutation, returning the value it yields (popped, removed, read...)
    pub fn apply(
        &mut self,
        mutation: &Mutation,
        id: ContextId,
        kind: ContextKind,
    ) -> TesseraResult<Option<Value>> {
        let unsupported = || TesseraError::KindMismatch {
            context: id,
            kind: kind.name(),
            method: mutation.method(),
        };

        match (self, mutation) {
            // Mappings
            (ContextData::Map(m), Mutation::Insert { key, value }) => {
                Ok(m.insert(key.clone(), value.clone()))
            }
            (ContextData::Map(m), Mutation::Remove { key }) => Ok(m.shift_remove(key)),
            (ContextData::Map(m), Mutation::Clear) => {
                m.clear();
                Ok(None)
            }

            // Counters
            (ContextData::Counter(c), Mutation::Update { key, delta }) => {
                let entry = c.entry(key.clone()).or_insert(0);
                *entry = entry.checked_add(*delta).ok_or_else(|| {
                    TesseraError::Constraint(format!("counter {:?} overflows adding {}", key, delta))
                })?;
                Ok(Some(Value::Int(*entry)))
            }
            (ContextData::Counter(c), Mutation::Insert { key, value }) => {
                let n = value.as_int().ok_or_else(|| {
                    TesseraError::Constraint(format!("counter value must be an integer, got {}", value))
                })?;
                Ok(c.insert(key.clone(), n).map(Value::Int))
            }
            (ContextData::Counter(c), Mutation::Remove { key }) => {
                Ok(c.shift_remove(key).map(Value::Int))
            }
            (ContextData::Counter(c), Mutation::Clear) => {
                c.clear();
                Ok(None)
            }

            // Lists
            (ContextData::Seq(v), Mutation::Push(value)) => {
                v.push(value.clone());
                Ok(None)
            }
            (ContextData::Seq(v), Mutation::Pop(index)) => {
                let i = checked_index(index.unwrap_or(-1), v.len())?;
                Ok(Some(v.remove(i)))
            }
            (ContextData::Seq(v), Mutation::InsertAt { index, value }) => {
                let i = clamp_index(*index, v.len());
                v.insert(i, value.clone());
                Ok(None)
            }
            (ContextData::Seq(v), Mutation::SetAt { index, value }) => {
                let i = checked_index(*index, v.len())?;
                Ok(Some(std::mem::replace(&mut v[i], value.clone())))
            }
            (ContextData::Seq(v), Mutation::RemoveItem(value)) => {
                let i = v.iter().position(|item| item == value).ok_or_else(|| {
                    TesseraError::Constraint(format!("{} not in list", value))
                })?;
                Ok(Some(v.remove(i)))
            }
            (ContextData::Seq(v), Mutation::Extend(items)) => {
                v.extend(items.iter().cloned());
                Ok(None)
            }
            (ContextData::Seq(v), Mutation::Reverse) => {
                v.reverse();
                Ok(None)
            }
            (ContextData::Seq(v), Mutation::Clear) => {
                v.clear();
                Ok(None)
            }

            // Deques
            (ContextData::Deque(d), Mutation::Push(value)) => {
                d.push_back(value.clone());
                Ok(None)
            }
            (ContextData::Deque(d), Mutation::PushFront(value)) => {
                d.push_front(value.clone());
                Ok(None)
            }
            (ContextData::Deque(d), Mutation::Pop(index)) => {
                let i = checked_index(index.unwrap_or(-1), d.len())?;
                Ok(d.remove(i))
            }
            (ContextData::Deque(d), Mutation::PopFront) => {
                if d.is_empty() {
                    return Err(TesseraError::IndexOutOfRange { index: 0, len: 0 });
                }
                Ok(d.pop_front())
            }
            (ContextData::Deque(d), Mutation::InsertAt { index, value }) => {
                let i = clamp_index(*index, d.len());
                d.insert(i, value.clone());
                Ok(None)
            }
            (ContextData::Deque(d), Mutation::SetAt { index, value }) => {
                let i = checked_index(*index, d.len())?;
                Ok(Some(std::mem::replace(&mut d[i], value.clone())))
            }
            (ContextData::Deque(d), Mutation::RemoveItem(value)) => {
                let i = d.iter().position(|item| item == value).ok_or_else(|| {
                    TesseraError::Constraint(format!("{} not in deque", value))
                })?;
                Ok(d.remove(i))
            }
            (ContextData::Deque(d), Mutation::Extend(items)) => {
                d.extend(items.iter().cloned());
                Ok(None)
            }
            (ContextData::Deque(d), Mutation::Reverse) => {
                d.make_contiguous().reverse();
                Ok(None)
            }
            (ContextData::Deque(d), Mutation::Clear) => {
                d.clear();
                Ok(None)
            }

            // Queues
            (ContextData::Fifo(q), Mutation::Put(value)) => {
                q.push_back(value.clone());
                Ok(None)
            }
            (ContextData::Fifo(q), Mutation::Take) => Ok(q.pop_front()),
            (ContextData::Lifo(q), Mutation::Put(value)) => {
                q.push(value.clone());
                Ok(None)
            }
            (ContextData::Lifo(q), Mutation::Take) => Ok(q.pop()),
            (ContextData::Priority(q), Mutation::Put(value)) => {
                let at = q.partition_point(|item| item.total_cmp(value).is_le());
                q.insert(at, value.clone());
                Ok(None)
            }
            (ContextData::Priority(q), Mutation::Take) => {
                if q.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(q.remove(0)))
                }
            }

            // Byte arrays
            (ContextData::Bytes(b), Mutation::Push(value)) => {
                b.push(byte_of(value)?);
                Ok(None)
            }
            (ContextData::Bytes(b), Mutation::Write(data)) => {
                b.extend_from_slice(data);
                Ok(Some(Value::UInt(data.len() as u64)))
            }
            (ContextData::Bytes(b), Mutation::Pop(index)) => {
                let i = checked_index(index.unwrap_or(-1), b.len())?;
                Ok(Some(Value::UInt(b.remove(i) as u64)))
            }
            (ContextData::Bytes(b), Mutation::InsertAt { index, value }) => {
                let i = clamp_index(*index, b.len());
                b.insert(i, byte_of(value)?);
                Ok(None)
            }
            (ContextData::Bytes(b), Mutation::SetAt { index, value }) => {
                let i = checked_index(*index, b.len())?;
                let old = std::mem::replace(&mut b[i], byte_of(value)?);
                Ok(Some(Value::UInt(old as u64)))
            }
            (ContextData::Bytes(b), Mutation::Reverse) => {
                b.reverse();
                Ok(None)
            }
            (ContextData::Bytes(b), Mutation::Clear) => {
                b.clear();
                Ok(None)
            }

            // Streams
            (ContextData::Stream { buf, pos }, Mutation::Write(data)) => {
                let overlap = buf.len().saturating_sub(*pos).min(data.len());
                buf[*pos..*pos + overlap].copy_from_slice(&data[..overlap]);
                buf.extend_from_slice(&data[overlap..]);
                *pos += data.len();
                Ok(Some(Value::UInt(data.len() as u64)))
            }
            (ContextData::Stream { buf, pos }, Mutation::Read(n)) => {
                let end = pos.saturating_add(*n).min(buf.len());
                let start = (*pos).min(end);
                let chunk = buf[start..end].to_vec();
                *pos = end;
                Ok(Some(Value::Bytes(chunk)))
            }
            (ContextData::Stream { buf, pos }, Mutation::Seek(to)) => {
                if *to > buf.len() {
                    buf.resize(*to, 0);
                }
                *pos = *to;
                Ok(Some(Value::UInt(*to as u64)))
            }
            (ContextData::Stream { buf, pos }, Mutation::Clear) => {
                buf.clear();
                *pos = 0;
                Ok(None)
            }

            _ => Err(unsupported()),
        }
    }
}

fn normalize(index: isize, len: usize) -> Option<usize> {
    let i = if index < 0 { len as isize + index } else { index };
    if i >= 0 && (i as usize) < len {
        Some(i as usize)
    } else {
        None
    }
}

fn checked_index(index: isize, len: usize) -> TesseraResult<usize> {
    normalize(index, len).ok_or(TesseraError::IndexOutOfRange { index, len })
}

/// Insertion positions clamp to the ends, like `list.insert`
fn clamp_index(index: isize, len: usize) -> usize {
    if index < 0 {
        (len as isize + index).max(0) as usize
    } else {
        (index as usize).min(len)
    }
}

fn byte_of(value: &Value) -> TesseraResult<u8> {
    value
        .as_uint()
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| TesseraError::Constraint(format!("byte must be in range(0, 256), got {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(data: &mut ContextData, kind: ContextKind, m: Mutation) -> TesseraResult<Option<Value>> {
        data.apply(&m, ContextId::new(1), kind)
    }

    #[test]
    fn test_map_insert_returns_previous() {
        let mut data = ContextData::new(ContextKind::Dict);
        assert_eq!(apply(&mut data, ContextKind::Dict, Mutation::insert("a", 1)).unwrap(), None);
        assert_eq!(
            apply(&mut data, ContextKind::Dict, Mutation::insert("a", 2)).unwrap(),
            Some(Value::Int(1))
        );
        assert_eq!(data.get("a"), Some(Value::Int(2)));
    }

    #[test]
    fn test_list_pop_defaults_to_last() {
        let mut data = ContextData::new(ContextKind::List);
        for i in 0..3 {
            apply(&mut data, ContextKind::List, Mutation::Push(i.into())).unwrap();
        }
        assert_eq!(apply(&mut data, ContextKind::List, Mutation::Pop(None)).unwrap(), Some(Value::Int(2)));
        assert_eq!(apply(&mut data, ContextKind::List, Mutation::Pop(Some(0))).unwrap(), Some(Value::Int(0)));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_pop_empty_is_out_of_range() {
        let mut data = ContextData::new(ContextKind::List);
        let err = apply(&mut data, ContextKind::List, Mutation::Pop(None)).unwrap_err();
        assert!(matches!(err, TesseraError::IndexOutOfRange { len: 0, .. }));
    }

    #[test]
    fn test_priority_queue_takes_smallest() {
        let mut data = ContextData::new(ContextKind::PriorityQueue);
        for v in [5, 1, 3] {
            apply(&mut data, ContextKind::PriorityQueue, Mutation::Put(v.into())).unwrap();
        }
        let taken: Vec<_> = (0..3)
            .map(|_| apply(&mut data, ContextKind::PriorityQueue, Mutation::Take).unwrap())
            .collect();
        assert_eq!(taken, vec![Some(1.into()), Some(3.into()), Some(5.into())]);
        assert_eq!(apply(&mut data, ContextKind::PriorityQueue, Mutation::Take).unwrap(), None);
    }

    #[test]
    fn test_lifo_queue_order() {
        let mut data = ContextData::new(ContextKind::LifoQueue);
        apply(&mut data, ContextKind::LifoQueue, Mutation::Put(1.into())).unwrap();
        apply(&mut data, ContextKind::LifoQueue, Mutation::Put(2.into())).unwrap();
        assert_eq!(apply(&mut data, ContextKind::LifoQueue, Mutation::Take).unwrap(), Some(2.into()));
    }

    #[test]
    fn test_stream_overwrites_at_cursor() {
        let mut data = ContextData::new(ContextKind::Stream);
        apply(&mut data, ContextKind::Stream, Mutation::Write(b"hello".to_vec())).unwrap();
        apply(&mut data, ContextKind::Stream, Mutation::Seek(1)).unwrap();
        apply(&mut data, ContextKind::Stream, Mutation::Write(b"ipp".to_vec())).unwrap();
        apply(&mut data, ContextKind::Stream, Mutation::Seek(0)).unwrap();
        let read = apply(&mut data, ContextKind::Stream, Mutation::Read(10)).unwrap();
        assert_eq!(read, Some(Value::Bytes(b"hippo".to_vec())));
    }

    #[test]
    fn test_counter_updates() {
        let mut data = ContextData::new(ContextKind::Counter);
        apply(&mut data, ContextKind::Counter, Mutation::update("x", 3)).unwrap();
        let now = apply(&mut data, ContextKind::Counter, Mutation::update("x", -1)).unwrap();
        assert_eq!(now, Some(Value::Int(2)));
        assert_eq!(data.get("x"), Some(Value::Int(2)));
    }

    #[test]
    fn test_stream_read_to_end() {
        let mut data = ContextData::new(ContextKind::Stream);
        apply(&mut data, ContextKind::Stream, Mutation::Write(vec![1, 2, 3])).unwrap();
        apply(&mut data, ContextKind::Stream, Mutation::Seek(1)).unwrap();
        let rest = apply(&mut data, ContextKind::Stream, Mutation::Read(usize::MAX)).unwrap();
        assert_eq!(rest, Some(Value::Bytes(vec![2, 3])));
        let empty = apply(&mut data, ContextKind::Stream, Mutation::Read(usize::MAX)).unwrap();
        assert_eq!(empty, Some(Value::Bytes(Vec::new())));
    }

    #[test]
    fn test_counter_overflow_is_rejected() {
        let mut data = ContextData::new(ContextKind::Counter);
        apply(&mut data, ContextKind::Counter, Mutation::update("x", i64::MAX)).unwrap();
        let err = apply(&mut data, ContextKind::Counter, Mutation::update("x", 1)).unwrap_err();
        assert!(matches!(err, TesseraError::Constraint(_)));
        assert_eq!(data.get("x"), Some(Value::Int(i64::MAX)));
    }

    #[test]
    fn test_byte_array_rejects_large_values() {
        let mut data = ContextData::new(ContextKind::ByteArray);
        assert!(apply(&mut data, ContextKind::ByteArray, Mutation::Push(256.into())).is_err());
        apply(&mut data, ContextKind::ByteArray, Mutation::Push(255.into())).unwrap();
        assert_eq!(data.bytes(), Some(&[255u8][..]));
    }

    #[test]
    fn test_unsupported_mutation() {
        let mut data = ContextData::new(ContextKind::Queue);
        let err = apply(&mut data, ContextKind::Queue, Mutation::insert("a", 1)).unwrap_err();
        assert!(matches!(err, TesseraError::KindMismatch { method: "insert", kind: "queue", .. }));
    }
}
