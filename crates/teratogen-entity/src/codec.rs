//! Snapshot codec.
//!
//! All framing is little-endian with fixed widths:
//!
//! | value            | encoding                         |
//! |------------------|----------------------------------|
//! | entity id, u64   | 8 bytes                          |
//! | count, index     | 4 bytes                          |
//! | cardinality tag  | 1 byte                           |
//! | string           | 4-byte length, then UTF-8 bytes  |
//!
//! Component bodies are self-delimited `bincode` encodings of the component's
//! serde representation.
//!
//! Instance-deduplicated handler blocks (see [`write_instances`]) store every
//! distinct component instance once and then list `(entity, index)`
//! assignments, so entities that share one instance still share it after a
//! load.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entity::EntityId;
use crate::{EntityError, Result};

/// Cap for up-front allocations driven by untrusted counts.
const MAX_PREALLOC: usize = 4096;

/// Largest encoded component body accepted on decode. Lengths inside a body
/// are checked against this before anything is allocated.
pub const MAX_COMPONENT_BYTES: usize = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Primitive framing
// ---------------------------------------------------------------------------

fn write_all(out: &mut dyn Write, bytes: &[u8], context: &'static str) -> Result<()> {
    out.write_all(bytes)
        .map_err(|source| EntityError::Io { context, source })
}

/// Read exactly `N` bytes.
pub fn read_array<const N: usize>(input: &mut dyn Read, context: &'static str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf).map_err(|e| read_error(e, context))?;
    Ok(buf)
}

fn read_error(e: io::Error, context: &'static str) -> EntityError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        EntityError::Truncated { context }
    } else {
        EntityError::Io { context, source: e }
    }
}

pub fn write_u8(out: &mut dyn Write, value: u8, context: &'static str) -> Result<()> {
    write_all(out, &[value], context)
}

pub fn write_u32(out: &mut dyn Write, value: u32, context: &'static str) -> Result<()> {
    write_all(out, &value.to_le_bytes(), context)
}

pub fn write_u64(out: &mut dyn Write, value: u64, context: &'static str) -> Result<()> {
    write_all(out, &value.to_le_bytes(), context)
}

pub fn write_entity(out: &mut dyn Write, id: EntityId, context: &'static str) -> Result<()> {
    write_u64(out, id.to_raw(), context)
}

/// Write a collection length as a 4-byte count.
pub fn write_count(out: &mut dyn Write, count: usize, context: &'static str) -> Result<()> {
    let narrow = u32::try_from(count).map_err(|_| EntityError::CountOverflow { context, count })?;
    write_u32(out, narrow, context)
}

pub fn write_string(out: &mut dyn Write, value: &str, context: &'static str) -> Result<()> {
    write_count(out, value.len(), context)?;
    write_all(out, value.as_bytes(), context)
}

/// Write raw bytes with no length prefix.
pub fn write_bytes(out: &mut dyn Write, bytes: &[u8], context: &'static str) -> Result<()> {
    write_all(out, bytes, context)
}

pub fn read_u8(input: &mut dyn Read, context: &'static str) -> Result<u8> {
    Ok(read_array::<1>(input, context)?[0])
}

pub fn read_u32(input: &mut dyn Read, context: &'static str) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array(input, context)?))
}

pub fn read_u64(input: &mut dyn Read, context: &'static str) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array(input, context)?))
}

pub fn read_entity(input: &mut dyn Read, context: &'static str) -> Result<EntityId> {
    read_u64(input, context).map(EntityId::from_raw)
}

/// Read exactly `len` raw bytes.
pub fn read_bytes(input: &mut dyn Read, len: u64, context: &'static str) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity((len as usize).min(MAX_PREALLOC));
    // `take` keeps a corrupt length from forcing a huge allocation.
    Read::take(&mut *input, len)
        .read_to_end(&mut buf)
        .map_err(|e| read_error(e, context))?;
    if buf.len() as u64 != len {
        return Err(EntityError::Truncated { context });
    }
    Ok(buf)
}

pub fn read_string(input: &mut dyn Read, context: &'static str) -> Result<String> {
    let len = read_u32(input, context)?;
    let buf = read_bytes(input, u64::from(len), context)?;
    String::from_utf8(buf).map_err(|_| EntityError::InvalidString { context })
}

/// A `Vec` sized for `count` elements, bounded so corrupt counts stay cheap.
pub fn vec_for_count<T>(count: u32) -> Vec<T> {
    Vec::with_capacity((count as usize).min(MAX_PREALLOC))
}

// ---------------------------------------------------------------------------
// Component bodies
// ---------------------------------------------------------------------------

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_COMPONENT_BYTES>()
}

/// Write the self-delimited encoding of one component.
pub fn encode_component<T: Serialize>(mut out: &mut dyn Write, value: &T) -> Result<()> {
    bincode::serde::encode_into_std_write(value, &mut out, bincode_config())
        .map(|_| ())
        .map_err(|e| EntityError::ComponentEncode {
            details: e.to_string(),
        })
}

/// Read one component written by [`encode_component`].
pub fn decode_component<T: DeserializeOwned>(mut input: &mut dyn Read) -> Result<T> {
    bincode::serde::decode_from_std_read(&mut input, bincode_config()).map_err(|e| {
        EntityError::ComponentDecode {
            details: e.to_string(),
        }
    })
}

// ---------------------------------------------------------------------------
// Instance-deduplicated blocks
// ---------------------------------------------------------------------------

/// Dense numbering of distinct instance keys in first-seen order.
#[derive(Debug)]
pub struct InstanceTable<K> {
    dense: HashMap<K, u32>,
    order: Vec<K>,
}

impl<K: Copy + Eq + std::hash::Hash> InstanceTable<K> {
    /// Number `assignments`' instance keys in the order they first appear.
    pub fn build(assignments: &[(EntityId, K)]) -> Self {
        let mut dense = HashMap::new();
        let mut order = Vec::new();
        for &(_, key) in assignments {
            dense.entry(key).or_insert_with(|| {
                order.push(key);
                (order.len() - 1) as u32
            });
        }
        Self { dense, order }
    }

    /// Distinct keys, indexed by dense index.
    pub fn distinct(&self) -> &[K] {
        &self.order
    }

    pub fn index_of(&self, key: K) -> Option<u32> {
        self.dense.get(&key).copied()
    }
}

/// Write an instance-deduplicated handler block.
///
/// `assignments` must already be in the order they should appear on the wire.
/// Instances are numbered in first-seen order over that sequence and each
/// distinct instance body is written exactly once.
pub fn write_instances<'a, K, T, F>(
    out: &mut dyn Write,
    assignments: &[(EntityId, K)],
    instance: F,
) -> Result<()>
where
    K: Copy + Eq + std::hash::Hash,
    T: Serialize + 'a,
    F: Fn(K) -> Option<&'a T>,
{
    let table = InstanceTable::build(assignments);

    write_count(out, table.distinct().len(), "component instance count")?;
    for &key in table.distinct() {
        // Keys come from live assignments, so a miss means the caller handed
        // us a dangling key.
        let value = instance(key).ok_or_else(|| EntityError::ComponentEncode {
            details: "assignment references a missing instance".to_owned(),
        })?;
        encode_component(out, value)?;
    }

    write_count(out, assignments.len(), "component assignment count")?;
    for &(entity, key) in assignments {
        let index = table.index_of(key).ok_or_else(|| EntityError::ComponentEncode {
            details: "instance missing from table".to_owned(),
        })?;
        write_entity(out, entity, "component assignment entity")?;
        write_u32(out, index, "component assignment index")?;
    }
    Ok(())
}

/// A decoded instance-deduplicated block.
#[derive(Debug)]
pub struct DecodedInstances<T> {
    /// Distinct instances, indexed by dense index.
    pub instances: Vec<T>,
    /// `(entity, dense index)` assignments in wire order. Every index is in
    /// range for `instances`.
    pub assignments: Vec<(EntityId, u32)>,
}

/// Read a block written by [`write_instances`].
pub fn read_instances<T: DeserializeOwned>(input: &mut dyn Read) -> Result<DecodedInstances<T>> {
    let count = read_u32(input, "component instance count")?;
    let mut instances = vec_for_count(count);
    for _ in 0..count {
        instances.push(decode_component(input)?);
    }

    let n_assignments = read_u32(input, "component assignment count")?;
    let mut assignments = vec_for_count(n_assignments);
    for _ in 0..n_assignments {
        let entity = read_entity(input, "component assignment entity")?;
        let index = read_u32(input, "component assignment index")?;
        if index >= count {
            return Err(EntityError::InstanceIndexOutOfRange { index, count });
        }
        assignments.push((entity, index));
    }

    Ok(DecodedInstances {
        instances,
        assignments,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
