//! Hashable primary-key values for identity maps.

use std::any::TypeId;
use std::hash::{Hash, Hasher};

use crate::value::Value;

/// A primary-key `Value` usable as a hash-map key.
///
/// `Value` holds floats and so cannot derive `Eq`/`Hash`; keys compare by
/// variant and content, with floats compared bitwise. Integer widths are
/// normalized so `Int(1)` and `BigInt(1)` denote the same key.
#[derive(Debug, Clone)]
pub struct KeyValue(pub Value);

impl KeyValue {
    /// The wrapped value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            },
        }
    }
}

impl Eq for KeyValue {}

impl Hash for KeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

/// Hash a single value into the hasher.
fn hash_value(v: &Value, hasher: &mut impl Hasher) {
    match v {
        Value::Null => 0u8.hash(hasher),
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Int(_) | Value::BigInt(_) => {
            2u8.hash(hasher);
            v.as_i64().hash(hasher);
        }
        Value::Double(f) => {
            3u8.hash(hasher);
            f.to_bits().hash(hasher);
        }
        Value::Text(s) => {
            4u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Bytes(b) => {
            5u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Timestamp(ts) => {
            6u8.hash(hasher);
            ts.hash(hasher);
        }
    }
}

/// Identity of a tracked record: its type plus its primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    type_id: TypeId,
    key: KeyValue,
}

impl EntityKey {
    /// Key for type `T` and primary-key `value`.
    #[must_use]
    pub fn of<T: 'static>(value: Value) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            key: KeyValue(value),
        }
    }

    /// Key for an erased type id.
    #[must_use]
    pub fn from_type_id(type_id: TypeId, value: Value) -> Self {
        Self {
            type_id,
            key: KeyValue(value),
        }
    }

    /// Type component.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Key component.
    #[must_use]
    pub fn value(&self) -> &Value {
        self.key.value()
    }
}
