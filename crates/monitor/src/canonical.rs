//! Comparable, serializable form of any observed state
//!
//! Every state is mapped into a small tree of primitives before it is
//! compared or emitted. Maps are keyed by string and kept sorted, sets become
//! sorted lists, and numbers compare by value: `Int(1)`, `UInt(1)` and
//! `Float(1.0)` are equal.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Display;
use std::hash::BuildHasher;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Canonical state tree
#[derive(Debug, Clone)]
pub enum Canonical {
    Null,
    Bool(bool),
    Int(i64),
    /// Only for values above `i64::MAX`
    UInt(u64),
    Float(f64),
    Str(String),
    List(Vec<Canonical>),
    Map(BTreeMap<String, Canonical>),
}

/// What a state observation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// The accessor failed; distinct from every real state
    Absent,
    Present(Canonical),
}

impl Canonical {
    /// Integer-valued floats collapse to integers
    pub fn float(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 {
            if value >= i64::MIN as f64 && value < i64::MAX as f64 {
                return Canonical::Int(value as i64);
            }
            if value >= 0.0 && value < u64::MAX as f64 {
                return Canonical::uint(value as u64);
            }
        }
        Canonical::Float(value)
    }

    pub fn uint(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(v) => Canonical::Int(v),
            Err(_) => Canonical::UInt(value),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Canonical::Str(value.into())
    }

    /// Build a map from `(key, value)` pairs
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: ToCanonical,
        I: IntoIterator<Item = (K, V)>,
    {
        Canonical::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_canonical()))
                .collect(),
        )
    }

    /// Build a list that ignores the order of `items`
    pub fn set<T, I>(items: I) -> Self
    where
        T: ToCanonical,
        I: IntoIterator<Item = T>,
    {
        let mut list: Vec<Canonical> = items.into_iter().map(|i| i.to_canonical()).collect();
        list.sort();
        Canonical::List(list)
    }

    /// Canonicalise any serializable value by way of its JSON form
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(|v| v.to_canonical())
    }

    /// Look up a key in a map
    pub fn get(&self, key: &str) -> Option<&Canonical> {
        match self {
            Canonical::Map(map) => map.get(key),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Canonical::Null => 0,
            Canonical::Bool(_) => 1,
            Canonical::Int(_) | Canonical::UInt(_) | Canonical::Float(_) => 2,
            Canonical::Str(_) => 3,
            Canonical::List(_) => 4,
            Canonical::Map(_) => 5,
        }
    }

    fn number(&self) -> Option<Number> {
        match *self {
            Canonical::Int(v) => Some(Number::Integral(v as i128)),
            Canonical::UInt(v) => Some(Number::Integral(v as i128)),
            Canonical::Float(v) => Some(Number::from_f64(v)),
            _ => None,
        }
    }
}

/// Numeric value used for comparison only
#[derive(Clone, Copy)]
enum Number {
    Integral(i128),
    Real(f64),
}

impl Number {
    fn from_f64(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e38 {
            Number::Integral(value as i128)
        } else if value.is_nan() {
            Number::Real(f64::NAN)
        } else {
            Number::Real(value)
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Integral(v) => v as f64,
            Number::Real(v) => v,
        }
    }

    fn cmp(self, other: Number) -> Ordering {
        match (self, other) {
            (Number::Integral(a), Number::Integral(b)) => a.cmp(&b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }
}

impl Ord for Canonical {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Canonical::Null, Canonical::Null) => Ordering::Equal,
            (Canonical::Bool(a), Canonical::Bool(b)) => a.cmp(b),
            (Canonical::Str(a), Canonical::Str(b)) => a.cmp(b),
            (Canonical::List(a), Canonical::List(b)) => a.cmp(b),
            (Canonical::Map(a), Canonical::Map(b)) => a.iter().cmp(b.iter()),
            _ => match (self.number(), other.number()) {
                (Some(a), Some(b)) => a.cmp(b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl PartialOrd for Canonical {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Canonical {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Canonical {}

impl Serialize for Canonical {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Canonical::Null => serializer.serialize_unit(),
            Canonical::Bool(v) => serializer.serialize_bool(*v),
            Canonical::Int(v) => serializer.serialize_i64(*v),
            Canonical::UInt(v) => serializer.serialize_u64(*v),
            Canonical::Float(v) => serializer.serialize_f64(*v),
            Canonical::Str(v) => serializer.serialize_str(v),
            Canonical::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Canonical::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Snapshot::Absent => serializer.serialize_unit(),
            Snapshot::Present(state) => state.serialize(serializer),
        }
    }
}

/// Conversion into the canonical tree
pub trait ToCanonical {
    fn to_canonical(&self) -> Canonical;
}

impl ToCanonical for Canonical {
    fn to_canonical(&self) -> Canonical {
        self.clone()
    }
}

impl ToCanonical for () {
    fn to_canonical(&self) -> Canonical {
        Canonical::Null
    }
}

impl ToCanonical for bool {
    fn to_canonical(&self) -> Canonical {
        Canonical::Bool(*self)
    }
}

macro_rules! impl_signed {
    ($($t:ty)*) => {$(
        impl ToCanonical for $t {
            fn to_canonical(&self) -> Canonical {
                Canonical::Int(*self as i64)
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($t:ty)*) => {$(
        impl ToCanonical for $t {
            fn to_canonical(&self) -> Canonical {
                Canonical::uint(*self as u64)
            }
        }
    )*};
}

impl_signed!(i8 i16 i32 i64 isize);
impl_unsigned!(u8 u16 u32 u64 usize);

impl ToCanonical for f32 {
    fn to_canonical(&self) -> Canonical {
        Canonical::float(f64::from(*self))
    }
}

impl ToCanonical for f64 {
    fn to_canonical(&self) -> Canonical {
        Canonical::float(*self)
    }
}

impl ToCanonical for str {
    fn to_canonical(&self) -> Canonical {
        Canonical::Str(self.to_owned())
    }
}

impl ToCanonical for String {
    fn to_canonical(&self) -> Canonical {
        Canonical::Str(self.clone())
    }
}

impl<T: ToCanonical + ?Sized> ToCanonical for &T {
    fn to_canonical(&self) -> Canonical {
        (**self).to_canonical()
    }
}

impl<T: ToCanonical + ?Sized> ToCanonical for Box<T> {
    fn to_canonical(&self) -> Canonical {
        (**self).to_canonical()
    }
}

impl<T: ToCanonical> ToCanonical for Option<T> {
    fn to_canonical(&self) -> Canonical {
        match self {
            Some(v) => v.to_canonical(),
            None => Canonical::Null,
        }
    }
}

impl<T: ToCanonical> ToCanonical for [T] {
    fn to_canonical(&self) -> Canonical {
        Canonical::List(self.iter().map(ToCanonical::to_canonical).collect())
    }
}

impl<T: ToCanonical> ToCanonical for Vec<T> {
    fn to_canonical(&self) -> Canonical {
        self.as_slice().to_canonical()
    }
}

/// Keys are rendered with `Display`. Distinct keys that render the same
/// collapse into one entry holding the smallest of their values, whatever
/// the iteration order.
fn displayed_key_map<'a, K, V, I>(entries: I) -> Canonical
where
    K: Display + 'a,
    V: ToCanonical + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    let mut map = BTreeMap::new();
    for (key, value) in entries {
        let value = value.to_canonical();
        map.entry(key.to_string())
            .and_modify(|kept: &mut Canonical| {
                if value < *kept {
                    *kept = value.clone();
                }
            })
            .or_insert(value);
    }
    Canonical::Map(map)
}

impl<K: Display, V: ToCanonical> ToCanonical for BTreeMap<K, V> {
    fn to_canonical(&self) -> Canonical {
        displayed_key_map(self)
    }
}

impl<K: Display, V: ToCanonical, S: BuildHasher> ToCanonical for HashMap<K, V, S> {
    fn to_canonical(&self) -> Canonical {
        displayed_key_map(self)
    }
}

impl<T: ToCanonical> ToCanonical for BTreeSet<T> {
    fn to_canonical(&self) -> Canonical {
        Canonical::set(self.iter())
    }
}

impl<T: ToCanonical, S: BuildHasher> ToCanonical for HashSet<T, S> {
    fn to_canonical(&self) -> Canonical {
        Canonical::set(self.iter())
    }
}

impl ToCanonical for serde_json::Value {
    fn to_canonical(&self) -> Canonical {
        use serde_json::Value;

        match self {
            Value::Null => Canonical::Null,
            Value::Bool(v) => Canonical::Bool(*v),
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Canonical::Int(v)
                } else if let Some(v) = n.as_u64() {
                    Canonical::uint(v)
                } else {
                    Canonical::float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Canonical::Str(s.clone()),
            Value::Array(items) => items.to_canonical(),
            Value::Object(map) => Canonical::map(map.iter().map(|(k, v)| (k.clone(), v))),
        }
    }
}
