//! Resource slot vectors: the typed, componentwise-comparable quantities
//! (CPU cores, memory bytes, accelerator shares, ...) that agents report and
//! kernels request.

use std::collections::BTreeMap;
use std::ops::{Add, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Name of a resource type, e.g. `cpu`, `mem`, `cuda.shares`, `tt-n300.device`.
///
/// A plain string newtype rather than an enum: the set of resource types is
/// open (accelerator plugins register new ones at runtime), so a closed enum
/// would have to be extended for every new device family.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceTypeName(pub String);

impl ResourceTypeName {
    /// Build a resource type name from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl From<&str> for ResourceTypeName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for ResourceTypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error raised when two resource slot vectors cannot be compared under
/// strict semantics because their key sets differ.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("resource slot key sets differ: only in lhs = {only_in_lhs:?}, only in rhs = {only_in_rhs:?}")]
pub struct MismatchedResourceKeys {
    /// Keys present in the left-hand operand but absent from the right.
    pub only_in_lhs: Vec<ResourceTypeName>,
    /// Keys present in the right-hand operand but absent from the left.
    pub only_in_rhs: Vec<ResourceTypeName>,
}

/// A mapping from resource-type name to a non-negative decimal quantity.
///
/// `ResourceSlot` supports componentwise arithmetic and comparison. Unknown
/// keys read as zero in permissive contexts (filtering, arithmetic); strict
/// comparisons (`strict_le`) instead reject mismatched key sets outright, so
/// that a caller cannot silently compare slot vectors that disagree about
/// which resource types exist.
///
/// Serializes as a JSON object of stringified decimals, e.g.
/// `{"cpu": "2", "mem": "4294967296"}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSlot(BTreeMap<ResourceTypeName, Decimal>);

impl ResourceSlot {
    /// The empty resource vector (all quantities implicitly zero).
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a resource slot from an iterator of (name, quantity) pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Decimal)>,
        K: Into<ResourceTypeName>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Quantity for one resource type, or zero if absent.
    pub fn get(&self, key: &ResourceTypeName) -> Decimal {
        self.0.get(key).copied().unwrap_or(Decimal::ZERO)
    }

    /// Set the quantity for a resource type, overwriting any prior value.
    pub fn set(&mut self, key: ResourceTypeName, value: Decimal) {
        self.0.insert(key, value);
    }

    /// Iterate over the explicitly-present (name, quantity) pairs.
    ///
    /// Keys absent from the map are implicitly zero and are not yielded.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceTypeName, &Decimal)> {
        self.0.iter()
    }

    /// All resource-type names with an explicit (possibly zero) entry.
    pub fn keys(&self) -> impl Iterator<Item = &ResourceTypeName> {
        self.0.keys()
    }

    /// The union of keys explicitly present in either operand.
    fn key_union<'a>(&'a self, other: &'a Self) -> std::collections::BTreeSet<&'a ResourceTypeName> {
        self.0.keys().chain(other.0.keys()).collect()
    }

    /// Permissive componentwise `<=`: missing keys compare as zero.
    pub fn le(&self, other: &Self) -> bool {
        self.key_union(other)
            .into_iter()
            .all(|k| self.get(k) <= other.get(k))
    }

    /// Strict componentwise `<=`: errors if the key sets differ, since a
    /// caller comparing e.g. a kernel request against an agent's available
    /// slots usually wants to know when the two disagree about which
    /// resource types exist at all (a misconfigured plugin, a stale agent).
    pub fn strict_le(&self, other: &Self) -> Result<bool, MismatchedResourceKeys> {
        self.assert_same_keys(other)?;
        Ok(self.le(other))
    }

    fn assert_same_keys(&self, other: &Self) -> Result<(), MismatchedResourceKeys> {
        let lhs_keys: std::collections::BTreeSet<_> = self.0.keys().collect();
        let rhs_keys: std::collections::BTreeSet<_> = other.0.keys().collect();
        if lhs_keys == rhs_keys {
            return Ok(());
        }
        Err(MismatchedResourceKeys {
            only_in_lhs: lhs_keys.difference(&rhs_keys).map(|k| (*k).clone()).collect(),
            only_in_rhs: rhs_keys.difference(&lhs_keys).map(|k| (*k).clone()).collect(),
        })
    }

    /// True if every component is zero (or no components are present).
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|v| v.is_zero())
    }

    /// Number of resource types present in `self` but zero/absent in `other`
    /// — used by the agent selector's "fewer unused resource types" tie-break.
    pub fn count_extras_over(&self, other: &Self) -> usize {
        self.key_union(other)
            .into_iter()
            .filter(|k| self.get(k) > Decimal::ZERO && other.get(k).is_zero())
            .count()
    }
}

impl Add for &ResourceSlot {
    type Output = ResourceSlot;

    fn add(self, rhs: &ResourceSlot) -> ResourceSlot {
        let mut out = BTreeMap::new();
        for k in self.key_union(rhs) {
            out.insert(k.clone(), self.get(k) + rhs.get(k));
        }
        ResourceSlot(out)
    }
}

impl Sub for &ResourceSlot {
    type Output = ResourceSlot;

    fn sub(self, rhs: &ResourceSlot) -> ResourceSlot {
        let mut out = BTreeMap::new();
        for k in self.key_union(rhs) {
            out.insert(k.clone(), self.get(k) - rhs.get(k));
        }
        ResourceSlot(out)
    }
}

impl Add for ResourceSlot {
    type Output = ResourceSlot;

    fn add(self, rhs: ResourceSlot) -> ResourceSlot {
        &self + &rhs
    }
}

impl Sub for ResourceSlot {
    type Output = ResourceSlot;

    fn sub(self, rhs: ResourceSlot) -> ResourceSlot {
        &self - &rhs
    }
}

impl std::iter::Sum for ResourceSlot {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ResourceSlot::empty(), |acc, x| &acc + &x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn slot(pairs: &[(&str, Decimal)]) -> ResourceSlot {
        ResourceSlot::from_pairs(pairs.iter().map(|(k, v)| (*k, *v)))
    }

    #[test]
    fn permissive_le_treats_missing_as_zero() {
        let a = slot(&[("cpu", dec!(2))]);
        let b = slot(&[("cpu", dec!(4)), ("mem", dec!(8))]);
        assert!(a.le(&b));
        assert!(!b.le(&a));
    }

    #[test]
    fn strict_le_rejects_mismatched_keys() {
        let a = slot(&[("cpu", dec!(2))]);
        let b = slot(&[("mem", dec!(8))]);
        assert!(a.strict_le(&b).is_err());
    }

    #[test]
    fn componentwise_add_sub_roundtrip() {
        let a = slot(&[("cpu", dec!(2)), ("mem", dec!(4))]);
        let b = slot(&[("cpu", dec!(1))]);
        let sum = &a + &b;
        assert_eq!(sum.get(&ResourceTypeName::new("cpu")), dec!(3));
        assert_eq!(sum.get(&ResourceTypeName::new("mem")), dec!(4));
        let back = &sum - &b;
        assert_eq!(back.get(&ResourceTypeName::new("cpu")), dec!(2));
    }

    #[test]
    fn count_extras_over() {
        let agent = slot(&[("cpu", dec!(4)), ("cuda.shares", dec!(2))]);
        let request = slot(&[("cpu", dec!(1))]);
        assert_eq!(agent.count_extras_over(&request), 1);
    }

    #[test]
    fn json_roundtrip() {
        let a = slot(&[("cpu", dec!(2)), ("mem", dec!(4))]);
        let s = serde_json::to_string(&a).unwrap();
        let back: ResourceSlot = serde_json::from_str(&s).unwrap();
        assert_eq!(a, back);
    }
}
