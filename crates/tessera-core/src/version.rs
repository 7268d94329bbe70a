//! Versions and extremum sentinels
//!
//! A version is any comparable value: integers, floats, strings or
//! tuples (lists) such as `(1, "alpha")`. Unset bounds are represented by
//! the `Least` and `Greatest` sentinels, which compare below and above
//! every concrete value.

use std::cmp::Ordering;
use std::fmt;

use crate::Value;

/// Protocol/schema version used for settings-dependent filtering
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub struct Version(pub Value);

impl Version {
    pub fn new(value: impl Into<Value>) -> Self {
        Version(value.into())
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<Value> for Version {
    fn from(v: Value) -> Self {
        Version(v)
    }
}

impl From<i32> for Version {
    fn from(v: i32) -> Self {
        Version(Value::from(v))
    }
}

impl From<u32> for Version {
    fn from(v: u32) -> Self {
        Version(Value::from(v))
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Version(Value::from(v))
    }
}

impl From<f64> for Version {
    fn from(v: f64) -> Self {
        Version(Value::from(v))
    }
}

impl From<&str> for Version {
    fn from(v: &str) -> Self {
        Version(Value::from(v))
    }
}

impl From<(u64, &str)> for Version {
    fn from((major, tag): (u64, &str)) -> Self {
        Version(Value::List(vec![Value::UInt(major), Value::from(tag)]))
    }
}

/// A value extended with sentinels below and above every concrete value
///
/// Variant order gives `Least < Value(_) < Greatest`.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub enum Bounded<T> {
    Least,
    Value(T),
    Greatest,
}

impl<T> Bounded<T> {
    pub fn from_option(value: Option<T>, fallback: Bounded<T>) -> Self {
        match value {
            Some(v) => Bounded::Value(v),
            None => fallback,
        }
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            Bounded::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Bounded::Value(_))
    }
}

impl<T: PartialOrd> Bounded<T> {
    /// `self <= other` where `Least` is at or below everything, itself
    /// included, and `Greatest` is at or below nothing but itself
    pub fn at_or_below(&self, other: &Bounded<T>) -> bool {
        match (self, other) {
            (Bounded::Least, _) | (_, Bounded::Greatest) => true,
            (_, Bounded::Least) | (Bounded::Greatest, _) => false,
            (Bounded::Value(a), Bounded::Value(b)) => a <= b,
        }
    }

    /// `self > other` where `Greatest` is above everything, itself
    /// included, and `Least` is above nothing
    pub fn above(&self, other: &Bounded<T>) -> bool {
        match (self, other) {
            (Bounded::Greatest, _) => true,
            (Bounded::Least, _) | (_, Bounded::Greatest) => false,
            (Bounded::Value(_), Bounded::Least) => true,
            (Bounded::Value(a), Bounded::Value(b)) => a > b,
        }
    }

    /// Compare, treating incomparable concrete values as equal
    pub fn cmp_lenient(&self, other: &Bounded<T>) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

impl<T: fmt::Display> fmt::Display for Bounded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bounded::Least => f.write_str("-inf"),
            Bounded::Value(v) => write!(f, "{}", v),
            Bounded::Greatest => f.write_str("+inf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sentinels_bracket_values() {
        let v = Bounded::Value(Version::from(0));
        assert!(Bounded::Least < v);
        assert!(v < Bounded::Greatest);
        assert!(Bounded::<Version>::Least < Bounded::Greatest);
    }

    #[test]
    fn test_sentinels_absorb_themselves() {
        let least = Bounded::<Version>::Least;
        let greatest = Bounded::<Version>::Greatest;
        let one = Bounded::Value(Version::from(1));
        assert!(greatest.above(&greatest));
        assert!(greatest.above(&one));
        assert!(!one.above(&greatest));
        assert!(!least.above(&least));
        assert!(least.at_or_below(&least));
        assert!(least.at_or_below(&one));
        assert!(one.at_or_below(&greatest));
        assert!(!greatest.at_or_below(&one));
        assert!(one.at_or_below(&Bounded::Value(Version::from(1))));
        assert!(!Bounded::Value(Version::from(2)).at_or_below(&one));
    }

    #[test]
    fn test_tuple_versions() {
        assert!(Version::from((1, "alpha")) < Version::from((1, "beta")));
        assert!(Version::from((1, "beta")) < Version::from((2, "alpha")));
    }

    #[test]
    fn test_mixed_numeric_versions() {
        assert!(Version::from(1.5) < Version::from(2));
        assert!(Version::from(2.5) > Version::from(2));
    }

    proptest! {
        #[test]
        fn prop_sentinels_bracket_every_int(v in any::<i64>()) {
            let b = Bounded::Value(Value::Int(v));
            prop_assert!(Bounded::Least < b);
            prop_assert!(b < Bounded::Greatest);
        }
    }
}
