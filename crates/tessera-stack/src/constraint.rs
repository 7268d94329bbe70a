//! Value constraints
//!
//! A constraint checks a value before dump and after load. The effective
//! `ConstraintPolicy` decides what happens on violation:
//! - Ignore: the value passes through unchanged
//! - Coerce: the value is clamped or converted; if that fails, the violation is fatal
//! - Strict: the violation is fatal

use std::fmt;

use tessera_core::{CodecOperation, ConstraintPolicy, TesseraError, TesseraResult, Value, ValueType};

/// A single check on component values
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// Inclusive bounds. With `accept_inf`, infinite floats pass.
    Range { min: Value, max: Value, accept_inf: bool },
    /// The value must have this type. Integers of either sign match each
    /// other, and any number matches a float.
    Type(ValueType),
    /// The value must fit in an integer of this width
    BitWidth { bits: u16, signed: bool },
}

impl Constraint {
    pub fn range(min: impl Into<Value>, max: impl Into<Value>) -> TesseraResult<Self> {
        let (min, max) = (min.into(), max.into());
        if min.partial_cmp(&max).map_or(true, |o| o.is_gt()) {
            return Err(TesseraError::Constraint(format!(
                "invalid range [{}, {}]",
                min, max
            )));
        }
        Ok(Constraint::Range {
            min,
            max,
            accept_inf: false,
        })
    }

    /// Integer bounds for a bit width
    pub fn int_bounds(bits: u16, signed: bool) -> (i128, i128) {
        let bits = u32::from(bits.min(64));
        if signed {
            (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    /// Check a value, describing the violation on failure
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Constraint::Range { min, max, accept_inf } => {
                if *accept_inf && value.as_float().map_or(false, f64::is_infinite) {
                    return Ok(());
                }
                let within = matches!(min.partial_cmp(value), Some(o) if o.is_le())
                    && matches!(value.partial_cmp(max), Some(o) if o.is_le());
                if within {
                    Ok(())
                } else {
                    Err(format!("{} is out of bounds [{}, {}]", value, min, max))
                }
            }
            Constraint::Type(expected) => {
                if type_matches(*expected, value.value_type()) {
                    Ok(())
                } else {
                    Err(format!("expected {}, got {}", expected, value.value_type()))
                }
            }
            Constraint::BitWidth { bits, signed } => {
                let (lo, hi) = Self::int_bounds(*bits, *signed);
                match value.as_i128() {
                    Some(v) if lo <= v && v <= hi => Ok(()),
                    Some(v) => Err(format!(
                        "{} does not fit in {}{}",
                        v,
                        if *signed { "int" } else { "uint" },
                        bits
                    )),
                    None => Err(format!("expected an integer, got {}", value.value_type())),
                }
            }
        }
    }

    /// Best-effort reshape into a value that passes `check`
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match self {
            Constraint::Range { min, max, .. } => match value.partial_cmp(min)? {
                std::cmp::Ordering::Less => Some(min.clone()),
                _ if value.partial_cmp(max)?.is_gt() => Some(max.clone()),
                _ => Some(value.clone()),
            },
            Constraint::Type(expected) => convert(value, *expected),
            Constraint::BitWidth { bits, signed } => {
                let (lo, hi) = Self::int_bounds(*bits, *signed);
                let v = match value {
                    Value::Float(f) if f.is_finite() => *f as i128,
                    Value::Bool(b) => i128::from(*b),
                    other => other.as_i128()?,
                };
                let clamped = v.clamp(lo, hi);
                if *signed {
                    i64::try_from(clamped).ok().map(Value::Int)
                } else {
                    u64::try_from(clamped).ok().map(Value::UInt)
                }
            }
        }
    }

    /// Apply the policy to a value
    pub fn validate(
        &self,
        value: Value,
        policy: ConstraintPolicy,
        operation: CodecOperation,
    ) -> TesseraResult<Value> {
        let Err(reason) = self.check(&value) else {
            return Ok(value);
        };
        match policy {
            ConstraintPolicy::Ignore => Ok(value),
            ConstraintPolicy::Strict => Err(TesseraError::Constraint(format!(
                "{} while {}",
                reason, operation
            ))),
            ConstraintPolicy::Coerce => self
                .coerce(&value)
                .filter(|coerced| self.check(coerced).is_ok())
                .ok_or_else(|| {
                    TesseraError::Constraint(format!(
                        "{} while {}, and the value cannot be coerced",
                        reason, operation
                    ))
                }),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Range { min, max, .. } => write!(f, "range[{}, {}]", min, max),
            Constraint::Type(t) => write!(f, "type({})", t),
            Constraint::BitWidth { bits, signed: true } => write!(f, "int{}", bits),
            Constraint::BitWidth { bits, signed: false } => write!(f, "uint{}", bits),
        }
    }
}

fn type_matches(expected: ValueType, actual: ValueType) -> bool {
    let integer = |t| matches!(t, ValueType::Int | ValueType::UInt);
    expected == actual
        || (integer(expected) && integer(actual))
        || (expected == ValueType::Float && actual.is_numeric())
}

fn convert(value: &Value, to: ValueType) -> Option<Value> {
    match to {
        ValueType::Bool => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            other => other.as_i128().map(|v| Value::Bool(v != 0)),
        },
        ValueType::Int => match value {
            Value::Float(f) if f.is_finite() => Some(Value::Int(*f as i64)),
            Value::Bool(b) => Some(Value::Int(i64::from(*b))),
            Value::Text(s) => s.trim().parse().ok().map(Value::Int),
            other => other.as_int().map(Value::Int),
        },
        ValueType::UInt => match value {
            Value::Float(f) if f.is_finite() && *f >= 0.0 => Some(Value::UInt(*f as u64)),
            Value::Bool(b) => Some(Value::UInt(u64::from(*b))),
            Value::Text(s) => s.trim().parse().ok().map(Value::UInt),
            other => other.as_uint().map(Value::UInt),
        },
        ValueType::Float => match value {
            Value::Text(s) => s.trim().parse().ok().map(Value::Float),
            Value::Bool(b) => Some(Value::Float(f64::from(u8::from(*b)))),
            other => other.as_float().map(Value::Float),
        },
        ValueType::Text => match value {
            Value::Text(s) => Some(Value::Text(s.clone())),
            Value::Bytes(b) => String::from_utf8(b.clone()).ok().map(Value::Text),
            Value::List(_) | Value::Link(_) => None,
            other => Some(Value::Text(other.to_string())),
        },
        ValueType::Bytes => match value {
            Value::Bytes(b) => Some(Value::Bytes(b.clone())),
            Value::Text(s) => Some(Value::Bytes(s.clone().into_bytes())),
            _ => None,
        },
        ValueType::List => match value {
            Value::List(items) => Some(Value::List(items.clone())),
            _ => None,
        },
        ValueType::Link => value.as_link().map(Value::Link),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_bounds() {
        assert_eq!(Constraint::int_bounds(8, true), (-128, 127));
        assert_eq!(Constraint::int_bounds(8, false), (0, 255));
        assert_eq!(
            Constraint::int_bounds(64, false),
            (0, u64::MAX as i128)
        );
    }

    #[test]
    fn test_policies() {
        let c = Constraint::BitWidth { bits: 8, signed: true };
        let op = CodecOperation::Dump;

        assert!(c.validate(Value::Int(300), ConstraintPolicy::Strict, op).is_err());
        assert_eq!(
            c.validate(Value::Int(300), ConstraintPolicy::Ignore, op).unwrap(),
            Value::Int(300)
        );
        assert_eq!(
            c.validate(Value::Int(300), ConstraintPolicy::Coerce, op).unwrap(),
            Value::Int(127)
        );
        assert_eq!(
            c.validate(Value::Int(-5), ConstraintPolicy::Strict, op).unwrap(),
            Value::Int(-5)
        );
    }

    #[test]
    fn test_coerce_failure_escalates() {
        let c = Constraint::Type(ValueType::Int);
        let err = c
            .validate(Value::from("not a number"), ConstraintPolicy::Coerce, CodecOperation::Load)
            .unwrap_err();
        assert!(err.to_string().contains("cannot be coerced"));
        assert_eq!(
            c.validate(Value::from(" 42 "), ConstraintPolicy::Coerce, CodecOperation::Load)
                .unwrap(),
            Value::Int(42)
        );
    }

    #[test]
    fn test_range() {
        let c = Constraint::range(0, 10).unwrap();
        assert!(c.check(&Value::Int(10)).is_ok());
        assert!(c.check(&Value::Float(10.5)).is_err());
        assert_eq!(c.coerce(&Value::Int(-3)), Some(Value::Int(0)));
        assert!(Constraint::range(5, 1).is_err());

        let inf = Constraint::Range {
            min: Value::Float(-1.0),
            max: Value::Float(1.0),
            accept_inf: true,
        };
        assert!(inf.check(&Value::Float(f64::INFINITY)).is_ok());
        assert!(inf.check(&Value::Float(2.0)).is_err());
    }

    #[test]
    fn test_integers_match_either_sign() {
        let c = Constraint::Type(ValueType::Int);
        assert!(c.check(&Value::UInt(3)).is_ok());
        assert!(c.check(&Value::Float(3.0)).is_err());
    }
}
