//! A tagged numeric value.
//!
//! JSON cannot distinguish integers from floats and has no literal for the
//! IEEE-754 sentinels, so the JSON reader parses every number into this box
//! and callers project the width they declared. The sentinels serialize as
//! the quoted strings `"Infinity"`, `"-Infinity"`, and `"NaN"`.

/// JSON text form of positive infinity.
pub const JSON_INFINITY: &str = "Infinity";
/// JSON text form of negative infinity.
pub const JSON_NEGATIVE_INFINITY: &str = "-Infinity";
/// JSON text form of not-a-number.
pub const JSON_NAN: &str = "NaN";

/// A number as it appeared on the wire: integer, float, one of the three
/// floating sentinels, or absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    I64(i64),
    F64(f64),
    PosInfinity,
    NegInfinity,
    NaN,
    Null,
}

impl Numeric {
    /// Box an f64, normalizing the sentinel bit patterns into their own
    /// variants so they survive a text round trip.
    pub fn from_f64(v: f64) -> Self {
        if v.is_nan() {
            Numeric::NaN
        } else if v == f64::INFINITY {
            Numeric::PosInfinity
        } else if v == f64::NEG_INFINITY {
            Numeric::NegInfinity
        } else {
            Numeric::F64(v)
        }
    }

    /// Parse a JSON number token or sentinel string.
    ///
    /// Integer-looking text (no `.`, `e`, or `E`) becomes `I64` as long as it
    /// fits; everything else parses as a float.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "" => return None,
            JSON_INFINITY => return Some(Numeric::PosInfinity),
            JSON_NEGATIVE_INFINITY => return Some(Numeric::NegInfinity),
            JSON_NAN => return Some(Numeric::NaN),
            _ => {}
        }
        let looks_integral = !text.contains(['.', 'e', 'E']);
        if looks_integral {
            if let Ok(v) = text.parse::<i64>() {
                return Some(Numeric::I64(v));
            }
        }
        text.parse::<f64>().ok().map(Numeric::from_f64)
    }

    /// Project to i64, truncating floats; sentinels and null become 0.
    pub fn as_i64(&self) -> i64 {
        match *self {
            Numeric::I64(v) => v,
            Numeric::F64(v) => v as i64,
            Numeric::PosInfinity | Numeric::NegInfinity | Numeric::NaN | Numeric::Null => 0,
        }
    }

    /// Project to f64; the sentinels produce their IEEE-754 bit patterns.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Numeric::I64(v) => v as f64,
            Numeric::F64(v) => v,
            Numeric::PosInfinity => f64::INFINITY,
            Numeric::NegInfinity => f64::NEG_INFINITY,
            Numeric::NaN => f64::NAN,
            Numeric::Null => 0.0,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Numeric::Null)
    }

    pub const fn is_nan(&self) -> bool {
        matches!(self, Numeric::NaN)
    }

    /// The sentinel string for non-finite values, if this is one.
    pub const fn sentinel_text(&self) -> Option<&'static str> {
        match self {
            Numeric::PosInfinity => Some(JSON_INFINITY),
            Numeric::NegInfinity => Some(JSON_NEGATIVE_INFINITY),
            Numeric::NaN => Some(JSON_NAN),
            _ => None,
        }
    }
}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Numeric::I64(v) => write!(f, "{v}"),
            Numeric::F64(v) => write!(f, "{v}"),
            Numeric::PosInfinity => f.write_str(JSON_INFINITY),
            Numeric::NegInfinity => f.write_str(JSON_NEGATIVE_INFINITY),
            Numeric::NaN => f.write_str(JSON_NAN),
            Numeric::Null => f.write_str("null"),
        }
    }
}
