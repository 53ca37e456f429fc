use super::chunk::Chunk;
use std::fmt;
use std::rc::Rc;

pub struct Function {
    pub name: String,
    pub arity: u8,
    pub chunk: Chunk,
}

impl Function {
    pub fn new(name: String, arity: u8, chunk: Chunk) -> Self {
        Self { name, arity, chunk }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<FUNKSHUN {}>", self.name)
    }
}

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Function(Rc<Function>),
}

impl Value {
    pub fn new_string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NOOB",
            Value::Bool(_) => "TROOF",
            Value::Integer(_) => "NUMBR",
            Value::Float(_) => "NUMBAR",
            Value::String(_) => "YARN",
            Value::Function(_) => "FUNKSHUN",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Function(_) => true,
        }
    }

    /// Coerces to a number per SPEC_FULL.md §4.4. `Err` carries a runtime error message.
    pub fn to_number(&self) -> Result<Number, String> {
        match self {
            Value::Null => Ok(Number::Integer(0)),
            Value::Bool(b) => Ok(Number::Integer(if *b { 1 } else { 0 })),
            Value::Integer(n) => Ok(Number::Integer(*n)),
            Value::Float(n) => Ok(Number::Float(*n)),
            Value::String(s) => {
                if s.contains('.') {
                    s.parse::<f64>()
                        .map(Number::Float)
                        .map_err(|_| format!("cannot parse \"{s}\" as a number"))
                } else {
                    s.parse::<i64>()
                        .map(Number::Integer)
                        .map_err(|_| format!("cannot parse \"{s}\" as a number"))
                }
            }
            Value::Function(_) => Err("cannot coerce a FUNKSHUN to a number".to_string()),
        }
    }
}

/// The coerced-number intermediate used by arithmetic and comparisons.
#[derive(Clone, Copy, Debug)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => n as f64,
            Number::Float(n) => n,
        }
    }
}

fn widen(a: Number, b: Number) -> (Number, Number) {
    match (a, b) {
        (Number::Integer(_), Number::Integer(_)) => (a, b),
        _ => (Number::Float(a.as_f64()), Number::Float(b.as_f64())),
    }
}

impl Value {
    pub fn add(&self, other: &Value) -> Result<Value, String> {
        if let (Value::String(a), Value::String(b)) = (self, other) {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            return Ok(Value::new_string(s));
        }
        self.arith(other, |a, b| a + b, |a, b| a.wrapping_add(b))
    }

    pub fn sub(&self, other: &Value) -> Result<Value, String> {
        self.arith(other, |a, b| a - b, |a, b| a.wrapping_sub(b))
    }

    pub fn mul(&self, other: &Value) -> Result<Value, String> {
        self.arith(other, |a, b| a * b, |a, b| a.wrapping_mul(b))
    }

    pub fn div(&self, other: &Value) -> Result<Value, String> {
        let l = self.to_number()?;
        let r = other.to_number()?;
        if let (Number::Integer(a), Number::Integer(b)) = (l, r) {
            if b == 0 {
                return Err("division by zero".to_string());
            }
            return Ok(Value::Integer(a.wrapping_div(b))); // truncates toward zero, like Rust's `/`
        }
        let (a, b) = widen(l, r);
        Ok(Value::Float(a.as_f64() / b.as_f64()))
    }

    fn arith(
        &self,
        other: &Value,
        float_op: impl Fn(f64, f64) -> f64,
        int_op: impl Fn(i64, i64) -> i64,
    ) -> Result<Value, String> {
        let l = self.to_number()?;
        let r = other.to_number()?;
        match widen(l, r) {
            (Number::Integer(a), Number::Integer(b)) => Ok(Value::Integer(int_op(a, b))),
            (Number::Float(a), Number::Float(b)) => Ok(Value::Float(float_op(a, b))),
            _ => unreachable!("widen always produces a matching pair"),
        }
    }

    pub fn min(&self, other: &Value) -> Result<Value, String> {
        if self.compare(other)? == std::cmp::Ordering::Less {
            Ok(self.clone())
        } else {
            Ok(other.clone())
        }
    }

    pub fn max(&self, other: &Value) -> Result<Value, String> {
        if self.compare(other)? == std::cmp::Ordering::Greater {
            Ok(self.clone())
        } else {
            Ok(other.clone())
        }
    }

    pub fn compare(&self, other: &Value) -> Result<std::cmp::Ordering, String> {
        let l = self.to_number()?.as_f64();
        let r = other.to_number()?.as_f64();
        l.partial_cmp(&r)
            .ok_or_else(|| "cannot compare NaN".to_string())
    }

    pub fn values_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NOOB"),
            Value::Bool(true) => write!(f, "WIN"),
            Value::Bool(false) => write!(f, "FAIL"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::String(s) => write!(f, "{s}"),
            Value::Function(fun) => write!(f, "<FUNKSHUN {}>", fun.name),
        }
    }
}

/// Decimal with trailing zeros and a trailing `.` stripped (SPEC_FULL.md §6).
fn format_float(n: f64) -> String {
    let mut s = format!("{n:.6}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_spec() {
        assert_eq!(Value::Null.to_string(), "NOOB");
        assert_eq!(Value::Bool(true).to_string(), "WIN");
        assert_eq!(Value::Bool(false).to_string(), "FAIL");
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        assert_eq!(Value::Float(3.0).to_string(), "3");
    }

    #[test]
    fn integer_division_truncates_toward_zero() {
        let a = Value::Integer(-7);
        let b = Value::Integer(2);
        assert_eq!(a.div(&b).unwrap().to_string(), "-3");
    }

    #[test]
    fn integer_division_wraps_instead_of_panicking_on_min_over_neg_one() {
        let a = Value::Integer(i64::MIN);
        let b = Value::Integer(-1);
        assert_eq!(a.div(&b).unwrap().to_string(), i64::MIN.to_string());
    }

    #[test]
    fn mixed_arithmetic_widens_to_float() {
        let a = Value::Integer(1);
        let b = Value::Float(2.5);
        assert_eq!(a.add(&b).unwrap().to_string(), "3.5");
    }

    #[test]
    fn string_concat_only_applies_to_add() {
        let a = Value::new_string("foo");
        let b = Value::new_string("bar");
        assert_eq!(a.add(&b).unwrap().to_string(), "foobar");
    }

    #[test]
    fn equality_does_not_cross_unrelated_variants() {
        assert!(!Value::Bool(true).values_equal(&Value::Integer(1)));
        assert!(Value::Integer(2).values_equal(&Value::Float(2.0)));
    }
}
