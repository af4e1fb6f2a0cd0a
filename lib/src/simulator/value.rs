use crate::jvm::code::{Constant, InsnIndex};
use crate::jvm::{BaseType, BinaryName, FieldType, Name, RefType, RenderDescriptor};
use crate::util::Width;
use std::fmt::{Display, Error as FmtError, Formatter};
use std::hash::{Hash, Hasher};

/// Concrete primitive number
///
/// Every type the JVM represents as an `int` on the stack (`boolean`, `byte`, `char`, `short`,
/// `int`) is stored as [`Literal::Int`]. The kind on the enclosing [`Value`] says which one it is.
///
/// Equality is bitwise, so `NaN` equals itself and `0.0` is not `-0.0`. That is what a lattice
/// needs: merging a value with itself must be the identity.
#[derive(Copy, Clone, Debug)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl PartialEq for Literal {
    fn eq(&self, other: &Literal) -> bool {
        match (self, other) {
            (Literal::Int(a), Literal::Int(b)) => a == b,
            (Literal::Long(a), Literal::Long(b)) => a == b,
            (Literal::Float(a), Literal::Float(b)) => a.to_bits() == b.to_bits(),
            (Literal::Double(a), Literal::Double(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Literal::Int(i) => i.hash(state),
            Literal::Long(l) => l.hash(state),
            Literal::Float(f) => f.to_bits().hash(state),
            Literal::Double(d) => d.to_bits().hash(state),
        }
    }
}

impl Literal {
    /// Value of the literal after a Java primitive conversion (`i2l`, `d2i`, `i2b`, etc.)
    ///
    /// Float to integer conversions saturate and send `NaN` to zero, same as Rust's `as`.
    pub fn convert(self, target: BaseType) -> Literal {
        match target {
            BaseType::Int => Literal::Int(self.as_i32()),
            BaseType::Long => Literal::Long(self.as_i64()),
            BaseType::Float => Literal::Float(self.as_f32()),
            BaseType::Double => Literal::Double(self.as_f64()),
            BaseType::Byte => Literal::Int(self.as_i32() as i8 as i32),
            BaseType::Short => Literal::Int(self.as_i32() as i16 as i32),
            BaseType::Char => Literal::Int(self.as_i32() as u16 as i32),
            BaseType::Boolean => Literal::Int(self.as_i32() & 1),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Literal::Int(i) => i,
            Literal::Long(l) => l as i32,
            Literal::Float(f) => f as i32,
            Literal::Double(d) => d as i32,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Literal::Int(i) => i as i64,
            Literal::Long(l) => l,
            Literal::Float(f) => f as i64,
            Literal::Double(d) => d as i64,
        }
    }

    pub fn as_f32(self) -> f32 {
        match self {
            Literal::Int(i) => i as f32,
            Literal::Long(l) => l as f32,
            Literal::Float(f) => f,
            Literal::Double(d) => d as f32,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Literal::Int(i) => i as f64,
            Literal::Long(l) => l as f64,
            Literal::Float(f) => f as f64,
            Literal::Double(d) => d,
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Long(l) => write!(f, "{}L", l),
            Literal::Float(x) => write!(f, "{:?}f", x),
            Literal::Double(x) => write!(f, "{:?}d", x),
        }
    }
}

/// Known identity of a reference
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceLiteral {
    /// `java.lang.String` with known contents
    String(String),

    /// `StringBuilder` or `StringBuffer` whose contents so far are known
    Builder(String),

    /// Class literal (`Foo.class`)
    Class(RefType),

    /// Boxed primitive (`Integer.valueOf(3)`)
    Boxed(Literal),
}

/// Element of the value lattice
///
/// This is what one stack or local slot is known to hold at a program point. Identity,
/// provenance, and null-check guards are not part of the lattice element: those live in the
/// [`super::ValueArena`] record that wraps the value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Primitive {
        kind: BaseType,
        literal: Option<Literal>,
    },
    Reference {
        static_type: RefType,
        literal: Option<ReferenceLiteral>,
    },

    /// The `null` constant
    Null,

    /// Slot that was never written, or whose contents can't be described any more
    Uninitialized,

    /// Return address pushed by `jsr` (the payload is where `ret` continues)
    ReturnAddress(InsnIndex),
}

impl Value {
    pub fn int(value: i32) -> Value {
        Value::Primitive {
            kind: BaseType::Int,
            literal: Some(Literal::Int(value)),
        }
    }

    pub fn long(value: i64) -> Value {
        Value::Primitive {
            kind: BaseType::Long,
            literal: Some(Literal::Long(value)),
        }
    }

    pub fn float(value: f32) -> Value {
        Value::Primitive {
            kind: BaseType::Float,
            literal: Some(Literal::Float(value)),
        }
    }

    pub fn double(value: f64) -> Value {
        Value::Primitive {
            kind: BaseType::Double,
            literal: Some(Literal::Double(value)),
        }
    }

    pub fn boolean(value: bool) -> Value {
        Value::Primitive {
            kind: BaseType::Boolean,
            literal: Some(Literal::Int(value as i32)),
        }
    }

    /// Primitive of the given kind with an unknown value
    pub fn unknown(kind: BaseType) -> Value {
        Value::Primitive {
            kind,
            literal: None,
        }
    }

    /// Reference of the given type with an unknown identity
    pub fn reference(static_type: RefType) -> Value {
        Value::Reference {
            static_type,
            literal: None,
        }
    }

    pub fn string(value: impl Into<String>) -> Value {
        Value::Reference {
            static_type: RefType::STRING,
            literal: Some(ReferenceLiteral::String(value.into())),
        }
    }

    /// Value of a declared field, parameter, or return type about which nothing else is known
    pub fn of_type(field_type: &FieldType) -> Value {
        match field_type {
            FieldType::Base(kind) => Value::unknown(*kind),
            FieldType::Ref(ref_type) => Value::reference(ref_type.clone()),
        }
    }

    /// Value of a constant
    ///
    /// The declared type matters for integer constants: a `boolean` or `char` field initialized
    /// from the constant pool still holds an `Integer` constant.
    pub fn of_constant(constant: &Constant, declared: Option<&FieldType>) -> Value {
        match constant {
            Constant::Integer(i) => match declared {
                Some(FieldType::Base(kind)) if kind.is_int_like() => Value::Primitive {
                    kind: *kind,
                    literal: Some(Literal::Int(*i).convert(*kind)),
                },
                _ => Value::int(*i),
            },
            Constant::Long(l) => Value::long(*l),
            Constant::Float(f) => Value::float(*f),
            Constant::Double(d) => Value::double(*d),
            Constant::String(s) => Value::string(s.clone()),
            Constant::Class(class) => Value::Reference {
                static_type: RefType::Object(BinaryName::CLASS),
                literal: Some(ReferenceLiteral::Class(class.clone())),
            },
            Constant::MethodType(_) => Value::reference(RefType::Object(BinaryName::METHOD_TYPE)),
            Constant::MethodHandle => Value::reference(RefType::Object(BinaryName::METHOD_HANDLE)),
        }
    }

    /// Primitive literal, if this is a primitive with a known value
    pub fn literal(&self) -> Option<&Literal> {
        match self {
            Value::Primitive { literal, .. } => literal.as_ref(),
            _ => None,
        }
    }

    /// Reference literal, if this is a reference with a known identity
    pub fn reference_literal(&self) -> Option<&ReferenceLiteral> {
        match self {
            Value::Reference { literal, .. } => literal.as_ref(),
            _ => None,
        }
    }

    /// Primitive kind, if this is a primitive
    pub fn kind(&self) -> Option<BaseType> {
        match self {
            Value::Primitive { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Could this value be an operand of an instruction expecting the given primitive kind?
    ///
    /// The `int` family is interchangeable (the JVM doesn't distinguish them on the stack).
    pub fn fits_primitive(&self, expected: BaseType) -> bool {
        match self {
            Value::Primitive { kind, .. } => {
                *kind == expected || (kind.is_int_like() && expected.is_int_like())
            }
            _ => false,
        }
    }

    /// Is this `null` or a reference?
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Reference { .. } | Value::Null)
    }

    /// Same lattice element, minus any literal
    pub fn without_literal(&self) -> Value {
        match self {
            Value::Primitive { kind, .. } => Value::unknown(*kind),
            Value::Reference { static_type, .. } => Value::reference(static_type.clone()),
            other => other.clone(),
        }
    }

    /// Lattice merge (least upper bound) of two values
    ///
    /// This is commutative and idempotent. Merging never fails: combinations with no useful
    /// upper bound collapse to [`Value::Uninitialized`].
    pub fn merge(&self, other: &Value) -> Value {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (Value::Null, Value::Reference { static_type, .. })
            | (Value::Reference { static_type, .. }, Value::Null) => {
                Value::reference(static_type.clone())
            }

            (
                Value::Primitive {
                    kind: kind1,
                    literal: literal1,
                },
                Value::Primitive {
                    kind: kind2,
                    literal: literal2,
                },
            ) => {
                let kind = if kind1 == kind2 {
                    *kind1
                } else if kind1.is_int_like() && kind2.is_int_like() {
                    BaseType::Int
                } else {
                    return Value::Uninitialized;
                };
                let literal = if literal1 == literal2 { *literal1 } else { None };
                Value::Primitive { kind, literal }
            }

            (
                Value::Reference {
                    static_type: type1, ..
                },
                Value::Reference {
                    static_type: type2, ..
                },
            ) => {
                // Literals differ (the values aren't equal), so only the type can survive
                if type1 == type2 {
                    Value::reference(type1.clone())
                } else {
                    Value::reference(RefType::OBJECT)
                }
            }

            _ => Value::Uninitialized,
        }
    }
}

impl Width for Value {
    fn width(&self) -> usize {
        match self {
            Value::Primitive { kind, .. } => kind.width(),
            _ => 1,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Value::Primitive { kind, literal } => {
                write!(f, "{}", kind.keyword())?;
                match (kind, literal) {
                    (BaseType::Boolean, Some(Literal::Int(b))) => write!(f, " {}", *b != 0),
                    (BaseType::Char, Some(Literal::Int(c))) => {
                        match char::from_u32(*c as u32) {
                            Some(c) => write!(f, " {:?}", c),
                            None => write!(f, " {}", c),
                        }
                    }
                    (_, Some(literal)) => write!(f, " {}", literal),
                    (_, None) => Ok(()),
                }
            }
            Value::Reference {
                static_type,
                literal,
            } => {
                match static_type {
                    RefType::Object(name) => write!(f, "{}", name.as_str())?,
                    array => write!(f, "{}", array.render())?,
                }
                match literal {
                    None => Ok(()),
                    Some(ReferenceLiteral::String(s)) => write!(f, " {:?}", s),
                    Some(ReferenceLiteral::Builder(s)) => write!(f, " [{:?}]", s),
                    Some(ReferenceLiteral::Class(class)) => write!(f, " {}.class", class.render()),
                    Some(ReferenceLiteral::Boxed(literal)) => write!(f, " ({})", literal),
                }
            }
            Value::Null => f.write_str("null"),
            Value::Uninitialized => f.write_str("uninitialized"),
            Value::ReturnAddress(target) => write!(f, "return address @{}", target),
        }
    }
}
