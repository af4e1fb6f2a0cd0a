use super::{BinaryName, Name};
use crate::util::Width;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => {
                let msg = format!("Unexpected leftover input '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// Types the JVM represents on the stack as `int`
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            BaseType::Boolean | BaseType::Byte | BaseType::Char | BaseType::Short | BaseType::Int
        )
    }

    pub fn sort(&self) -> TypeSort {
        match self {
            BaseType::Boolean => TypeSort::Boolean,
            BaseType::Byte => TypeSort::Byte,
            BaseType::Short => TypeSort::Short,
            BaseType::Char => TypeSort::Char,
            BaseType::Int => TypeSort::Int,
            BaseType::Float => TypeSort::Float,
            BaseType::Double => TypeSort::Double,
            BaseType::Long => TypeSort::Long,
        }
    }

    /// Binary numeric promotion of two primitive operand types
    pub fn promote(self, other: BaseType) -> BaseType {
        if promote(self.sort(), other.sort()) == self.sort() {
            self
        } else {
            other
        }
    }

    /// Java source keyword for the type
    pub fn keyword(&self) -> &'static str {
        match self {
            BaseType::Byte => "byte",
            BaseType::Char => "char",
            BaseType::Double => "double",
            BaseType::Float => "float",
            BaseType::Int => "int",
            BaseType::Long => "long",
            BaseType::Short => "short",
            BaseType::Boolean => "boolean",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<BaseType> {
        let typ = match keyword {
            "byte" => BaseType::Byte,
            "char" => BaseType::Char,
            "double" => BaseType::Double,
            "float" => BaseType::Float,
            "int" => BaseType::Int,
            "long" => BaseType::Long,
            "short" => BaseType::Short,
            "boolean" => BaseType::Boolean,
            _ => return None,
        };
        Some(typ)
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                let msg = format!("Invalid base type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing base type character";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        };
        Ok(typ)
    }
}

/// Rank of a type in binary numeric promotion
///
/// The declaration order is the promotion order: when two operand types meet, the later one wins.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum TypeSort {
    Void,
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Float,
    Double,
    Long,
    Array,
    Object,
}

/// Pick the higher ranked of two types
pub fn promote(a: TypeSort, b: TypeSort) -> TypeSort {
    a.max(b)
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    ObjectArray(ArrayType<BinaryName>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Generic array type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T> ArrayType<T> {
    /// Total number of dimensions in the array type
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..self.dimensions() {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if source.next() != Some('L') {
            let msg = "Expected object type to start with `L`";
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }
        let mut class_name = String::new();
        loop {
            match source.next() {
                Some(';') => {
                    return BinaryName::from_string(class_name)
                        .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg))
                }
                Some(c) => class_name.push(c),
                None => {
                    let msg = format!("Missing terminator for 'L{}'", class_name);
                    return Err(Error::new(ErrorKind::UnexpectedEof, msg));
                }
            }
        }
    }
}

impl RenderDescriptor for RefType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
        }
    }
}

impl ParseDescriptor for RefType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            Some('L') => BinaryName::parse_from(source).map(RefType::Object),
            Some('[') => {
                let mut dimensions = 0;
                while source.next_if_eq(&'[').is_some() {
                    dimensions += 1;
                }
                let additional_dimensions = dimensions - 1;
                if let Some('L') = source.peek().copied() {
                    Ok(RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: BinaryName::parse_from(source)?,
                    }))
                } else {
                    Ok(RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::parse_from(source)?,
                    }))
                }
            }
            Some(c) => {
                let msg = format!("Invalid reference type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing reference type")),
        }
    }
}

impl RefType {
    pub const OBJECT: RefType = RefType::Object(BinaryName::OBJECT);
    pub const STRING: RefType = RefType::Object(BinaryName::STRING);

    /// Array whose elements have the given type
    pub fn array(field_type: FieldType) -> RefType {
        match field_type {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
        }
    }

    /// Type of the elements, if this is an array type
    pub fn element_type(&self) -> Option<FieldType> {
        match self {
            RefType::Object(_) => None,
            RefType::PrimitiveArray(arr) => Some(match arr.additional_dimensions {
                0 => FieldType::Base(arr.element_type),
                n => FieldType::Ref(RefType::PrimitiveArray(ArrayType {
                    additional_dimensions: n - 1,
                    element_type: arr.element_type,
                })),
            }),
            RefType::ObjectArray(arr) => Some(match arr.additional_dimensions {
                0 => FieldType::Ref(RefType::Object(arr.element_type.clone())),
                n => FieldType::Ref(RefType::ObjectArray(ArrayType {
                    additional_dimensions: n - 1,
                    element_type: arr.element_type.clone(),
                })),
            }),
        }
    }

    /// Parse either a bare class name (`java/lang/String`) or an array descriptor (`[I`)
    pub fn parse_class_operand(source: &str) -> Result<RefType> {
        if source.starts_with('[') {
            RefType::parse(source)
        } else {
            BinaryName::from_string(source.to_owned())
                .map(RefType::Object)
                .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg))
        }
    }

    /// Class name if this is an object (not array) type
    pub fn class_name(&self) -> Option<&BinaryName> {
        match self {
            RefType::Object(name) => Some(name),
            _ => None,
        }
    }

    pub fn sort(&self) -> TypeSort {
        match self {
            RefType::Object(_) => TypeSort::Object,
            _ => TypeSort::Array,
        }
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl FieldType {
    pub fn object(class_name: BinaryName) -> FieldType {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub fn sort(&self) -> TypeSort {
        match self {
            FieldType::Base(base_type) => base_type.sort(),
            FieldType::Ref(ref_type) => ref_type.sort(),
        }
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type")),
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) => {
                let msg = format!("Invalid field type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: Option<FieldType>, // `None` is for `void` (ie. no return)
}

impl MethodDescriptor {
    /// Total slot length of parameters (not the same as the length of the vector)
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len + self.parameters.iter().map(Width::width).sum::<usize>()
    }

    /// Slots pushed by the return value
    pub fn return_width(&self) -> usize {
        self.return_type.as_ref().map_or(0, Width::width)
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        }
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if source.next() != Some('(') {
            let msg = "Expected method descriptor to start with `(`";
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }
        let mut parameters = vec![];
        while source.next_if_eq(&')').is_none() {
            parameters.push(FieldType::parse_from(source)?);
        }
        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::parse_from(source)?)
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_and_render_method() {
        let source = "(I[[Ljava/lang/String;J)Ljava/lang/StringBuilder;";
        let descriptor = MethodDescriptor::parse(source).unwrap();
        assert_eq!(descriptor.parameters.len(), 3);
        assert_eq!(descriptor.parameter_length(true), 5);
        assert_eq!(descriptor.return_width(), 1);
        assert_eq!(descriptor.render(), source);

        let void = MethodDescriptor::parse("()V").unwrap();
        assert_eq!(void.return_type, None);
        assert_eq!(void.return_width(), 0);
    }

    #[test]
    fn parse_errors() {
        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("Q").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(MethodDescriptor::parse("I)V").is_err());
    }

    #[test]
    fn array_elements() {
        let arr = RefType::parse("[[I").unwrap();
        assert_eq!(arr.element_type(), Some(FieldType::Ref(RefType::parse("[I").unwrap())));
        let strings = RefType::parse("[Ljava/lang/String;").unwrap();
        assert_eq!(strings.element_type(), Some(FieldType::Ref(RefType::STRING)));
        assert_eq!(RefType::STRING.element_type(), None);
        assert_eq!(RefType::array(FieldType::int()), RefType::parse("[I").unwrap());
    }

    #[test]
    fn promotion_order() {
        use TypeSort::*;
        let order = [
            Void, Boolean, Byte, Short, Char, Int, Float, Double, Long, Array, Object,
        ];
        for (i, a) in order.iter().enumerate() {
            for b in &order[i..] {
                assert_eq!(promote(*a, *b), *b);
                assert_eq!(promote(*b, *a), *b);
            }
        }
        assert_eq!(BaseType::Byte.promote(BaseType::Short), BaseType::Short);
        assert_eq!(BaseType::Long.promote(BaseType::Double), BaseType::Long);
        assert_eq!(BaseType::Int.promote(BaseType::Int), BaseType::Int);
    }
}
