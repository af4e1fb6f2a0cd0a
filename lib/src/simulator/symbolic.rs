//! Symbolic execution of well-known pure library methods
//!
//! Only the methods listed here get executed. Anything else on these classes (or on any other
//! class) is an unsupported call: there is no way to know what arbitrary code does, so nothing is
//! ever executed "for real" as a fallback.
//!
//! Builders are modeled as mutable objects whose contents are the [`ReferenceLiteral::Builder`]
//! literal. Appending to one replaces the literal on every copy of the builder in the frame.

use super::{Literal, ReferenceLiteral, SimulationErrorKind, Value};
use crate::jvm::code::MethodRef;
use crate::jvm::{BaseType, BinaryName, FieldType, Name, RefType, RenderDescriptor};

/// Outcome of a modeled call
#[derive(Clone, Debug, PartialEq)]
pub enum Simulated {
    /// Method returns a value without touching its receiver
    Returns(Value),

    /// Method updates its receiver and returns nothing (eg. a constructor)
    Mutates(Value),

    /// Method updates its receiver and returns it (eg. `StringBuilder.append`)
    MutatesAndReturns(Value),
}

/// Does the class have any modeled methods?
pub fn is_modeled(class: &BinaryName) -> bool {
    [
        BinaryName::STRING_BUILDER,
        BinaryName::STRING_BUFFER,
        BinaryName::STRING,
        BinaryName::MATH,
    ]
    .contains(class)
        || boxed_kind(class).is_some()
}

/// Execute a call to a modeled method
///
/// Arguments are in declaration order and don't include the receiver. Unknown inputs produce
/// unknown outputs, while calls to methods that aren't modeled are an error.
pub fn simulate(
    method: &MethodRef,
    receiver: Option<&Value>,
    arguments: &[Value],
) -> Result<Simulated, SimulationErrorKind> {
    let descriptor = method.descriptor.render();
    let name = method.name.as_str();
    let simulated = if method.owner == BinaryName::STRING_BUILDER
        || method.owner == BinaryName::STRING_BUFFER
    {
        builder(&method.owner, name, &descriptor, receiver, arguments)
    } else if method.owner == BinaryName::STRING {
        string(name, &descriptor, receiver, arguments)
    } else if method.owner == BinaryName::MATH {
        math(name, &descriptor, arguments)
    } else if let Some(kind) = boxed_kind(&method.owner) {
        boxed(&method.owner, kind, name, &descriptor, receiver, arguments)
    } else {
        None
    };

    simulated.ok_or_else(|| {
        SimulationErrorKind::UnsupportedCall(format!(
            "{}.{}{}",
            method.owner.as_str(),
            name,
            descriptor
        ))
    })
}

fn builder(
    owner: &BinaryName,
    name: &str,
    descriptor: &str,
    receiver: Option<&Value>,
    arguments: &[Value],
) -> Option<Simulated> {
    let builder_value = |contents: Option<String>| Value::Reference {
        static_type: RefType::Object(owner.clone()),
        literal: contents.map(ReferenceLiteral::Builder),
    };
    let contents = match receiver.and_then(Value::reference_literal) {
        Some(ReferenceLiteral::Builder(contents)) => Some(contents.as_str()),
        _ => None,
    };

    let simulated = match (name, descriptor) {
        ("<init>", "()V") | ("<init>", "(I)V") => Simulated::Mutates(builder_value(Some(String::new()))),
        ("<init>", "(Ljava/lang/String;)V") | ("<init>", "(Ljava/lang/CharSequence;)V") => {
            Simulated::Mutates(builder_value(string_literal(arguments.first()?)))
        }
        ("append", _) if descriptor.ends_with(&format!(")L{};", owner.as_str())) => {
            let text = match (&descriptor[..descriptor.find(')')? + 1], arguments.first()?) {
                ("(Ljava/lang/String;)", arg)
                | ("(Ljava/lang/CharSequence;)", arg)
                | ("(Ljava/lang/Object;)", arg) => printed(arg),
                ("(I)", arg) | ("(J)", arg) => arg.literal().map(|l| render_integral(*l)),
                ("(C)", arg) => arg.literal().and_then(|l| render_char(*l)),
                ("(Z)", arg) => arg.literal().map(|l| (l.as_i32() != 0).to_string()),

                // Java and Rust disagree on how floating point numbers are printed
                ("(F)", _) | ("(D)", _) => None,
                _ => return None,
            };
            let appended = contents.zip(text).map(|(contents, text)| contents.to_owned() + &text);
            Simulated::MutatesAndReturns(builder_value(appended))
        }
        ("toString", "()Ljava/lang/String;") => Simulated::Returns(match contents {
            Some(contents) => Value::string(contents),
            None => Value::reference(RefType::STRING),
        }),
        ("length", "()I") => Simulated::Returns(match contents {
            Some(contents) => Value::int(contents.encode_utf16().count() as i32),
            None => Value::unknown(BaseType::Int),
        }),
        _ => return None,
    };
    Some(simulated)
}

fn string(
    name: &str,
    descriptor: &str,
    receiver: Option<&Value>,
    arguments: &[Value],
) -> Option<Simulated> {
    let this = receiver.and_then(string_literal);
    let unknown_int = Value::unknown(BaseType::Int);
    let unknown_bool = Value::unknown(BaseType::Boolean);
    let unknown_string = Value::reference(RefType::STRING);

    let returned = match (name, descriptor) {
        ("length", "()I") => this.map_or(unknown_int, |s| Value::int(s.encode_utf16().count() as i32)),
        ("isEmpty", "()Z") => this.map_or(unknown_bool, |s| Value::boolean(s.is_empty())),
        ("hashCode", "()I") => this.map_or(unknown_int, |s| Value::int(java_hash_code(&s))),
        ("toString", "()Ljava/lang/String;") => this.map_or(unknown_string, Value::string),
        ("concat", "(Ljava/lang/String;)Ljava/lang/String;") => {
            match (this, string_literal(arguments.first()?)) {
                (Some(this), Some(other)) => Value::string(this + &other),
                _ => unknown_string,
            }
        }
        ("equals", "(Ljava/lang/Object;)Z") => match (this, arguments.first()?) {
            (Some(_), Value::Null) => Value::boolean(false),
            (Some(this), Value::Reference {
                literal: Some(ReferenceLiteral::String(other)),
                ..
            }) => Value::boolean(&this == other),
            _ => unknown_bool,
        },
        ("charAt", "(I)C") => {
            let index = arguments.first()?.literal().map(|l| l.as_i32());
            let unit = this.zip(index).and_then(|(s, index)| {
                let index = usize::try_from(index).ok()?;
                s.encode_utf16().nth(index)
            });
            match unit {
                Some(unit) => Value::Primitive {
                    kind: BaseType::Char,
                    literal: Some(Literal::Int(unit as i32)),
                },
                None => Value::unknown(BaseType::Char),
            }
        }
        ("valueOf", _) if descriptor.ends_with(")Ljava/lang/String;") => {
            let argument = arguments.first()?;
            let text = match &descriptor[..descriptor.find(')')? + 1] {
                "(I)" | "(J)" => argument.literal().map(|l| render_integral(*l)),
                "(C)" => argument.literal().and_then(|l| render_char(*l)),
                "(Z)" => argument.literal().map(|l| (l.as_i32() != 0).to_string()),
                "(Ljava/lang/Object;)" => printed(argument),
                "(F)" | "(D)" => None,
                _ => return None,
            };
            text.map_or(unknown_string, Value::string)
        }
        _ => return None,
    };
    Some(Simulated::Returns(returned))
}

fn math(name: &str, descriptor: &str, arguments: &[Value]) -> Option<Simulated> {
    let first = arguments.first().and_then(Value::literal).copied();
    let second = arguments.get(1).and_then(Value::literal).copied();

    let returned = match (name, descriptor) {
        ("abs", "(I)I") => fold_int(first.map(|a| a.as_i32().wrapping_abs())),
        ("abs", "(J)J") => fold_long(first.map(|a| a.as_i64().wrapping_abs())),
        ("abs", "(F)F") => match first {
            Some(a) => Value::float(a.as_f32().abs()),
            None => Value::unknown(BaseType::Float),
        },
        ("abs", "(D)D") => match first {
            Some(a) => Value::double(a.as_f64().abs()),
            None => Value::unknown(BaseType::Double),
        },
        ("min", "(II)I") => fold_int(first.zip(second).map(|(a, b)| a.as_i32().min(b.as_i32()))),
        ("max", "(II)I") => fold_int(first.zip(second).map(|(a, b)| a.as_i32().max(b.as_i32()))),
        ("min", "(JJ)J") => fold_long(first.zip(second).map(|(a, b)| a.as_i64().min(b.as_i64()))),
        ("max", "(JJ)J") => fold_long(first.zip(second).map(|(a, b)| a.as_i64().max(b.as_i64()))),
        _ => return None,
    };
    Some(Simulated::Returns(returned))
}

fn boxed(
    owner: &BinaryName,
    kind: BaseType,
    name: &str,
    descriptor: &str,
    receiver: Option<&Value>,
    arguments: &[Value],
) -> Option<Simulated> {
    let box_type = RefType::Object(owner.clone());
    let boxed_literal = match receiver.and_then(Value::reference_literal) {
        Some(ReferenceLiteral::Boxed(literal)) => Some(*literal),
        _ => None,
    };

    let returned = if name == "valueOf" && descriptor == box_descriptor(owner, kind) {
        Value::Reference {
            static_type: box_type,
            literal: arguments
                .first()?
                .literal()
                .map(|literal| ReferenceLiteral::Boxed(literal.convert(kind))),
        }
    } else if let Some(unboxed) = unboxing_kind(kind, name, descriptor) {
        Value::Primitive {
            kind: unboxed,
            literal: boxed_literal.map(|literal| literal.convert(unboxed)),
        }
    } else if *owner == BinaryName::INTEGER {
        match (name, descriptor) {
            ("parseInt", "(Ljava/lang/String;)I") => {
                let parsed = string_literal(arguments.first()?).and_then(|s| parse_java_int(&s));
                fold_int(parsed)
            }
            ("toString", "(I)Ljava/lang/String;") => match arguments.first()?.literal() {
                Some(literal) => Value::string(render_integral(*literal)),
                None => Value::reference(RefType::STRING),
            },
            _ => return None,
        }
    } else {
        return None;
    };
    Some(Simulated::Returns(returned))
}

/// Primitive type wrapped by a boxed class
fn boxed_kind(class: &BinaryName) -> Option<BaseType> {
    let kind = match class.as_str() {
        "java/lang/Integer" => BaseType::Int,
        "java/lang/Long" => BaseType::Long,
        "java/lang/Short" => BaseType::Short,
        "java/lang/Byte" => BaseType::Byte,
        "java/lang/Character" => BaseType::Char,
        "java/lang/Boolean" => BaseType::Boolean,
        "java/lang/Float" => BaseType::Float,
        "java/lang/Double" => BaseType::Double,
        _ => return None,
    };
    Some(kind)
}

/// Descriptor of the boxing `valueOf` (eg. `(I)Ljava/lang/Integer;`)
fn box_descriptor(owner: &BinaryName, kind: BaseType) -> String {
    format!(
        "({})L{};",
        FieldType::Base(kind).render(),
        owner.as_str()
    )
}

/// Target of an unboxing method like `intValue` or `charValue`
fn unboxing_kind(boxed: BaseType, name: &str, descriptor: &str) -> Option<BaseType> {
    let target = BaseType::from_keyword(name.strip_suffix("Value")?)?;
    let numeric = |kind: BaseType| !matches!(kind, BaseType::Char | BaseType::Boolean);
    let allowed = target == boxed || (numeric(target) && numeric(boxed));
    if allowed && descriptor == format!("(){}", FieldType::Base(target).render()) {
        Some(target)
    } else {
        None
    }
}

fn string_literal(value: &Value) -> Option<String> {
    match value {
        Value::Reference {
            literal: Some(ReferenceLiteral::String(s)),
            ..
        } => Some(s.clone()),
        _ => None,
    }
}

/// Text of a reference as `String.valueOf(Object)` prints it
fn printed(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::from("null")),
        other => string_literal(other),
    }
}

fn render_integral(literal: Literal) -> String {
    match literal {
        Literal::Long(l) => l.to_string(),
        other => other.as_i32().to_string(),
    }
}

fn render_char(literal: Literal) -> Option<String> {
    char::from_u32(literal.as_i32() as u16 as u32).map(String::from)
}

fn fold_int(value: Option<i32>) -> Value {
    value.map_or(Value::unknown(BaseType::Int), Value::int)
}

fn fold_long(value: Option<i64>) -> Value {
    value.map_or(Value::unknown(BaseType::Long), Value::long)
}

/// `String.hashCode`: `s[0]*31^(n-1) + ... + s[n-1]` over UTF-16 code units
fn java_hash_code(string: &str) -> i32 {
    string
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// `Integer.parseInt` in radix 10 (`None` where Java throws)
fn parse_java_int(string: &str) -> Option<i32> {
    let digits = string.strip_prefix(&['+', '-'][..]).unwrap_or(string);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    string.parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{MethodDescriptor, ParseDescriptor, UnqualifiedName};

    fn method(owner: BinaryName, name: &str, descriptor: &str) -> MethodRef {
        MethodRef {
            owner,
            name: UnqualifiedName::from_string(String::from(name)).unwrap(),
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
        }
    }

    fn builder(contents: &str) -> Value {
        Value::Reference {
            static_type: RefType::Object(BinaryName::STRING_BUILDER),
            literal: Some(ReferenceLiteral::Builder(String::from(contents))),
        }
    }

    #[test]
    fn string_builder() {
        let init = method(BinaryName::STRING_BUILDER, "<init>", "(Ljava/lang/String;)V");
        let fresh = Value::reference(RefType::Object(BinaryName::STRING_BUILDER));
        assert_eq!(
            simulate(&init, Some(&fresh), &[Value::string("x = ")]),
            Ok(Simulated::Mutates(builder("x = ")))
        );

        let append = method(
            BinaryName::STRING_BUILDER,
            "append",
            "(I)Ljava/lang/StringBuilder;",
        );
        assert_eq!(
            simulate(&append, Some(&builder("x = ")), &[Value::int(-4)]),
            Ok(Simulated::MutatesAndReturns(builder("x = -4")))
        );
        assert_eq!(
            simulate(&append, Some(&builder("x = ")), &[Value::unknown(BaseType::Int)]),
            Ok(Simulated::MutatesAndReturns(Value::reference(RefType::Object(
                BinaryName::STRING_BUILDER
            ))))
        );

        let append_char = method(
            BinaryName::STRING_BUILDER,
            "append",
            "(C)Ljava/lang/StringBuilder;",
        );
        let bang = Value::Primitive {
            kind: BaseType::Char,
            literal: Some(Literal::Int('!' as i32)),
        };
        assert_eq!(
            simulate(&append_char, Some(&builder("hi")), &[bang]),
            Ok(Simulated::MutatesAndReturns(builder("hi!")))
        );

        let to_string = method(BinaryName::STRING_BUILDER, "toString", "()Ljava/lang/String;");
        assert_eq!(
            simulate(&to_string, Some(&builder("done")), &[]),
            Ok(Simulated::Returns(Value::string("done")))
        );

        let insert = method(
            BinaryName::STRING_BUILDER,
            "insert",
            "(ILjava/lang/String;)Ljava/lang/StringBuilder;",
        );
        assert!(matches!(
            simulate(&insert, Some(&builder("")), &[Value::int(0), Value::string("a")]),
            Err(SimulationErrorKind::UnsupportedCall(_))
        ));
    }

    #[test]
    fn strings() {
        let hash = method(BinaryName::STRING, "hashCode", "()I");
        assert_eq!(
            simulate(&hash, Some(&Value::string("hello")), &[]),
            Ok(Simulated::Returns(Value::int(99162322)))
        );

        let equals = method(BinaryName::STRING, "equals", "(Ljava/lang/Object;)Z");
        assert_eq!(
            simulate(&equals, Some(&Value::string("a")), &[Value::string("a")]),
            Ok(Simulated::Returns(Value::boolean(true)))
        );
        assert_eq!(
            simulate(&equals, Some(&Value::string("a")), &[Value::Null]),
            Ok(Simulated::Returns(Value::boolean(false)))
        );

        let char_at = method(BinaryName::STRING, "charAt", "(I)C");
        assert_eq!(
            simulate(&char_at, Some(&Value::string("abc")), &[Value::int(7)]),
            Ok(Simulated::Returns(Value::unknown(BaseType::Char)))
        );

        let intern = method(BinaryName::STRING, "intern", "()Ljava/lang/String;");
        assert!(simulate(&intern, Some(&Value::string("a")), &[]).is_err());
    }

    #[test]
    fn null_is_only_printed_where_java_prints_it() {
        let unknown_string = Value::reference(RefType::STRING);

        let length = method(BinaryName::STRING, "length", "()I");
        assert_eq!(
            simulate(&length, Some(&Value::Null), &[]),
            Ok(Simulated::Returns(Value::unknown(BaseType::Int)))
        );

        let concat = method(
            BinaryName::STRING,
            "concat",
            "(Ljava/lang/String;)Ljava/lang/String;",
        );
        assert_eq!(
            simulate(&concat, Some(&Value::string("a")), &[Value::Null]),
            Ok(Simulated::Returns(unknown_string.clone()))
        );

        let init = method(BinaryName::STRING_BUILDER, "<init>", "(Ljava/lang/String;)V");
        let fresh = Value::reference(RefType::Object(BinaryName::STRING_BUILDER));
        assert_eq!(
            simulate(&init, Some(&fresh), &[Value::Null]),
            Ok(Simulated::Mutates(fresh.clone()))
        );

        let parse = method(BinaryName::INTEGER, "parseInt", "(Ljava/lang/String;)I");
        assert_eq!(
            simulate(&parse, None, &[Value::Null]),
            Ok(Simulated::Returns(Value::unknown(BaseType::Int)))
        );

        let append = method(
            BinaryName::STRING_BUILDER,
            "append",
            "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
        );
        assert_eq!(
            simulate(&append, Some(&builder("x = ")), &[Value::Null]),
            Ok(Simulated::MutatesAndReturns(builder("x = null")))
        );

        let value_of = method(
            BinaryName::STRING,
            "valueOf",
            "(Ljava/lang/Object;)Ljava/lang/String;",
        );
        assert_eq!(
            simulate(&value_of, None, &[Value::Null]),
            Ok(Simulated::Returns(Value::string("null")))
        );
    }

    #[test]
    fn boxing_and_math() {
        let value_of = method(BinaryName::INTEGER, "valueOf", "(I)Ljava/lang/Integer;");
        let boxed = Value::Reference {
            static_type: RefType::Object(BinaryName::INTEGER),
            literal: Some(ReferenceLiteral::Boxed(Literal::Int(300))),
        };
        assert_eq!(
            simulate(&value_of, None, &[Value::int(300)]),
            Ok(Simulated::Returns(boxed.clone()))
        );

        let byte_value = method(BinaryName::INTEGER, "byteValue", "()B");
        assert_eq!(
            simulate(&byte_value, Some(&boxed), &[]),
            Ok(Simulated::Returns(Value::Primitive {
                kind: BaseType::Byte,
                literal: Some(Literal::Int(44))
            }))
        );

        let char_value = method(BinaryName::INTEGER, "charValue", "()C");
        assert!(simulate(&char_value, Some(&boxed), &[]).is_err());

        let parse = method(BinaryName::INTEGER, "parseInt", "(Ljava/lang/String;)I");
        assert_eq!(
            simulate(&parse, None, &[Value::string("-12")]),
            Ok(Simulated::Returns(Value::int(-12)))
        );
        assert_eq!(
            simulate(&parse, None, &[Value::string("1_0")]),
            Ok(Simulated::Returns(Value::unknown(BaseType::Int)))
        );

        let abs = method(BinaryName::MATH, "abs", "(I)I");
        assert_eq!(
            simulate(&abs, None, &[Value::int(i32::MIN)]),
            Ok(Simulated::Returns(Value::int(i32::MIN)))
        );

        assert!(is_modeled(&BinaryName::CHARACTER));
        assert!(!is_modeled(&BinaryName::OBJECT));
    }
}
