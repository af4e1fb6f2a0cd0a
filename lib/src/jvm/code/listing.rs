//! Textual method listings
//!
//! Simulation consumes already resolved methods, so this is not a class file reader. It is a
//! small assembler-like text format for writing methods by hand (tests, the command line tool):
//!
//! ```text
//! .class me/alec/Example
//!
//! .method public static sum(II)I
//! .limit stack 2
//!     iload 0
//!     iload 1
//!     iadd
//!     ifeq zero
//!     iconst_1
//!     ireturn
//! zero:
//!     iconst_0
//!     ireturn
//! .end method
//! ```
//!
//! Labels (`name:`) mark the position of the next instruction and `@n` refers to instruction `n`
//! directly. Comments start with `#`. Exception handlers are declared with
//! `.catch <class|any> from <label> to <label> using <label>`.

use super::{
    CallSite, Code, CompareMode, Constant, EqComparison, ExceptionHandler, FieldRef, InsnIndex,
    Instruction, InvokeType, Method, MethodRef, OrdComparison, ShiftType,
};
use crate::jvm::{
    BaseType, BinaryName, Error, FieldType, MethodAccessFlags, MethodDescriptor, Name,
    ParseDescriptor, RefType, RenderDescriptor, UnqualifiedName,
};
use std::collections::HashMap;

/// Parse every `.method` in a listing
pub fn parse_listing(source: &str) -> Result<Vec<Method>, Error> {
    let mut methods = vec![];
    let mut class_name = BinaryName::from_string(String::from("Main")).map_err(Error::BadName)?;
    let mut current: Option<MethodText> = None;

    for (line_idx, raw_line) in source.lines().enumerate() {
        let line = line_idx + 1;
        let tokens = tokenize(raw_line).map_err(|message| Error::MalformedListing { line, message })?;
        let first = match tokens.first() {
            None => continue,
            Some(Token::Word(word)) => word.as_str(),
            Some(Token::Str(_)) => return Err(malformed(line, "Line starts with a string")),
        };

        match (first, current.as_mut()) {
            (".class", None) => {
                let name = word_at(&tokens, 1, line)?;
                class_name = BinaryName::from_string(name.to_owned()).map_err(Error::BadName)?;
            }
            (".method", None) => {
                current = Some(MethodText::header(&tokens[1..], line)?);
            }
            (".end", Some(_)) => {
                if let Some(text) = current.take() {
                    methods.push(text.finish(class_name.clone())?);
                }
            }
            (".class" | ".method", Some(_)) => {
                return Err(malformed(line, "Missing `.end method` before this line"));
            }
            (_, None) => {
                return Err(malformed(line, "Instruction outside of a `.method`"));
            }
            (_, Some(text)) => text.lines.push((line, tokens)),
        }
    }

    if current.is_some() {
        return Err(malformed(source.lines().count(), "Unterminated `.method`"));
    }
    Ok(methods)
}

/// Method whose body lines have been collected but not yet resolved
struct MethodText {
    name: UnqualifiedName,
    descriptor: MethodDescriptor,
    access_flags: MethodAccessFlags,
    lines: Vec<(usize, Vec<Token>)>,
}

impl MethodText {
    fn header(tokens: &[Token], line: usize) -> Result<MethodText, Error> {
        let mut access_flags = MethodAccessFlags::empty();
        let mut signature = None;
        for token in tokens {
            let word = match token {
                Token::Word(word) => word.as_str(),
                Token::Str(_) => return Err(malformed(line, "Unexpected string in `.method`")),
            };
            match MethodAccessFlags::from_keyword(word) {
                Some(flag) => access_flags |= flag,
                None if signature.is_none() => signature = Some(word),
                None => return Err(malformed(line, "Unexpected token in `.method`")),
            }
        }
        let signature = signature.ok_or_else(|| malformed(line, "Missing method signature"))?;
        let paren = signature
            .find('(')
            .ok_or_else(|| malformed(line, "Method signature has no descriptor"))?;
        let name = UnqualifiedName::from_string(signature[..paren].to_owned()).map_err(Error::BadName)?;
        let descriptor = MethodDescriptor::parse(&signature[paren..])
            .map_err(|err| Error::BadDescriptor(err.to_string()))?;

        Ok(MethodText {
            name,
            descriptor,
            access_flags,
            lines: vec![],
        })
    }

    fn finish(self, owner: BinaryName) -> Result<Method, Error> {
        // First pass: place labels
        let mut labels: HashMap<&str, InsnIndex> = HashMap::new();
        let mut count = 0;
        for (_, tokens) in &self.lines {
            match tokens.first() {
                Some(Token::Word(word)) if word.ends_with(':') => {
                    labels.insert(&word[..word.len() - 1], count);
                    if tokens.len() > 1 {
                        count += 1;
                    }
                }
                Some(Token::Word(word)) if word.starts_with('.') => (),
                _ => count += 1,
            }
        }

        // Second pass: resolve instructions and directives
        let mut instructions = vec![];
        let mut handlers = vec![];
        let mut max_stack = None;
        let mut max_locals = None;
        for (line, tokens) in &self.lines {
            let line = *line;
            let mut tokens = tokens.as_slice();
            if let Some(Token::Word(word)) = tokens.first() {
                if word.ends_with(':') {
                    tokens = &tokens[1..];
                }
            }
            let resolver = Resolver {
                labels: &labels,
                line,
            };
            match tokens.first() {
                None => continue,
                Some(Token::Word(word)) if word == ".limit" => {
                    let value: u16 = resolver.number(tokens, 2)?;
                    match word_at(tokens, 1, line)? {
                        "stack" => max_stack = Some(value),
                        "locals" => max_locals = Some(value),
                        _ => return Err(malformed(line, "Expected `.limit stack` or `.limit locals`")),
                    }
                }
                Some(Token::Word(word)) if word == ".catch" => {
                    handlers.push(resolver.catch(tokens)?);
                }
                Some(Token::Word(word)) if word.starts_with('.') => {
                    return Err(malformed(line, &format!("Unknown directive `{}`", word)));
                }
                Some(_) => instructions.push(resolver.instruction(tokens)?),
            }
        }

        let code = Code::with_handlers(instructions, handlers);
        code.check_targets()?;
        let mut method = Method::new(owner, self.name, self.descriptor, self.access_flags, code);
        method.max_stack = max_stack;
        method.max_locals = max_locals;
        Ok(method)
    }
}

struct Resolver<'a> {
    labels: &'a HashMap<&'a str, InsnIndex>,
    line: usize,
}

impl<'a> Resolver<'a> {
    fn word<'t>(&self, tokens: &'t [Token], idx: usize) -> Result<&'t str, Error> {
        word_at(tokens, idx, self.line)
    }

    fn number<T: std::str::FromStr>(&self, tokens: &[Token], idx: usize) -> Result<T, Error> {
        let word = self.word(tokens, idx)?;
        word.parse()
            .map_err(|_| malformed(self.line, &format!("Expected a number, found `{}`", word)))
    }

    fn label(&self, name: &str) -> Result<InsnIndex, Error> {
        if let Some(index) = name.strip_prefix('@') {
            return index
                .parse()
                .map_err(|_| malformed(self.line, &format!("Bad instruction index `{}`", name)));
        }
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| Error::UndefinedLabel {
                line: self.line,
                label: name.to_owned(),
            })
    }

    fn label_at(&self, tokens: &[Token], idx: usize) -> Result<InsnIndex, Error> {
        self.label(self.word(tokens, idx)?)
    }

    fn catch(&self, tokens: &[Token]) -> Result<ExceptionHandler, Error> {
        let expect = |idx: usize, keyword: &str| -> Result<(), Error> {
            if self.word(tokens, idx)? == keyword {
                Ok(())
            } else {
                Err(malformed(self.line, &format!("Expected `{}` in `.catch`", keyword)))
            }
        };
        expect(2, "from")?;
        expect(4, "to")?;
        expect(6, "using")?;
        let catch_type = match self.word(tokens, 1)? {
            "any" => None,
            name => Some(BinaryName::from_string(name.to_owned()).map_err(Error::BadName)?),
        };
        Ok(ExceptionHandler {
            start: self.label_at(tokens, 3)?,
            end: self.label_at(tokens, 5)?,
            handler: self.label_at(tokens, 7)?,
            catch_type,
        })
    }

    fn instruction(&self, tokens: &[Token]) -> Result<Instruction, Error> {
        use Instruction::*;

        let mnemonic = self.word(tokens, 0)?;
        if let Some(insn) = simple_instruction(mnemonic) {
            return Ok(insn);
        }
        if let Some(insn) = short_local_instruction(mnemonic) {
            return Ok(insn);
        }

        let insn = match mnemonic {
            "bipush" => BiPush(self.number(tokens, 1)?),
            "sipush" => SiPush(self.number(tokens, 1)?),
            "ldc" | "ldc_w" | "ldc2_w" => Ldc(self.constant(&tokens[1..])?),
            "iload" => ILoad(self.number(tokens, 1)?),
            "lload" => LLoad(self.number(tokens, 1)?),
            "fload" => FLoad(self.number(tokens, 1)?),
            "dload" => DLoad(self.number(tokens, 1)?),
            "aload" => ALoad(self.number(tokens, 1)?),
            "istore" => IStore(self.number(tokens, 1)?),
            "lstore" => LStore(self.number(tokens, 1)?),
            "fstore" => FStore(self.number(tokens, 1)?),
            "dstore" => DStore(self.number(tokens, 1)?),
            "astore" => AStore(self.number(tokens, 1)?),
            "ret" => Ret(self.number(tokens, 1)?),
            "iinc" => IInc(self.number(tokens, 1)?, self.number(tokens, 2)?),
            "goto" | "goto_w" => Goto(self.label_at(tokens, 1)?),
            "jsr" | "jsr_w" => Jsr(self.label_at(tokens, 1)?),
            "ifnull" => IfNull(EqComparison::EQ, self.label_at(tokens, 1)?),
            "ifnonnull" => IfNull(EqComparison::NE, self.label_at(tokens, 1)?),
            "if_acmpeq" => IfACmp(EqComparison::EQ, self.label_at(tokens, 1)?),
            "if_acmpne" => IfACmp(EqComparison::NE, self.label_at(tokens, 1)?),
            "tableswitch" => {
                let low = self.number(tokens, 1)?;
                let (targets, default) = self.switch_targets(&tokens[2..], |t| self.label(t))?;
                TableSwitch {
                    default,
                    low,
                    targets,
                }
            }
            "lookupswitch" => {
                let (targets, default) = self.switch_targets(&tokens[1..], |t| {
                    let (key, label) = t
                        .split_once(':')
                        .ok_or_else(|| malformed(self.line, "Expected `key:label`"))?;
                    let key = key
                        .parse::<i32>()
                        .map_err(|_| malformed(self.line, &format!("Bad key `{}`", key)))?;
                    Ok((key, self.label(label)?))
                })?;
                LookupSwitch { default, targets }
            }
            "getstatic" => GetStatic(self.field(tokens)?),
            "putstatic" => PutStatic(self.field(tokens)?),
            "getfield" => GetField(self.field(tokens)?),
            "putfield" => PutField(self.field(tokens)?),
            "invokevirtual" => Invoke(InvokeType::Virtual, self.method(tokens)?),
            "invokespecial" => Invoke(InvokeType::Special, self.method(tokens)?),
            "invokestatic" => Invoke(InvokeType::Static, self.method(tokens)?),
            "invokeinterface" => Invoke(InvokeType::Interface, self.method(tokens)?),
            "invokedynamic" => {
                let (name, descriptor) = self.signature(self.word(tokens, 1)?)?;
                InvokeDynamic(CallSite { name, descriptor })
            }
            "new" => New(BinaryName::from_string(self.word(tokens, 1)?.to_owned()).map_err(Error::BadName)?),
            "newarray" => {
                let keyword = self.word(tokens, 1)?;
                NewArray(BaseType::from_keyword(keyword).ok_or_else(|| {
                    malformed(self.line, &format!("Unknown primitive type `{}`", keyword))
                })?)
            }
            "anewarray" => ANewArray(self.class(tokens, 1)?),
            "checkcast" => CheckCast(self.class(tokens, 1)?),
            "instanceof" => InstanceOf(self.class(tokens, 1)?),
            "multianewarray" => MultiANewArray(self.class(tokens, 1)?, self.number(tokens, 2)?),
            other => {
                if let Some(insn) = self.conditional(other, tokens)? {
                    insn
                } else {
                    return Err(malformed(self.line, &format!("Unknown instruction `{}`", other)));
                }
            }
        };
        Ok(insn)
    }

    fn conditional(&self, mnemonic: &str, tokens: &[Token]) -> Result<Option<Instruction>, Error> {
        let (two_operands, suffix) = if let Some(suffix) = mnemonic.strip_prefix("if_icmp") {
            (true, suffix)
        } else if let Some(suffix) = mnemonic.strip_prefix("if") {
            (false, suffix)
        } else {
            return Ok(None);
        };
        let comparison = match suffix {
            "eq" => OrdComparison::EQ,
            "ne" => OrdComparison::NE,
            "lt" => OrdComparison::LT,
            "ge" => OrdComparison::GE,
            "gt" => OrdComparison::GT,
            "le" => OrdComparison::LE,
            _ => return Ok(None),
        };
        let target = self.label_at(tokens, 1)?;
        Ok(Some(if two_operands {
            Instruction::IfICmp(comparison, target)
        } else {
            Instruction::If(comparison, target)
        }))
    }

    fn switch_targets<T>(
        &self,
        tokens: &[Token],
        parse_target: impl Fn(&str) -> Result<T, Error>,
    ) -> Result<(Vec<T>, InsnIndex), Error> {
        let mut targets = vec![];
        let mut idx = 0;
        loop {
            match self.word(tokens, idx)? {
                "default" | "default:" => {
                    let default = self.label_at(tokens, idx + 1)?;
                    return Ok((targets, default));
                }
                other => targets.push(parse_target(other)?),
            }
            idx += 1;
        }
    }

    fn class(&self, tokens: &[Token], idx: usize) -> Result<RefType, Error> {
        RefType::parse_class_operand(self.word(tokens, idx)?)
            .map_err(|err| Error::BadDescriptor(err.to_string()))
    }

    /// Split `owner.member` at the last dot
    fn member(&self, qualified: &str) -> Result<(BinaryName, UnqualifiedName), Error> {
        let (owner, name) = qualified
            .rsplit_once('.')
            .ok_or_else(|| malformed(self.line, "Expected `owner.member`"))?;
        Ok((
            BinaryName::from_string(owner.to_owned()).map_err(Error::BadName)?,
            UnqualifiedName::from_string(name.to_owned()).map_err(Error::BadName)?,
        ))
    }

    /// Split `name(descriptor)return`
    fn signature(&self, signature: &str) -> Result<(UnqualifiedName, MethodDescriptor), Error> {
        let paren = signature
            .find('(')
            .ok_or_else(|| malformed(self.line, "Expected a method descriptor"))?;
        let name = UnqualifiedName::from_string(signature[..paren].to_owned()).map_err(Error::BadName)?;
        let descriptor = MethodDescriptor::parse(&signature[paren..])
            .map_err(|err| Error::BadDescriptor(err.to_string()))?;
        Ok((name, descriptor))
    }

    fn method(&self, tokens: &[Token]) -> Result<MethodRef, Error> {
        let operand = self.word(tokens, 1)?;
        let paren = operand
            .find('(')
            .ok_or_else(|| malformed(self.line, "Expected a method descriptor"))?;
        let (owner, name) = self.member(&operand[..paren])?;
        let descriptor = MethodDescriptor::parse(&operand[paren..])
            .map_err(|err| Error::BadDescriptor(err.to_string()))?;
        Ok(MethodRef {
            owner,
            name,
            descriptor,
        })
    }

    fn field(&self, tokens: &[Token]) -> Result<FieldRef, Error> {
        let (owner, name) = self.member(self.word(tokens, 1)?)?;
        let descriptor = FieldType::parse(self.word(tokens, 2)?)
            .map_err(|err| Error::BadDescriptor(err.to_string()))?;
        let constant_value = match tokens.get(3) {
            None => None,
            Some(Token::Word(eq)) if eq == "=" => Some(self.constant(&tokens[4..])?),
            Some(_) => return Err(malformed(self.line, "Expected `= <constant>` after field")),
        };
        Ok(FieldRef {
            owner,
            name,
            descriptor,
            constant_value,
        })
    }

    fn constant(&self, tokens: &[Token]) -> Result<Constant, Error> {
        match tokens {
            [Token::Str(string)] => Ok(Constant::String(string.clone())),
            [Token::Word(class), Token::Word(name)] if class == "class" => {
                RefType::parse_class_operand(name)
                    .map(Constant::Class)
                    .map_err(|err| Error::BadDescriptor(err.to_string()))
            }
            [Token::Word(number)] => parse_number(number)
                .ok_or_else(|| malformed(self.line, &format!("Bad constant `{}`", number))),
            _ => Err(malformed(self.line, "Expected a constant")),
        }
    }
}

fn parse_number(word: &str) -> Option<Constant> {
    let lower = word.to_ascii_lowercase();
    if let Some(long) = lower.strip_suffix('l') {
        long.parse().ok().map(Constant::Long)
    } else if let Some(float) = lower.strip_suffix('f') {
        float.parse().ok().map(Constant::Float)
    } else if let Some(double) = lower.strip_suffix('d') {
        double.parse().ok().map(Constant::Double)
    } else if lower.contains(&['.', 'e'][..]) {
        lower.parse().ok().map(Constant::Double)
    } else {
        lower.parse().ok().map(Constant::Integer)
    }
}

fn malformed(line: usize, message: &str) -> Error {
    Error::MalformedListing {
        line,
        message: message.to_owned(),
    }
}

fn word_at(tokens: &[Token], idx: usize, line: usize) -> Result<&str, Error> {
    match tokens.get(idx) {
        Some(Token::Word(word)) => Ok(word),
        Some(Token::Str(_)) => Err(malformed(line, "Unexpected string operand")),
        None => Err(malformed(line, "Missing operand")),
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Word(String),
    Str(String),
}

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = vec![];
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '#' {
            break;
        } else if c == '"' {
            chars.next();
            let mut string = String::new();
            loop {
                match chars.next() {
                    None => return Err(String::from("Unterminated string")),
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => string.push('\n'),
                        Some('t') => string.push('\t'),
                        Some('"') => string.push('"'),
                        Some('\\') => string.push('\\'),
                        Some(other) => return Err(format!("Unknown escape `\\{}`", other)),
                        None => return Err(String::from("Unterminated string")),
                    },
                    Some(other) => string.push(other),
                }
            }
            tokens.push(Token::Str(string));
        } else {
            let mut word = String::new();
            while let Some(c) = chars.next_if(|c| !c.is_whitespace() && *c != '#') {
                word.push(c);
            }
            tokens.push(Token::Word(word));
        }
    }
    Ok(tokens)
}

/// `iload_0` style shorthands
fn short_local_instruction(mnemonic: &str) -> Option<Instruction> {
    use Instruction::*;
    let (op, slot) = mnemonic.rsplit_once('_')?;
    let slot: u16 = match slot {
        "0" => 0,
        "1" => 1,
        "2" => 2,
        "3" => 3,
        _ => return None,
    };
    let insn = match op {
        "iload" => ILoad(slot),
        "lload" => LLoad(slot),
        "fload" => FLoad(slot),
        "dload" => DLoad(slot),
        "aload" => ALoad(slot),
        "istore" => IStore(slot),
        "lstore" => LStore(slot),
        "fstore" => FStore(slot),
        "dstore" => DStore(slot),
        "astore" => AStore(slot),
        _ => return None,
    };
    Some(insn)
}

/// Instructions without any operands
fn simple_instructions() -> Vec<(&'static str, Instruction)> {
    use Instruction::*;
    vec![
        ("nop", Nop),
        ("aconst_null", AConstNull),
        ("iconst_m1", IConstM1),
        ("iconst_0", IConst0),
        ("iconst_1", IConst1),
        ("iconst_2", IConst2),
        ("iconst_3", IConst3),
        ("iconst_4", IConst4),
        ("iconst_5", IConst5),
        ("lconst_0", LConst0),
        ("lconst_1", LConst1),
        ("fconst_0", FConst0),
        ("fconst_1", FConst1),
        ("fconst_2", FConst2),
        ("dconst_0", DConst0),
        ("dconst_1", DConst1),
        ("iaload", IALoad),
        ("laload", LALoad),
        ("faload", FALoad),
        ("daload", DALoad),
        ("aaload", AALoad),
        ("baload", BALoad),
        ("caload", CALoad),
        ("saload", SALoad),
        ("iastore", IAStore),
        ("lastore", LAStore),
        ("fastore", FAStore),
        ("dastore", DAStore),
        ("aastore", AAStore),
        ("bastore", BAStore),
        ("castore", CAStore),
        ("sastore", SAStore),
        ("pop", Pop),
        ("pop2", Pop2),
        ("dup", Dup),
        ("dup_x1", DupX1),
        ("dup_x2", DupX2),
        ("dup2", Dup2),
        ("dup2_x1", Dup2X1),
        ("dup2_x2", Dup2X2),
        ("swap", Swap),
        ("iadd", IAdd),
        ("ladd", LAdd),
        ("fadd", FAdd),
        ("dadd", DAdd),
        ("isub", ISub),
        ("lsub", LSub),
        ("fsub", FSub),
        ("dsub", DSub),
        ("imul", IMul),
        ("lmul", LMul),
        ("fmul", FMul),
        ("dmul", DMul),
        ("idiv", IDiv),
        ("ldiv", LDiv),
        ("fdiv", FDiv),
        ("ddiv", DDiv),
        ("irem", IRem),
        ("lrem", LRem),
        ("frem", FRem),
        ("drem", DRem),
        ("ineg", INeg),
        ("lneg", LNeg),
        ("fneg", FNeg),
        ("dneg", DNeg),
        ("ishl", ISh(ShiftType::Left)),
        ("ishr", ISh(ShiftType::ArithmeticRight)),
        ("iushr", ISh(ShiftType::LogicalRight)),
        ("lshl", LSh(ShiftType::Left)),
        ("lshr", LSh(ShiftType::ArithmeticRight)),
        ("lushr", LSh(ShiftType::LogicalRight)),
        ("iand", IAnd),
        ("land", LAnd),
        ("ior", IOr),
        ("lor", LOr),
        ("ixor", IXor),
        ("lxor", LXor),
        ("i2l", I2L),
        ("i2f", I2F),
        ("i2d", I2D),
        ("l2i", L2I),
        ("l2f", L2F),
        ("l2d", L2D),
        ("f2i", F2I),
        ("f2l", F2L),
        ("f2d", F2D),
        ("d2i", D2I),
        ("d2l", D2L),
        ("d2f", D2F),
        ("i2b", I2B),
        ("i2c", I2C),
        ("i2s", I2S),
        ("lcmp", LCmp),
        ("fcmpl", FCmp(CompareMode::L)),
        ("fcmpg", FCmp(CompareMode::G)),
        ("dcmpl", DCmp(CompareMode::L)),
        ("dcmpg", DCmp(CompareMode::G)),
        ("ireturn", IReturn),
        ("lreturn", LReturn),
        ("freturn", FReturn),
        ("dreturn", DReturn),
        ("areturn", AReturn),
        ("return", Return),
        ("arraylength", ArrayLength),
        ("athrow", AThrow),
        ("monitorenter", MonitorEnter),
        ("monitorexit", MonitorExit),
    ]
}

fn simple_instruction(mnemonic: &str) -> Option<Instruction> {
    simple_instructions()
        .into_iter()
        .find(|(name, _)| *name == mnemonic)
        .map(|(_, insn)| insn)
}

/// Render an instruction back into listing syntax (jump targets as `@index`)
pub fn render_instruction(insn: &Instruction) -> String {
    use Instruction::*;

    if let Some((name, _)) = simple_instructions().iter().find(|(_, i)| i == insn) {
        return String::from(*name);
    }
    let field = |field: &FieldRef| {
        format!(
            "{}.{} {}",
            field.owner.as_str(),
            field.name.as_str(),
            field.descriptor.render()
        )
    };
    let method = |method: &MethodRef| {
        format!(
            "{}.{}{}",
            method.owner.as_str(),
            method.name.as_str(),
            method.descriptor.render()
        )
    };
    let class = |ref_type: &RefType| match ref_type {
        RefType::Object(name) => String::from(name.as_str()),
        array => array.render(),
    };
    let ord = |cmp: &OrdComparison| match cmp {
        OrdComparison::EQ => "eq",
        OrdComparison::NE => "ne",
        OrdComparison::LT => "lt",
        OrdComparison::GE => "ge",
        OrdComparison::GT => "gt",
        OrdComparison::LE => "le",
    };

    match insn {
        BiPush(n) => format!("bipush {}", n),
        SiPush(n) => format!("sipush {}", n),
        Ldc(constant) => format!("ldc {}", render_constant(constant)),
        ILoad(n) => format!("iload {}", n),
        LLoad(n) => format!("lload {}", n),
        FLoad(n) => format!("fload {}", n),
        DLoad(n) => format!("dload {}", n),
        ALoad(n) => format!("aload {}", n),
        IStore(n) => format!("istore {}", n),
        LStore(n) => format!("lstore {}", n),
        FStore(n) => format!("fstore {}", n),
        DStore(n) => format!("dstore {}", n),
        AStore(n) => format!("astore {}", n),
        IInc(n, by) => format!("iinc {} {}", n, by),
        If(cmp, target) => format!("if{} @{}", ord(cmp), target),
        IfICmp(cmp, target) => format!("if_icmp{} @{}", ord(cmp), target),
        IfACmp(EqComparison::EQ, target) => format!("if_acmpeq @{}", target),
        IfACmp(EqComparison::NE, target) => format!("if_acmpne @{}", target),
        IfNull(EqComparison::EQ, target) => format!("ifnull @{}", target),
        IfNull(EqComparison::NE, target) => format!("ifnonnull @{}", target),
        Goto(target) => format!("goto @{}", target),
        Jsr(target) => format!("jsr @{}", target),
        Ret(n) => format!("ret {}", n),
        TableSwitch {
            default,
            low,
            targets,
        } => {
            let targets: Vec<String> = targets.iter().map(|t| format!("@{}", t)).collect();
            format!("tableswitch {} {} default @{}", low, targets.join(" "), default)
        }
        LookupSwitch { default, targets } => {
            let targets: Vec<String> = targets.iter().map(|(k, t)| format!("{}:@{}", k, t)).collect();
            format!("lookupswitch {} default @{}", targets.join(" "), default)
        }
        GetStatic(f) => format!("getstatic {}", field(f)),
        PutStatic(f) => format!("putstatic {}", field(f)),
        GetField(f) => format!("getfield {}", field(f)),
        PutField(f) => format!("putfield {}", field(f)),
        Invoke(InvokeType::Virtual, m) => format!("invokevirtual {}", method(m)),
        Invoke(InvokeType::Special, m) => format!("invokespecial {}", method(m)),
        Invoke(InvokeType::Static, m) => format!("invokestatic {}", method(m)),
        Invoke(InvokeType::Interface, m) => format!("invokeinterface {}", method(m)),
        InvokeDynamic(site) => format!(
            "invokedynamic {}{}",
            site.name.as_str(),
            site.descriptor.render()
        ),
        New(name) => format!("new {}", name.as_str()),
        NewArray(base) => format!("newarray {}", base.keyword()),
        ANewArray(t) => format!("anewarray {}", class(t)),
        CheckCast(t) => format!("checkcast {}", class(t)),
        InstanceOf(t) => format!("instanceof {}", class(t)),
        MultiANewArray(t, dims) => format!("multianewarray {} {}", class(t), dims),
        other => format!("{:?}", other),
    }
}

fn render_constant(constant: &Constant) -> String {
    match constant {
        Constant::Integer(i) => i.to_string(),
        Constant::Long(l) => format!("{}L", l),
        Constant::Float(f) => format!("{:?}f", f),
        Constant::Double(d) => format!("{:?}d", d),
        Constant::String(s) => format!("{:?}", s),
        Constant::Class(t) => format!("class {}", t.render()),
        Constant::MethodType(descriptor) => format!("methodtype {}", descriptor.render()),
        Constant::MethodHandle => String::from("methodhandle"),
    }
}

#[cfg(test)]
mod test {
    use super::Instruction::*;
    use super::*;

    const SAMPLE: &str = r#"
.class me/alec/Sample

# counts down to zero
.method public static countdown(I)I
.limit stack 2
.limit locals 1
top:
    iload_0
    ifle done
    iinc 0 -1
    goto top
done:
    iload 0
    ireturn
.end method

.method greet()Ljava/lang/String;
start:
    ldc "hi \"there\"" # trailing comment
    areturn
handler:
    pop
    aconst_null
    areturn
.catch any from start to handler using handler
.end method
"#;

    #[test]
    fn parse_sample() {
        let methods = parse_listing(SAMPLE).unwrap();
        assert_eq!(methods.len(), 2);

        let countdown = &methods[0];
        assert_eq!(countdown.owner.as_str(), "me/alec/Sample");
        assert_eq!(countdown.name.as_str(), "countdown");
        assert!(countdown.is_static());
        assert_eq!(countdown.max_stack, Some(2));
        assert_eq!(countdown.code.get(1), Some(&If(OrdComparison::LE, 4)));
        assert_eq!(countdown.code.get(2), Some(&IInc(0, -1)));
        assert_eq!(countdown.code.get(3), Some(&Goto(0)));

        let greet = &methods[1];
        assert!(!greet.is_static());
        assert_eq!(
            greet.code.get(0),
            Some(&Ldc(Constant::String(String::from("hi \"there\""))))
        );
        assert_eq!(
            greet.code.handlers,
            vec![ExceptionHandler {
                start: 0,
                end: 2,
                handler: 2,
                catch_type: None
            }]
        );
    }

    #[test]
    fn operands() {
        let source = r#"
.method static f()V
    ldc 10L
    ldc 1.5f
    ldc 2.5
    ldc class [I
    getstatic me/Consts.SIZE I = 12
    invokevirtual java/lang/StringBuilder.append(I)Ljava/lang/StringBuilder;
    tableswitch 3 a b default a
a:  lookupswitch 1:a 7:b default: b
b:  multianewarray [[I 2
    return
.end method
"#;
        let methods = parse_listing(source).unwrap();
        let code = &methods[0].code;
        assert_eq!(code.get(0), Some(&Ldc(Constant::Long(10))));
        assert_eq!(code.get(1), Some(&Ldc(Constant::Float(1.5))));
        assert_eq!(code.get(2), Some(&Ldc(Constant::Double(2.5))));
        match code.get(4) {
            Some(GetStatic(field)) => {
                assert_eq!(field.constant_value, Some(Constant::Integer(12)));
            }
            other => panic!("Unexpected {:?}", other),
        }
        assert_eq!(
            code.get(6),
            Some(&TableSwitch {
                default: 7,
                low: 3,
                targets: vec![7, 8]
            })
        );
        assert_eq!(
            code.get(7),
            Some(&LookupSwitch {
                default: 8,
                targets: vec![(1, 7), (7, 8)]
            })
        );
    }

    #[test]
    fn errors_carry_line_numbers() {
        let unknown = ".method static f()V\n    frobnicate\n.end method\n";
        assert!(matches!(
            parse_listing(unknown),
            Err(Error::MalformedListing { line: 2, .. })
        ));

        let missing_label = ".method static f()V\n    goto nowhere\n.end method\n";
        assert!(matches!(
            parse_listing(missing_label),
            Err(Error::UndefinedLabel { line: 2, .. })
        ));

        let unterminated = ".method static f()V\n    return\n";
        assert!(parse_listing(unterminated).is_err());
    }

    #[test]
    fn render_round_trips() {
        let source = ".method static f(I)I\n    iload_0\n    ifnonnull @3\n    iinc 0 2\n    invokestatic java/lang/Math.abs(I)I\n    ireturn\n.end method\n";
        let methods = parse_listing(source).unwrap();
        let rendered: Vec<String> = methods[0].code.iter().map(|(_, i)| render_instruction(i)).collect();
        assert_eq!(
            rendered,
            vec![
                "iload 0",
                "ifnonnull @3",
                "iinc 0 2",
                "invokestatic java/lang/Math.abs(I)I",
                "ireturn"
            ]
        );
    }
}
