use std::borrow::Cow;
use std::fmt::{Debug, Error as FmtError, Formatter};

/// Names of methods and fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, written as `java/lang/String`
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct BinaryName(Cow<'static, str>);

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: &str) -> Result<(), String>;

    /// Extract the raw underlying string name
    fn as_str(&self) -> &str;

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: &str) -> Result<(), String> {
        if name.is_empty() {
            Err(String::from("Unqualified name is empty"))
        } else if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!("Unqualified name '{}' contains an illegal character", name))
        } else {
            Ok(())
        }
    }

    fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err(String::from("Binary name is empty"));
        }
        for segment in name.split('/') {
            UnqualifiedName::check_valid(segment)
                .map_err(|_| format!("Binary name '{}' has an invalid segment", name))?;
        }
        Ok(())
    }

    fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    const fn name(name: &'static str) -> Self {
        UnqualifiedName(Cow::Borrowed(name))
    }

    /// Is this the name of an instance initializer?
    pub fn is_init(&self) -> bool {
        self.as_str() == "<init>"
    }
}

impl BinaryName {
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
    pub const STRING_BUILDER: Self = Self::name("java/lang/StringBuilder");
    pub const STRING_BUFFER: Self = Self::name("java/lang/StringBuffer");
    pub const METHOD_TYPE: Self = Self::name("java/lang/invoke/MethodType");
    pub const METHOD_HANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const MATH: Self = Self::name("java/lang/Math");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const SHORT: Self = Self::name("java/lang/Short");
    pub const BYTE: Self = Self::name("java/lang/Byte");
    pub const CHARACTER: Self = Self::name("java/lang/Character");
    pub const BOOLEAN: Self = Self::name("java/lang/Boolean");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const DOUBLE: Self = Self::name("java/lang/Double");

    const fn name(name: &'static str) -> Self {
        BinaryName(Cow::Borrowed(name))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validation() {
        assert!(BinaryName::from_string(String::from("java/lang/String")).is_ok());
        assert!(BinaryName::from_string(String::from("java//String")).is_err());
        assert!(BinaryName::from_string(String::from("java.lang.String")).is_err());
        assert!(UnqualifiedName::from_string(String::from("<init>")).is_ok());
        assert!(UnqualifiedName::from_string(String::from("")).is_err());
        assert_eq!(BinaryName::STRING.as_str(), "java/lang/String");
    }
}
