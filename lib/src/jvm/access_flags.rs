use bitflags::bitflags;

bitflags! {
    /// Access flags on methods
    ///
    /// Only `STATIC` changes how a method is simulated (no `this` in local 0), the rest are carried
    /// along for consumers and for printing.
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6-200-A.1
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

impl MethodAccessFlags {
    /// Look up the flag corresponding to a Java-source style modifier keyword
    pub fn from_keyword(keyword: &str) -> Option<MethodAccessFlags> {
        let flag = match keyword {
            "public" => MethodAccessFlags::PUBLIC,
            "private" => MethodAccessFlags::PRIVATE,
            "protected" => MethodAccessFlags::PROTECTED,
            "static" => MethodAccessFlags::STATIC,
            "final" => MethodAccessFlags::FINAL,
            "synchronized" => MethodAccessFlags::SYNCHRONIZED,
            "bridge" => MethodAccessFlags::BRIDGE,
            "varargs" => MethodAccessFlags::VARARGS,
            "native" => MethodAccessFlags::NATIVE,
            "abstract" => MethodAccessFlags::ABSTRACT,
            "strictfp" => MethodAccessFlags::STRICT,
            "synthetic" => MethodAccessFlags::SYNTHETIC,
            _ => return None,
        };
        Some(flag)
    }

    /// Modifier keywords, in the order `javap` prints them
    pub fn keywords(&self) -> Vec<&'static str> {
        const ORDERED: [(MethodAccessFlags, &str); 7] = [
            (MethodAccessFlags::PUBLIC, "public"),
            (MethodAccessFlags::PRIVATE, "private"),
            (MethodAccessFlags::PROTECTED, "protected"),
            (MethodAccessFlags::STATIC, "static"),
            (MethodAccessFlags::FINAL, "final"),
            (MethodAccessFlags::SYNCHRONIZED, "synchronized"),
            (MethodAccessFlags::NATIVE, "native"),
        ];
        ORDERED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, keyword)| *keyword)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keywords_round_trip() {
        let flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
        let parsed = flags
            .keywords()
            .into_iter()
            .map(|k| MethodAccessFlags::from_keyword(k).unwrap())
            .fold(MethodAccessFlags::empty(), |acc, f| acc | f);
        assert_eq!(parsed, flags);
        assert_eq!(MethodAccessFlags::from_keyword("volatile"), None);
    }
}
