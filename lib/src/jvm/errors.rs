/// Problems with the method model itself, before any simulation happens
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Descriptor or type operand that doesn't parse
    BadDescriptor(String),

    /// Class, method, or field name that isn't valid
    BadName(String),

    /// Listing text that doesn't describe a method
    MalformedListing { line: usize, message: String },

    /// Label referenced by a branch or handler that is never placed
    UndefinedLabel { line: usize, label: String },

    /// Branch or handler target outside of the method body
    TargetOutOfBounds { index: usize, target: usize },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
