/// What to do when there is no transfer rule for an operation
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UnsupportedPolicy {
    /// Treat the affected values as unknown and keep going
    Collapse,

    /// Abort the simulation with an error
    Fail,
}

/// Knobs for a simulation
#[derive(Clone, Debug)]
pub struct Settings {
    /// Stop after this many instruction executions and report the result as incomplete
    pub max_iterations: Option<usize>,

    /// Handling of operations the interpreter doesn't model
    pub unsupported_policy: UnsupportedPolicy,

    /// Symbolically execute the whitelisted pure library methods (`StringBuilder`, boxing, etc.)
    pub simulate_pure_calls: bool,

    /// Send control from protected instructions to their exception handlers
    pub follow_exception_handlers: bool,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            max_iterations: None,
            unsupported_policy: UnsupportedPolicy::Collapse,
            simulate_pure_calls: true,
            follow_exception_handlers: true,
        }
    }

    /// Same settings, but failing on unsupported operations
    pub fn strict(mut self) -> Settings {
        self.unsupported_policy = UnsupportedPolicy::Fail;
        self
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}
