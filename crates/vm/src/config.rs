//! VM configuration: dispatch mechanism, tiering policy, diagnostics.

/// Invocations after which a function is handed to the compiler.
pub const DEFAULT_COMPILE_THRESHOLD: u32 = 10;

/// How the interpreter selects an opcode handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A `match` on the opcode.
    Switch,
    /// A table of handler function pointers indexed by opcode byte.
    Table,
}

/// When functions are promoted to compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierPolicy {
    /// Never count invocations, never compile.
    InterpretOnly,
    /// Compile once a function has been invoked `threshold` times.
    Tiered { threshold: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    pub dispatch: Dispatch,
    pub tiering: TierPolicy,
    /// Report tiering decisions through the host.
    pub verbose: bool,
    /// Report every interpreted instruction through the host.
    pub trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            dispatch: Dispatch::Table,
            tiering: TierPolicy::Tiered {
                threshold: DEFAULT_COMPILE_THRESHOLD,
            },
            verbose: false,
            trace: false,
        }
    }
}

impl VmConfig {
    /// Interpreter-only configuration with the given dispatch.
    pub fn interpreted(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            tiering: TierPolicy::InterpretOnly,
            ..Self::default()
        }
    }

    /// Tiered configuration with a custom threshold.
    pub fn tiered(threshold: u32) -> Self {
        Self {
            tiering: TierPolicy::Tiered { threshold },
            ..Self::default()
        }
    }

    /// Map the command-line interpreter selection:
    /// 0 = switch dispatch, 1 = table dispatch, 2 = table dispatch with tiering.
    pub fn from_selection(selection: u32) -> Option<Self> {
        match selection {
            0 => Some(Self::interpreted(Dispatch::Switch)),
            1 => Some(Self::interpreted(Dispatch::Table)),
            2 => Some(Self::default()),
            _ => None,
        }
    }
}
