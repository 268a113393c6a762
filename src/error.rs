//! Failure taxonomy of the back end.
//!
//! Problems caused by user input never surface here: those accumulate as
//! diagnostics and compilation continues. `Error` covers the ways a build
//! actually dies — a decompiled body the generator cannot lower, a
//! violated invariant of the pipeline itself, or a failed write of the
//! finished module.

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::model::MethodReference;

#[derive(Debug)]
pub enum Error {
    /// The final write to the output sink failed.
    Io(io::Error),
    /// The decompiled input cannot be lowered: malformed trees, branches
    /// outside any loop, operations with no target form. Points at the
    /// decompiler breaching its contract, not at user code.
    Codegen { message: String },
    /// A violated invariant of the pipeline itself: colliding symbols,
    /// dispatch slots missing at a call site, record lookups for classes
    /// the layout pass never placed. Always a bug; carries a backtrace in
    /// debug builds to point at it.
    Internal {
        message: String,
        backtrace: Option<Backtrace>,
    },
}

/// Convenience result alias used across the back end.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn codegen(message: impl Into<String>) -> Self {
        Self::Codegen {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: debug_backtrace(),
        }
    }

    /// Two distinct references mangled to the same symbol.
    pub fn mangling_collision(symbol: &str) -> Self {
        Self::internal(format!(
            "mangled symbol `{symbol}` already names another function"
        ))
    }

    /// A virtual call site asked for a slot its receiver's dispatch table
    /// does not carry.
    pub fn missing_dispatch_slot(method: &MethodReference) -> Self {
        Self::internal(format!(
            "no dispatch slot resolves virtual call target `{method}`"
        ))
    }

    /// A record address was requested for a class the layout pass never
    /// placed — an unknown name, or a structure.
    pub fn unknown_class_pointer(class: &str) -> Self {
        Self::internal(format!("no class record was laid out for `{class}`"))
    }

    /// Backtrace of an invariant violation, when one was captured.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            Error::Internal { backtrace, .. } => backtrace.as_ref(),
            Error::Io(_) | Error::Codegen { .. } => None,
        }
    }
}

fn debug_backtrace() -> Option<Backtrace> {
    cfg!(debug_assertions).then(Backtrace::force_capture)
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "writing the module failed: {err}"),
            Error::Codegen { message } => write!(f, "cannot lower input: {message}"),
            Error::Internal { message, .. } => {
                write!(f, "compiler invariant violated: {message}")
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Codegen { .. } | Error::Internal { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::model::{MethodReference, MethodSignature, ValueType};

    #[test]
    fn display_names_the_failure_class() {
        assert_eq!(
            Error::codegen("break outside of any loop").to_string(),
            "cannot lower input: break outside of any loop"
        );
        assert_eq!(
            Error::unknown_class_pointer("app.Ghost").to_string(),
            "compiler invariant violated: no class record was laid out for `app.Ghost`"
        );
    }

    #[test]
    fn invariant_constructors_name_the_offender() {
        assert!(
            Error::mangling_collision("meth_app__run__x")
                .to_string()
                .contains("meth_app__run__x")
        );
        let method = MethodReference::new(
            "app.A",
            MethodSignature::new("run", Vec::new(), ValueType::Void),
        );
        assert!(
            Error::missing_dispatch_slot(&method)
                .to_string()
                .contains("app.A.run()V")
        );
    }

    #[test]
    fn only_invariant_violations_carry_backtraces() {
        assert!(Error::codegen("probe").backtrace().is_none());
        assert_eq!(
            Error::internal("probe").backtrace().is_some(),
            cfg!(debug_assertions)
        );
    }
}
