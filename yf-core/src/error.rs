//! Error taxonomy shared by every subsystem of the command buffer pipeline.

use std::fmt;

/// The kind of failure that occurred.
///
/// Carried as a typed `Result` instead of a thread-local "last error"
/// variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// An argument was out of range, malformed, or not valid for the
    /// current command buffer kind.
    InvalidArgument,
    /// A command was issued without its required predecessors, or a
    /// deferred clear was left pending with nothing to apply it to.
    InvalidCommand,
    /// A device- or pass-reported limit was exceeded.
    Limit,
    /// A host or device allocation failed.
    NoMemory,
    /// An underlying GPU call returned a non-success status.
    DeviceGeneric,
    /// A pool, queue, or decoder slot was already occupied.
    InUse,
    /// An execution queue is at capacity.
    QueueFull,
    /// The requested resource could not be found.
    NotFound,
    /// The requested operation is not supported by this context.
    Unsupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::InvalidCommand => "invalid command",
            ErrorKind::Limit => "limit exceeded",
            ErrorKind::NoMemory => "out of memory",
            ErrorKind::DeviceGeneric => "device error",
            ErrorKind::InUse => "resource in use",
            ErrorKind::QueueFull => "queue full",
            ErrorKind::NotFound => "not found",
            ErrorKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// An error produced by the command buffer subsystem.
///
/// Carries an [`ErrorKind`] plus the name of the call site that raised it,
/// in the spirit of the original's `yf_seterr(code, __func__)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    context: &'static str,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, context: &'static str) -> Self {
        Error { kind, context }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.kind)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

macro_rules! err {
    ($kind:ident) => {
        $crate::error::Error::new($crate::error::ErrorKind::$kind, yf_func!())
    };
}

macro_rules! bail {
    ($kind:ident) => {
        return Err(err!($kind))
    };
}

/// Expands to the enclosing function's name, used as error context the same
/// way the original passes `__func__` to `yf_seterr`.
macro_rules! yf_func {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

pub(crate) use bail;
pub(crate) use err;
pub(crate) use yf_func;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_combines_call_site_and_kind() {
        let e = Error::new(ErrorKind::QueueFull, "ExecQueue::enqueue");
        assert_eq!(e.to_string(), "ExecQueue::enqueue: queue full");
    }

    #[test]
    fn kind_is_queryable_after_construction() {
        let e = Error::new(ErrorKind::InUse, "CommandPool::obtain");
        assert_eq!(e.kind(), ErrorKind::InUse);
    }

    #[test]
    fn err_macro_captures_enclosing_function_name() {
        fn probe() -> Error {
            err!(InvalidArgument)
        }
        let e = probe();
        assert!(e.to_string().ends_with("::probe: invalid argument"));
    }

    #[test]
    fn bail_macro_returns_early_with_err() {
        fn probe(fail: bool) -> Result<u32> {
            if fail {
                bail!(Limit);
            }
            Ok(1)
        }
        assert_eq!(probe(false).unwrap(), 1);
        assert_eq!(probe(true).unwrap_err().kind(), ErrorKind::Limit);
    }
}
