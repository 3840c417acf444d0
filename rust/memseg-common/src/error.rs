use thiserror::Error;

/// The error type shared by all memseg crates.
///
/// Boxed so that `Result<T>` stays one pointer wide on the happy path; the
/// payload is inspected through [`Error::kind`] or [`Error::category`].
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Coarse classification of this error, see [`ErrorCategory`].
    pub fn category(&self) -> ErrorCategory {
        self.0.category()
    }

    pub fn scope_not_alive(scope: u64) -> Error {
        ErrorKind::ScopeNotAlive { scope }.into()
    }

    pub fn wrong_thread(scope: u64) -> Error {
        ErrorKind::WrongThread { scope }.into()
    }

    pub fn wrong_owner(scope: u64) -> Error {
        ErrorKind::WrongOwner { scope }.into()
    }

    pub fn scope_acquired(scope: u64, holders: usize) -> Error {
        ErrorKind::ScopeAcquired { scope, holders }.into()
    }

    pub fn out_of_bounds(offset: u64, length: u64, size: u64) -> Error {
        ErrorKind::OutOfBounds {
            offset,
            length,
            size,
        }
        .into()
    }

    pub fn index_out_of_bounds(index: u64, bound: u64) -> Error {
        ErrorKind::IndexOutOfBounds { index, bound }.into()
    }

    pub fn misaligned(address: u64, alignment: u64) -> Error {
        ErrorKind::Misaligned { address, alignment }.into()
    }

    pub fn read_only() -> Error {
        ErrorKind::ReadOnly.into()
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
        .into()
    }

    pub fn unsupported(operation: impl Into<String>, reason: impl Into<String>) -> Error {
        ErrorKind::Unsupported {
            operation: operation.into(),
            reason: reason.into(),
        }
        .into()
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        ErrorKind::Io {
            context: context.into(),
            source,
        }
        .into()
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("scope #{scope} is no longer alive")]
    ScopeNotAlive { scope: u64 },

    #[error("scope #{scope} is not accessible by the current thread")]
    WrongThread { scope: u64 },

    #[error("scope #{scope} can only be closed by its owner thread")]
    WrongOwner { scope: u64 },

    #[error("scope #{scope} cannot be closed, it is held by {holders} keep-alive action(s)")]
    ScopeAcquired { scope: u64, holders: usize },

    #[error("out of bounds access: offset {offset}, length {length}, size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    #[error("index {index} out of bounds for length {bound}")]
    IndexOutOfBounds { index: u64, bound: u64 },

    #[error("misaligned access at address {address:#x}, expected alignment {alignment}")]
    Misaligned { address: u64, alignment: u64 },

    #[error("attempted to write to a read-only segment")]
    ReadOnly,

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("unsupported operation {operation}: {reason}")]
    Unsupported { operation: String, reason: String },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::ScopeNotAlive { .. } | ErrorKind::ScopeAcquired { .. } => {
                ErrorCategory::Lifetime
            }
            ErrorKind::WrongThread { .. } => ErrorCategory::WrongThread,
            ErrorKind::WrongOwner { .. } => ErrorCategory::WrongOwner,
            ErrorKind::OutOfBounds { .. } | ErrorKind::IndexOutOfBounds { .. } => {
                ErrorCategory::OutOfBounds
            }
            ErrorKind::Misaligned { .. } => ErrorCategory::Misaligned,
            ErrorKind::ReadOnly => ErrorCategory::ReadOnly,
            ErrorKind::InvalidArgument { .. } => ErrorCategory::InvalidArgument,
            ErrorKind::Unsupported { .. } => ErrorCategory::Unsupported,
            ErrorKind::Io { .. } => ErrorCategory::Io,
        }
    }
}

/// The failure classes a caller is expected to distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The governing scope has ended (or is held open and cannot end yet).
    Lifetime,
    /// The current thread is not permitted by the scope's confinement.
    WrongThread,
    /// Close attempted by a thread that does not own a confined arena.
    WrongOwner,
    /// Offset, length or index outside the spatial bounds.
    OutOfBounds,
    /// Address does not satisfy the required alignment.
    Misaligned,
    /// Write attempted through a read-only segment.
    ReadOnly,
    /// Malformed construction parameter or ill-formed layout path.
    InvalidArgument,
    /// Operation not defined for this segment or arena kind.
    Unsupported,
    /// The operating system refused an allocation or mapping.
    Io,
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}
