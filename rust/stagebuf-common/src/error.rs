use thiserror::Error;

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

    pub fn allocation_failed(size: usize, alignment: usize) -> Error {
        Error(ErrorKind::AllocationFailed { size, alignment }.into())
    }

    pub fn capacity_overflow(len: usize, element_size: usize) -> Error {
        Error(ErrorKind::CapacityOverflow { len, element_size }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    /// Returns `true` if this error reports an allocator that could not satisfy
    /// a request.
    pub fn is_allocation_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::AllocationFailed { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("failed to allocate {size} bytes with alignment {alignment}")]
    AllocationFailed { size: usize, alignment: usize },

    #[error("capacity overflow: {len} elements of {element_size} bytes")]
    CapacityOverflow { len: usize, element_size: usize },

    #[error("IO error for '{context}': {source}'")]
    Io {
        context: String,
        source: std::io::Error,
    },
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
