//! Failure signals for precondition violations.

/// Errors reported by fallible handle operations.
///
/// All of these are programmer errors rather than runtime races. A weak
/// handle whose payload is gone is not an error for [`Weak::lock`](crate::Weak::lock),
/// which returns an empty handle instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// The handle is empty, so there is nothing to dereference.
    Empty,
    /// A null pointer was passed where an owned allocation was expected.
    NullPointer,
    /// The payload asked for a handle to itself before any `Shared` adopted it.
    SelfUninitialized,
    /// The payload has already been destroyed.
    Expired,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "null dereference of an empty Shared handle"),
            Self::NullPointer => write!(f, "cannot adopt a null pointer"),
            Self::SelfUninitialized => write!(
                f,
                "uninitialized self-reference: the value has not been adopted by a Shared handle"
            ),
            Self::Expired => write!(f, "the shared value has already been destroyed"),
        }
    }
}

impl std::error::Error for Error {}
