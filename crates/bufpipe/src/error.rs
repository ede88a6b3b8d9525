//! Error kinds reported at the pipe API boundary.
//!
//! End-of-stream is not an error: pops report it by returning fewer elements
//! than requested (ultimately 0).

/// Errors from creating or growing a pipe's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeError {
    /// The element type has size zero.
    ZeroSizedElement,
    /// The allocator refused a request for `requested` slots.
    AllocationFailed { requested: usize },
    /// The requested capacity does not fit in `usize`.
    CapacityOverflow,
}

impl std::fmt::Display for PipeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroSizedElement => write!(f, "pipe elements must not be zero-sized"),
            Self::AllocationFailed { requested } => {
                write!(f, "failed to allocate storage for {} elements", requested)
            }
            Self::CapacityOverflow => write!(f, "pipe capacity overflow"),
        }
    }
}

impl std::error::Error for PipeError {}

/// Errors from pushing into a pipe.
///
/// Every variant records how many leading elements of the batch were made
/// visible to consumers before the push stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// No consumer exists and none can be created any more.
    Disconnected { pushed: usize },
    /// The deadline passed while waiting for space.
    Timeout { pushed: usize },
    /// Growing the ring failed.
    Alloc { pushed: usize, source: PipeError },
}

impl PushError {
    /// Number of elements that were pushed before the error.
    pub fn pushed(&self) -> usize {
        match *self {
            Self::Disconnected { pushed }
            | Self::Timeout { pushed }
            | Self::Alloc { pushed, .. } => pushed,
        }
    }

    #[inline]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl std::fmt::Display for PushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected { pushed } => {
                write!(f, "pipe has no consumers (pushed {} elements)", pushed)
            }
            Self::Timeout { pushed } => {
                write!(f, "timed out waiting for space (pushed {} elements)", pushed)
            }
            Self::Alloc { pushed, source } => {
                write!(f, "{} (pushed {} elements)", source, pushed)
            }
        }
    }
}

impl std::error::Error for PushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Alloc { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors from the deadline-bounded pop variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// The deadline passed before the pop could complete.
    ///
    /// `popped` elements were already moved into the destination.
    Timeout { popped: usize },
}

impl PopError {
    /// Number of elements moved into the destination before the error.
    pub fn popped(&self) -> usize {
        match *self {
            Self::Timeout { popped } => popped,
        }
    }
}

impl std::fmt::Display for PopError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { popped } => {
                write!(f, "timed out waiting for data (popped {} elements)", popped)
            }
        }
    }
}

impl std::error::Error for PopError {}
