use std::error::Error as StdError;
use std::fmt::{self, Display, Write};

use thiserror::Error;

/// Renders an error value into the byte description stored in the log.
///
/// Two occurrences are the same distinct exception exactly when their
/// encodings are byte-for-byte equal, so an encoder should be deterministic
/// and leave out anything that varies per occurrence (addresses, counters).
///
/// Closures work as encoders:
///
/// ```
/// # use distinct_exception_log::encoder::{EncodeError, ExceptionEncoder};
/// let by_code = |code: &u16| -> Result<Vec<u8>, EncodeError> {
///     Ok(format!("status {code}").into_bytes())
/// };
/// assert_eq!(by_code.encode(&503u16).unwrap(), b"status 503");
/// ```
pub trait ExceptionEncoder<E: ?Sized>: Send + Sync {
    fn encode(&self, error: &E) -> Result<Vec<u8>, EncodeError>;
}

impl<E, F> ExceptionEncoder<E> for F
where
    E: ?Sized,
    F: Fn(&E) -> Result<Vec<u8>, EncodeError> + Send + Sync,
{
    #[inline]
    fn encode(&self, error: &E) -> Result<Vec<u8>, EncodeError> {
        self(error)
    }
}

/// Reasons an occurrence could not be turned into a record description.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("error value could not be formatted")]
    Format,

    #[error("error value rendered to an empty description")]
    Empty,

    #[error("encoder panicked")]
    Panicked,

    #[error("description of {0} bytes does not fit a record")]
    TooLarge(usize),
}

impl From<fmt::Error> for EncodeError {
    fn from(_: fmt::Error) -> Self {
        EncodeError::Format
    }
}

/// Encodes a [`std::error::Error`] as its message followed by its source chain.
///
/// ```text
/// connection reset
/// Caused by: broken pipe
/// Caused by: os error 32
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorChainEncoder;

impl<E> ExceptionEncoder<E> for ErrorChainEncoder
where
    E: StdError + ?Sized,
{
    fn encode(&self, error: &E) -> Result<Vec<u8>, EncodeError> {
        let mut out = String::new();
        write!(out, "{error}")?;

        let mut source = error.source();
        while let Some(cause) = source {
            write!(out, "\nCaused by: {cause}")?;
            source = cause.source();
        }

        Ok(out.into_bytes())
    }
}

/// Encodes any [`Display`] value as its display text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayEncoder;

impl<E> ExceptionEncoder<E> for DisplayEncoder
where
    E: Display + ?Sized,
{
    fn encode(&self, error: &E) -> Result<Vec<u8>, EncodeError> {
        let mut out = String::new();
        write!(out, "{error}")?;
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Leaf;

    impl Display for Leaf {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "disk full")
        }
    }

    impl StdError for Leaf {}

    #[derive(Debug)]
    struct Wrapper(Leaf);

    impl Display for Wrapper {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "checkpoint failed")
        }
    }

    impl StdError for Wrapper {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    struct Unprintable;

    impl Display for Unprintable {
        fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    #[test]
    fn test_error_chain_encoding() {
        let encoded = ErrorChainEncoder.encode(&Wrapper(Leaf)).unwrap();
        assert_eq!(encoded, b"checkpoint failed\nCaused by: disk full");
    }

    #[test]
    fn test_error_chain_encoding_of_trait_object() {
        let boxed: Box<dyn StdError + Send + Sync> = Box::new(Leaf);
        let encoded = ErrorChainEncoder.encode(boxed.as_ref()).unwrap();
        assert_eq!(encoded, b"disk full");
    }

    #[test]
    fn test_display_encoding() {
        assert_eq!(DisplayEncoder.encode("timeout").unwrap(), b"timeout");
        assert_eq!(DisplayEncoder.encode(&42i32).unwrap(), b"42");
    }

    #[test]
    fn test_format_failure_is_reported() {
        assert_eq!(DisplayEncoder.encode(&Unprintable), Err(EncodeError::Format));
    }
}
