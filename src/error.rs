use std::borrow::Cow;
use std::error;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::io;
use std::result;

/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = result::Result<T, E>;


enum ErrorImpl {
    Io(io::Error),
    InvalidDump(Cow<'static, str>),
    InvalidElf(Cow<'static, str>),
    InvalidData(Cow<'static, str>),
    InvalidInput(Cow<'static, str>),
    Context {
        context: Cow<'static, str>,
        source: Box<ErrorImpl>,
    },
}

impl ErrorImpl {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(error) => match error.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                io::ErrorKind::InvalidInput => ErrorKind::InvalidInput,
                io::ErrorKind::InvalidData => ErrorKind::InvalidData,
                _ => ErrorKind::Other,
            },
            Self::InvalidDump(..) => ErrorKind::InvalidDump,
            Self::InvalidElf(..) => ErrorKind::InvalidElf,
            Self::InvalidData(..) => ErrorKind::InvalidData,
            Self::InvalidInput(..) => ErrorKind::InvalidInput,
            Self::Context { source, .. } => source.kind(),
        }
    }
}

impl Debug for ErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Io(error) => Debug::fmt(error, f),
            Self::InvalidDump(msg)
            | Self::InvalidElf(msg)
            | Self::InvalidData(msg)
            | Self::InvalidInput(msg) => write!(f, "{}: {msg}", self.kind().as_str()),
            Self::Context { context, source } => {
                write!(f, "{context}: ")?;
                Debug::fmt(source, f)
            }
        }
    }
}

impl Display for ErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Io(error) => Display::fmt(error, f),
            Self::InvalidDump(msg)
            | Self::InvalidElf(msg)
            | Self::InvalidData(msg)
            | Self::InvalidInput(msg) => f.write_str(msg),
            Self::Context { context, source } => {
                write!(f, "{context}: ")?;
                Display::fmt(source, f)
            }
        }
    }
}

impl error::Error for ErrorImpl {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(error) => error.source(),
            Self::Context { source, .. } => Some(source),
            _ => None,
        }
    }
}


/// An enum providing a rough classification of errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The core dump violated a structural invariant of the dump format.
    InvalidDump,
    /// The ELF image violated a structural invariant of the ELF format.
    InvalidElf,
    /// Data not valid for the operation were encountered.
    InvalidData,
    /// A parameter was incorrect.
    InvalidInput,
    /// An entity was not found, often a file.
    NotFound,
    /// The operation lacked the necessary privileges to complete.
    PermissionDenied,
    /// A custom error that does not fall under any other error kind.
    Other,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidDump => "malformed core dump",
            Self::InvalidElf => "malformed ELF image",
            Self::InvalidData => "invalid data",
            Self::InvalidInput => "invalid input parameter",
            Self::NotFound => "entity not found",
            Self::PermissionDenied => "permission denied",
            Self::Other => "other error",
        }
    }
}


/// The error type used by the library.
///
/// Errors carry an [`ErrorKind`] classification as well as an optional
/// chain of context strings accumulated as the error bubbles up.
pub struct Error {
    /// The top-most error of the chain.
    error: Box<ErrorImpl>,
}

impl Error {
    /// Create an [`Error`] of kind [`ErrorKind::InvalidDump`].
    pub fn with_invalid_dump<E>(error: E) -> Self
    where
        E: ToString,
    {
        Self {
            error: Box::new(ErrorImpl::InvalidDump(Cow::Owned(error.to_string()))),
        }
    }

    /// Create an [`Error`] of kind [`ErrorKind::InvalidElf`].
    pub fn with_invalid_elf<E>(error: E) -> Self
    where
        E: ToString,
    {
        Self {
            error: Box::new(ErrorImpl::InvalidElf(Cow::Owned(error.to_string()))),
        }
    }

    /// Create an [`Error`] of kind [`ErrorKind::InvalidData`].
    pub fn with_invalid_data<E>(error: E) -> Self
    where
        E: ToString,
    {
        Self {
            error: Box::new(ErrorImpl::InvalidData(Cow::Owned(error.to_string()))),
        }
    }

    /// Create an [`Error`] of kind [`ErrorKind::InvalidInput`].
    pub fn with_invalid_input<E>(error: E) -> Self
    where
        E: ToString,
    {
        Self {
            error: Box::new(ErrorImpl::InvalidInput(Cow::Owned(error.to_string()))),
        }
    }

    /// Retrieve a rough error classification in the form of an
    /// [`ErrorKind`].
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(&self.error, f)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.error, f)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.error.source()
    }
}

impl From<io::Error> for Error {
    fn from(other: io::Error) -> Self {
        Self {
            error: Box::new(ErrorImpl::Io(other)),
        }
    }
}


/// A trait providing ergonomic chaining capabilities to [`Error`].
pub trait ErrorExt: private::Sealed {
    /// The output type produced by [`context`](Self::context) and
    /// [`with_context`](Self::with_context).
    type Output;

    /// Add context to this error.
    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr;

    /// Add context to this error, lazily evaluated.
    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C;
}

impl ErrorExt for Error {
    type Output = Error;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr,
    {
        Self {
            error: Box::new(ErrorImpl::Context {
                context: context.into_cow_str(),
                source: self.error,
            }),
        }
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        self.context(f())
    }
}

impl<T, E> ErrorExt for Result<T, E>
where
    E: ErrorExt,
{
    type Output = Result<T, E::Output>;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr,
    {
        match self {
            Ok(val) => Ok(val),
            Err(err) => Err(err.context(context)),
        }
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        match self {
            Ok(val) => Ok(val),
            Err(err) => Err(err.with_context(f)),
        }
    }
}

impl ErrorExt for io::Error {
    type Output = Error;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: IntoCowStr,
    {
        Error::from(self).context(context)
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: IntoCowStr,
        F: FnOnce() -> C,
    {
        Error::from(self).with_context(f)
    }
}


/// A trait providing conversion of a string-ish into a
/// `Cow<'static, str>`.
pub trait IntoCowStr: private::Sealed {
    fn into_cow_str(self) -> Cow<'static, str>;
}

impl IntoCowStr for &'static str {
    fn into_cow_str(self) -> Cow<'static, str> {
        Cow::Borrowed(self)
    }
}

impl IntoCowStr for String {
    fn into_cow_str(self) -> Cow<'static, str> {
        Cow::Owned(self)
    }
}


/// A trait providing conversion of an `Option` into a `Result` carrying
/// a typed [`Error`].
pub trait IntoError<T>: private::Sealed
where
    Self: Sized,
{
    fn ok_or_error<C, F>(self, kind: ErrorKind, f: F) -> Result<T, Error>
    where
        C: ToString,
        F: FnOnce() -> C;

    /// Transform an absent value into an [`ErrorKind::InvalidDump`] error.
    #[inline]
    fn ok_or_invalid_dump<C, F>(self, f: F) -> Result<T, Error>
    where
        C: ToString,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::InvalidDump, f)
    }

    /// Transform an absent value into an [`ErrorKind::InvalidElf`] error.
    #[inline]
    fn ok_or_invalid_elf<C, F>(self, f: F) -> Result<T, Error>
    where
        C: ToString,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::InvalidElf, f)
    }

    /// Transform an absent value into an [`ErrorKind::InvalidData`] error.
    #[inline]
    fn ok_or_invalid_data<C, F>(self, f: F) -> Result<T, Error>
    where
        C: ToString,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::InvalidData, f)
    }

    /// Transform an absent value into an [`ErrorKind::InvalidInput`] error.
    #[inline]
    fn ok_or_invalid_input<C, F>(self, f: F) -> Result<T, Error>
    where
        C: ToString,
        F: FnOnce() -> C,
    {
        self.ok_or_error(ErrorKind::InvalidInput, f)
    }
}

impl<T> IntoError<T> for Option<T> {
    #[inline]
    fn ok_or_error<C, F>(self, kind: ErrorKind, f: F) -> Result<T, Error>
    where
        C: ToString,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| {
            let msg = Cow::Owned(f().to_string());
            let error = match kind {
                ErrorKind::InvalidDump => ErrorImpl::InvalidDump(msg),
                ErrorKind::InvalidElf => ErrorImpl::InvalidElf(msg),
                ErrorKind::InvalidInput => ErrorImpl::InvalidInput(msg),
                _ => ErrorImpl::InvalidData(msg),
            };
            Error {
                error: Box::new(error),
            }
        })
    }
}


mod private {
    use std::io;

    use super::Result;

    pub trait Sealed {}

    impl Sealed for &'static str {}
    impl Sealed for String {}
    impl Sealed for super::Error {}
    impl Sealed for io::Error {}

    impl<T> Sealed for Option<T> {}
    impl<T, E> Sealed for Result<T, E> where E: Sealed {}
}
