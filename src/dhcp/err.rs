use thiserror::Error;

/// Raised by the packet codec. A buffer shorter than the fixed BOOTP
/// header cannot be a DHCP message; everything after the fixed header
/// is recovered leniently and never raises.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("truncated packet: got {len} bytes, the fixed DHCP header needs {min}")]
    Truncated { len: usize, min: usize },
}

#[derive(Debug)]
pub enum Error<I> {
    NomError(nom::Err<(I, nom::error::ErrorKind)>),
}

impl<I> nom::error::ParseError<I> for Error<I> {
    fn from_error_kind(input: I, kind: nom::error::ErrorKind) -> Self {
        Error::NomError(nom::Err::Error((input, kind)))
    }

    fn append(_input: I, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

pub type IResult<I, O> = nom::IResult<I, O, Error<I>>;
