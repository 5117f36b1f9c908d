use std::fmt;
use std::io;

#[derive(Debug)]
pub enum MachOErr {
    IOError(io::Error),
    BadMagic,
    TruncatedLoadCommand { index: u32 },
    UnsupportedCpuType,
    SliceOutOfRange { offset: u64, size: u64, source_size: u64 },
    ParsingError(String),
    InvalidValue(String),
    UnknownLoadCommand,
}

impl fmt::Display for MachOErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MachOErr::IOError(e) => write!(f, "I/O error: {}", e),
            MachOErr::BadMagic => write!(f, "not a Mach-O file (bad magic)"),
            MachOErr::TruncatedLoadCommand { index } => {
                write!(f, "load command {} is truncated", index)
            }
            MachOErr::UnsupportedCpuType => write!(f, "no slice for requested cpu type"),
            MachOErr::SliceOutOfRange { offset, size, source_size } => write!(
                f,
                "slice [{}, {}) exceeds source size {}",
                offset,
                offset + size,
                source_size
            ),
            MachOErr::ParsingError(s) => write!(f, "parse error: {}", s),
            MachOErr::InvalidValue(s) => write!(f, "invalid value: {}", s),
            MachOErr::UnknownLoadCommand => write!(f, "unknown load command"),
        }
    }
}

impl std::error::Error for MachOErr {}

impl From<io::Error> for MachOErr {
    fn from(e: io::Error) -> Self {
        MachOErr::IOError(e)
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for MachOErr {
    fn from(e: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        MachOErr::ParsingError(format!("{:?}", e))
    }
}

pub type MachOResult<T> = Result<T, MachOErr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    OutOfRange,
    Unmapped,
    ShortRead,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadError::OutOfRange => write!(f, "address out of range"),
            ReadError::Unmapped => write!(f, "address not mapped by any segment"),
            ReadError::ShortRead => write!(f, "short read"),
        }
    }
}

impl std::error::Error for ReadError {}

pub type ReadResult<T> = Result<T, ReadError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub offset: usize,
    pub character: char,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unrecognized type character '{}' at offset {}",
            self.character, self.offset
        )
    }
}

impl std::error::Error for DecodeError {}
