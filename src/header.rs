#![allow(dead_code)]

use nom::number::complete::{le_i32, le_u32};
use nom::IResult;
use nom_derive::Nom;
use num_derive::FromPrimitive;

use nom::error::{Error, ErrorKind};
use nom::Err::Failure;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Nom)]
pub enum MHMagic {
    MhMagic = 0xfeedface,
    MhMagic64 = 0xfeedfacf,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum MHFileType {
    Object = 0x1,
    Execute = 0x2,
    FvmLib = 0x3,
    Core = 0x4,
    Preload = 0x5,
    Dylib = 0x6,
    Dylinker = 0x7,
    Bundle = 0x8,
    DylibStub = 0x9,
    Dsym = 0xa,
    KextBundle = 0xb,
    FileSet = 0xc,
}

impl MHFileType {
    pub fn parse(bytes: &[u8]) -> IResult<&[u8], MHFileType> {
        let (bytes, filetype) = le_u32(bytes)?;
        match num::FromPrimitive::from_u32(filetype) {
            Some(filetype) => Ok((bytes, filetype)),
            None => Err(Failure(Error::new(bytes, ErrorKind::Tag))),
        }
    }
}

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MHFlags: u32 {
        const NOUNDEFS = 0x1;
        const INCRLINK = 0x2;
        const DYLDLINK = 0x4;
        const BINDATLOAD = 0x8;
        const PREBOUND = 0x10;
        const SPLIT_SEGS = 0x20;
        const LAZY_INIT = 0x40;
        const TWOLEVEL = 0x80;
        const FORCE_FLAT = 0x100;
        const NOMULTIDEFS = 0x200;
        const NOFIXPREBINDING = 0x400;
        const PREBINDABLE = 0x800;
        const ALLMODSBOUND = 0x1000;
        const SUBSECTIONS_VIA_SYMBOLS = 0x2000;
        const CANONICAL = 0x4000;
        const WEAK_DEFINES = 0x8000;
        const BINDS_TO_WEAK = 0x10000;
        const ALLOW_STACK_EXECUTION = 0x20000;
        const ROOT_SAFE = 0x40000;
        const SETUID_SAFE = 0x80000;
        const NO_REEXPORTED_DYLIBS = 0x100000;
        const PIE = 0x200000;
        const DEAD_STRIPPABLE_DYLIB = 0x400000;
        const HAS_TLV_DESCRIPTORS = 0x800000;
        const NO_HEAP_EXECUTION = 0x1000000;
        const APP_EXTENSION_SAFE = 0x2000000;
        const NLIST_OUTOFSYNC_WITH_DYLDINFO = 0x4000000;
        const SIM_SUPPORT = 0x8000000;
        const DYLIB_IN_CACHE = 0x80000000;
    }
}

impl MHFlags {
    pub fn parse(bytes: &[u8]) -> IResult<&[u8], MHFlags> {
        let (bytes, flags) = le_u32(bytes)?;
        Ok((bytes, MHFlags::from_bits_truncate(flags)))
    }
}

use crate::machine::CpuType;

#[derive(Debug, Clone, Copy)]
pub struct MachHeader32 {
    pub magic: MHMagic,
    pub cputype: CpuType,
    pub cpusubtype: i32,
    pub filetype: MHFileType,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: MHFlags,
}

impl MachHeader32 {
    pub fn parse(bytes: &[u8]) -> IResult<&[u8], MachHeader32> {
        let (bytes, magic) = MHMagic::parse_le(bytes)?;
        let (bytes, cputype) = CpuType::parse(bytes)?;
        let (bytes, cpusubtype) = le_i32(bytes)?;
        let (bytes, filetype) = MHFileType::parse(bytes)?;
        let (bytes, ncmds) = le_u32(bytes)?;
        let (bytes, sizeofcmds) = le_u32(bytes)?;
        let (bytes, flags) = MHFlags::parse(bytes)?;

        Ok((
            bytes,
            MachHeader32 {
                magic,
                cputype,
                cpusubtype,
                filetype,
                ncmds,
                sizeofcmds,
                flags,
            },
        ))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MachHeader64 {
    pub magic: MHMagic,
    pub cputype: CpuType,
    pub cpusubtype: i32,
    pub filetype: MHFileType,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: MHFlags,
    pub reserved: u32,
}

impl MachHeader64 {
    pub fn parse(bytes: &[u8]) -> IResult<&[u8], MachHeader64> {
        let (bytes, magic) = MHMagic::parse_le(bytes)?;
        let (bytes, cputype) = CpuType::parse(bytes)?;
        let (bytes, cpusubtype) = le_i32(bytes)?;
        let (bytes, filetype) = MHFileType::parse(bytes)?;
        let (bytes, ncmds) = le_u32(bytes)?;
        let (bytes, sizeofcmds) = le_u32(bytes)?;
        let (bytes, flags) = MHFlags::parse(bytes)?;
        let (bytes, reserved) = le_u32(bytes)?;

        Ok((
            bytes,
            MachHeader64 {
                magic,
                cputype,
                cpusubtype,
                filetype,
                ncmds,
                sizeofcmds,
                flags,
                reserved,
            },
        ))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum MachHeader {
    Header32(MachHeader32),
    Header64(MachHeader64),
}

impl MachHeader {
    pub fn parse(bytes: &[u8]) -> IResult<&[u8], MachHeader> {
        let (_, magic) = MHMagic::parse_le(bytes)?;

        match magic {
            MHMagic::MhMagic => {
                let (remaining, header) = MachHeader32::parse(bytes)?;
                Ok((remaining, MachHeader::Header32(header)))
            }
            MHMagic::MhMagic64 => {
                let (remaining, header) = MachHeader64::parse(bytes)?;
                Ok((remaining, MachHeader::Header64(header)))
            }
        }
    }

    pub fn magic(&self) -> MHMagic {
        match self {
            MachHeader::Header32(h) => h.magic,
            MachHeader::Header64(h) => h.magic,
        }
    }

    pub fn cputype(&self) -> CpuType {
        match self {
            MachHeader::Header32(h) => h.cputype,
            MachHeader::Header64(h) => h.cputype,
        }
    }

    pub fn cpusubtype(&self) -> i32 {
        match self {
            MachHeader::Header32(h) => h.cpusubtype,
            MachHeader::Header64(h) => h.cpusubtype,
        }
    }

    pub fn filetype(&self) -> MHFileType {
        match self {
            MachHeader::Header32(h) => h.filetype,
            MachHeader::Header64(h) => h.filetype,
        }
    }

    pub fn ncmds(&self) -> u32 {
        match self {
            MachHeader::Header32(h) => h.ncmds,
            MachHeader::Header64(h) => h.ncmds,
        }
    }

    pub fn sizeofcmds(&self) -> u32 {
        match self {
            MachHeader::Header32(h) => h.sizeofcmds,
            MachHeader::Header64(h) => h.sizeofcmds,
        }
    }

    pub fn flags(&self) -> MHFlags {
        match self {
            MachHeader::Header32(h) => h.flags,
            MachHeader::Header64(h) => h.flags,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            MachHeader::Header32(_) => 28,
            MachHeader::Header64(_) => 32,
        }
    }

    pub fn is_64(&self) -> bool {
        matches!(self, MachHeader::Header64(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header64_bytes() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend((0xfeedfacfu32).to_le_bytes()); // magic
        b.extend((0x0100000cu32).to_le_bytes()); // cputype = ARM64
        b.extend((0u32).to_le_bytes()); // cpusubtype
        b.extend((0x6u32).to_le_bytes()); // filetype = dylib
        b.extend((1u32).to_le_bytes()); // ncmds
        b.extend((24u32).to_le_bytes()); // sizeofcmds
        b.extend((0x200085u32).to_le_bytes()); // flags
        b.extend((0u32).to_le_bytes()); // reserved
        b
    }

    #[test]
    fn parses_64_bit_header() {
        let bytes = header64_bytes();
        let (_, header) = MachHeader::parse(&bytes).unwrap();
        assert!(header.is_64());
        assert_eq!(header.ncmds(), 1);
        assert_eq!(header.sizeofcmds(), 24);
        assert_eq!(header.size(), 32);
        assert_eq!(header.filetype(), MHFileType::Dylib);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = header64_bytes();
        bytes[0] = 0;
        assert!(MachHeader::parse(&bytes).is_err());
    }
}
