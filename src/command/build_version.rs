use nom::{number::complete::le_u32, IResult};
use nom_derive::{Nom, Parse};
use strum_macros::{Display, EnumString};

use crate::error::MachOResult;
use crate::helpers::{reverse_version_string, version_string};

use super::{pad_to_size, LCLoadCommand, LoadCommandBase, LoadCommandParser};

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Nom, EnumString, Display)]
pub enum Tool {
    Clang = 1,
    Swift = 2,
    Ld = 3,
    Lld = 4,
    Metal = 1024,
    Airlld = 1025,
    Airnt = 1026,
    AirntPlugin = 1027,
    Airpack = 1028,
    Gpuarchiver = 1031,
    MetalFramework = 1032,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Nom, EnumString, Display)]
pub enum Platform {
    Unknown = 0,
    Any = 0xFFFFFFFF,
    MacOS = 1,
    IOS = 2,
    TvOS = 3,
    WatchOS = 4,
    BridgeOS = 5,
    MacCatalyst = 6,
    IOSSimulator = 7,
    TvOSSimulator = 8,
    WatchOSSimulator = 9,
    DriverKit = 10,
    VisionOS = 11,
    VisionOSSimulator = 12,
    Firmware = 13,
    SepOS = 14,
}

#[derive(Debug)]
pub struct BuildToolVersion {
    pub tool: Tool,
    pub version: String,
}

impl BuildToolVersion {
    pub fn parse<'a>(bytes: &'a [u8]) -> IResult<&'a [u8], Self> {
        let (bytes, tool) = Tool::parse_le(bytes)?;
        let (bytes, version) = le_u32(bytes)?;

        Ok((
            bytes,
            BuildToolVersion {
                tool,
                version: version_string(version),
            },
        ))
    }
}

#[derive(Debug)]
pub struct BuildVersionCommand {
    pub cmd: LCLoadCommand,
    pub cmdsize: u32,
    pub platform: Platform,
    pub minos: String,
    pub sdk: String,
    pub ntools: u32,
    pub tools: Vec<BuildToolVersion>,
}

impl BuildVersionCommand {
    fn parse_nom(ldcmd: &[u8]) -> IResult<&[u8], Self> {
        let (cursor, base) = LoadCommandBase::parse(ldcmd)?;
        let (cursor, platform) = Platform::parse_le(cursor)?;
        let (cursor, minos) = le_u32(cursor)?;
        let (cursor, sdk) = le_u32(cursor)?;
        let (mut cursor, ntools) = le_u32(cursor)?;

        let mut tools = Vec::new();
        for _ in 0..ntools {
            let (next, tool) = BuildToolVersion::parse(cursor)?;
            tools.push(tool);
            cursor = next;
        }

        // cmdsize already accounts for the trailing tools array, unlike
        // some other variable-length commands.
        Ok((
            cursor,
            BuildVersionCommand {
                cmd: base.cmd,
                cmdsize: base.cmdsize,
                platform,
                minos: version_string(minos),
                sdk: version_string(sdk),
                ntools,
                tools,
            },
        ))
    }
}

impl LoadCommandParser for BuildVersionCommand {
    fn parse(ldcmd: &[u8]) -> MachOResult<Self> {
        let (_, cmd) = BuildVersionCommand::parse_nom(ldcmd)?;
        Ok(cmd)
    }

    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(self.cmd.serialize());
        buf.extend(self.cmdsize.to_le_bytes());
        buf.extend((self.platform as u32).to_le_bytes());
        buf.extend(reverse_version_string(&self.minos).to_le_bytes());
        buf.extend(reverse_version_string(&self.sdk).to_le_bytes());
        buf.extend(self.ntools.to_le_bytes());
        for tool in &self.tools {
            buf.extend((tool.tool as u32).to_le_bytes());
            buf.extend(reverse_version_string(&tool.version).to_le_bytes());
        }
        pad_to_size(&mut buf, self.cmdsize as usize);
        buf
    }
}
