use nom::number::complete::le_u32;

use crate::error::MachOResult;

use super::{pad_to_size, LCLoadCommand, LoadCommandBase, LoadCommandParser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkeditDataCommand {
    pub cmd: LCLoadCommand,
    pub cmdsize: u32,
    pub dataoff: u32,
    pub datasize: u32,
}

impl LoadCommandParser for LinkeditDataCommand {
    fn parse(ldcmd: &[u8]) -> MachOResult<Self> {
        let (cursor, base) = LoadCommandBase::parse(ldcmd)?;
        let (cursor, dataoff) = le_u32(cursor)?;
        let (_, datasize) = le_u32(cursor)?;

        Ok(LinkeditDataCommand {
            cmd: base.cmd,
            cmdsize: base.cmdsize,
            dataoff,
            datasize,
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend(self.cmd.serialize());
        buf.extend(self.cmdsize.to_le_bytes());
        buf.extend(self.dataoff.to_le_bytes());
        buf.extend(self.datasize.to_le_bytes());
        pad_to_size(&mut buf, self.cmdsize as usize);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let cmd = LinkeditDataCommand {
            cmd: LCLoadCommand::LcFunctionStarts,
            cmdsize: 16,
            dataoff: 0x1000,
            datasize: 0x80,
        };
        let bytes = cmd.serialize();
        let parsed = LinkeditDataCommand::parse(&bytes).unwrap();
        assert_eq!(cmd, parsed);
    }
}
