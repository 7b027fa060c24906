use std::fmt;

use bincode::{
    config::{BigEndian, Configuration, Fixint},
    encode_into_std_write,
};

use super::transport::TransportError;

/// Leading byte of every request.
pub const MAGIC: u8 = 0xc8;

/// The published Tyrant command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Put = 0x10,
    PutKeep = 0x11,
    PutCat = 0x12,
    PutShl = 0x13,
    PutNr = 0x18,
    Out = 0x20,
    Get = 0x30,
    MGet = 0x31,
    Vsiz = 0x38,
    IterInit = 0x50,
    IterNext = 0x51,
    FwmKeys = 0x58,
    AddInt = 0x60,
    AddDouble = 0x61,
    Ext = 0x68,
    Sync = 0x70,
    Optimize = 0x71,
    Vanish = 0x72,
    Copy = 0x73,
    Rnum = 0x80,
    Size = 0x81,
    Stat = 0x88,
    Misc = 0x90,
}

impl Opcode {
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Put => "put",
            Opcode::PutKeep => "putkeep",
            Opcode::PutCat => "putcat",
            Opcode::PutShl => "putshl",
            Opcode::PutNr => "putnr",
            Opcode::Out => "out",
            Opcode::Get => "get",
            Opcode::MGet => "mget",
            Opcode::Vsiz => "vsiz",
            Opcode::IterInit => "iterinit",
            Opcode::IterNext => "iternext",
            Opcode::FwmKeys => "fwmkeys",
            Opcode::AddInt => "addint",
            Opcode::AddDouble => "adddouble",
            Opcode::Ext => "ext",
            Opcode::Sync => "sync",
            Opcode::Optimize => "optimize",
            Opcode::Vanish => "vanish",
            Opcode::Copy => "copy",
            Opcode::Rnum => "rnum",
            Opcode::Size => "size",
            Opcode::Stat => "stat",
            Opcode::Misc => "misc",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x10 => Opcode::Put,
            0x11 => Opcode::PutKeep,
            0x12 => Opcode::PutCat,
            0x13 => Opcode::PutShl,
            0x18 => Opcode::PutNr,
            0x20 => Opcode::Out,
            0x30 => Opcode::Get,
            0x31 => Opcode::MGet,
            0x38 => Opcode::Vsiz,
            0x50 => Opcode::IterInit,
            0x51 => Opcode::IterNext,
            0x58 => Opcode::FwmKeys,
            0x60 => Opcode::AddInt,
            0x61 => Opcode::AddDouble,
            0x68 => Opcode::Ext,
            0x70 => Opcode::Sync,
            0x71 => Opcode::Optimize,
            0x72 => Opcode::Vanish,
            0x73 => Opcode::Copy,
            0x80 => Opcode::Rnum,
            0x81 => Opcode::Size,
            0x88 => Opcode::Stat,
            0x90 => Opcode::Misc,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    U32(u32),
    I32(i32),
    I64(i64),
    Len(usize),
    Raw(Vec<u8>),
}

/// One request, built field by field in wire order.
///
/// Integer fields are written big-endian; raw fields are copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    opcode: Opcode,
    fields: Vec<Field>,
    absent_on_failure: bool,
    reply: bool,
}

impl Request {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            fields: Vec::new(),
            absent_on_failure: false,
            reply: true,
        }
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.fields.push(Field::U32(value));
        self
    }

    pub fn i32(mut self, value: i32) -> Self {
        self.fields.push(Field::I32(value));
        self
    }

    pub fn i64(mut self, value: i64) -> Self {
        self.fields.push(Field::I64(value));
        self
    }

    /// 32-bit length of `bytes`.
    pub fn length(mut self, bytes: &[u8]) -> Self {
        self.fields.push(Field::Len(bytes.len()));
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.fields.push(Field::Raw(bytes.to_vec()));
        self
    }

    /// Length-prefixed element, as used by `mget` keys and `misc` arguments.
    pub fn sized(self, bytes: &[u8]) -> Self {
        self.length(bytes).raw(bytes)
    }

    /// The server reports a missing record with the generic failure code for this verb.
    pub fn absent_on_failure(mut self) -> Self {
        self.absent_on_failure = true;
        self
    }

    /// The server sends nothing back, not even a status byte.
    pub fn without_reply(mut self) -> Self {
        self.reply = false;
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn is_absent_on_failure(&self) -> bool {
        self.absent_on_failure
    }

    pub fn expects_reply(&self) -> bool {
        self.reply
    }

    pub fn encode(
        &self,
        config: Configuration<BigEndian, Fixint>,
    ) -> Result<Vec<u8>, TransportError> {
        let mut buf = Vec::with_capacity(self.encoded_hint());
        encode_into_std_write(MAGIC, &mut buf, config)?;
        encode_into_std_write(self.opcode as u8, &mut buf, config)?;

        for field in &self.fields {
            match field {
                Field::U32(v) => {
                    encode_into_std_write(*v, &mut buf, config)?;
                }
                Field::I32(v) => {
                    encode_into_std_write(*v, &mut buf, config)?;
                }
                Field::I64(v) => {
                    encode_into_std_write(*v, &mut buf, config)?;
                }
                Field::Len(len) => {
                    let len = u32::try_from(*len).map_err(|_| TransportError::Oversized(*len))?;
                    encode_into_std_write(len, &mut buf, config)?;
                }
                Field::Raw(bytes) => buf.extend_from_slice(bytes),
            }
        }

        Ok(buf)
    }

    fn encoded_hint(&self) -> usize {
        2 + self
            .fields
            .iter()
            .map(|f| match f {
                Field::Raw(bytes) => bytes.len(),
                Field::I64(_) => 8,
                _ => 4,
            })
            .sum::<usize>()
    }
}
