use std::io::{self, Read, Write};

use bincode::{
    config::{BigEndian, Configuration, Fixint},
    decode_from_std_read,
};
use log::trace;
use thiserror::Error;

use super::{Request, ResponseCode};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("argument of {0} bytes does not fit a 32-bit length field")]
    Oversized(usize),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

/// Big-endian, fixed-width integer framing shared by requests and responses.
pub(crate) fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Frames requests onto, and reads response fields from, one byte stream.
///
/// Responses carry no self-describing header beyond the status byte, so the
/// caller drives decoding field by field in the order each verb defines.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
    config: Configuration<BigEndian, Fixint>,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            config: wire_config(),
        }
    }

    pub fn write_request(&mut self, request: &Request) -> Result<(), TransportError> {
        let buf = request.encode(self.config)?;
        trace!("writing '{}': {buf:?}", request.opcode());
        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn read_code(&mut self) -> Result<ResponseCode, TransportError> {
        let code: u8 = decode_from_std_read(&mut self.stream, self.config)?;
        Ok(code.into())
    }

    pub fn read_u32(&mut self) -> Result<u32, TransportError> {
        Ok(decode_from_std_read(&mut self.stream, self.config)?)
    }

    pub fn read_i32(&mut self) -> Result<i32, TransportError> {
        Ok(decode_from_std_read(&mut self.stream, self.config)?)
    }

    pub fn read_u64(&mut self) -> Result<u64, TransportError> {
        Ok(decode_from_std_read(&mut self.stream, self.config)?)
    }

    pub fn read_i64(&mut self) -> Result<i64, TransportError> {
        Ok(decode_from_std_read(&mut self.stream, self.config)?)
    }

    /// Reads exactly `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = Vec::new();
        (&mut self.stream).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes, stream ended after {}", buf.len()),
            )));
        }
        Ok(buf)
    }

    /// Reads a 32-bit length followed by that many bytes.
    pub fn read_sized(&mut self) -> Result<Vec<u8>, TransportError> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    /// Reads a key/value pair framed as `[ksiz][vsiz][key][value]`.
    pub fn read_pair(&mut self) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
        let klen = self.read_u32()? as usize;
        let vlen = self.read_u32()? as usize;
        let key = self.read_bytes(klen)?;
        let value = self.read_bytes(vlen)?;
        Ok((key, value))
    }

    /// Reads a 32-bit element count followed by that many sized elements.
    pub fn read_list(&mut self) -> Result<Vec<Vec<u8>>, TransportError> {
        let count = self.read_u32()?;
        (0..count).map(|_| self.read_sized()).collect()
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}
