//! Fixed-size container header: magic marker, version, and the two counts
//! that size the metadata and tensor-descriptor sections that follow it.

use crate::container::cursor::Cursor;
use crate::error::{EngineError, FormatError};

const MAGIC: &[u8; 4] = b"GGUF";

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub version: u32,
    pub tensor_count: u64,
    pub metadata_count: u64,
}

impl Header {
    pub fn parse(cursor: &mut Cursor<'_>) -> Result<Self, EngineError> {
        let magic = cursor.read_bytes(4, "magic marker")?;
        if magic != MAGIC {
            return Err(FormatError::InvalidMagic.into());
        }
        let version = cursor.read_u32("version")?;
        let tensor_count = cursor.read_u64("tensor count")?;
        let metadata_count = cursor.read_u64("metadata count")?;
        Ok(Header {
            version,
            tensor_count,
            metadata_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::io::Write;

    fn encode_valid_header() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_all(MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(3).unwrap();
        buf.write_u64::<LittleEndian>(2).unwrap();
        buf.write_u64::<LittleEndian>(5).unwrap();
        buf
    }

    #[test]
    fn parses_valid_header() {
        let bytes = encode_valid_header();
        let mut cursor = Cursor::new(&bytes);
        let header = Header::parse(&mut cursor).unwrap();
        assert_eq!(header.version, 3);
        assert_eq!(header.tensor_count, 2);
        assert_eq!(header.metadata_count, 5);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode_valid_header();
        bytes[0] = b'X';
        let mut cursor = Cursor::new(&bytes);
        let err = Header::parse(&mut cursor).unwrap_err();
        assert!(matches!(err, EngineError::Format(FormatError::InvalidMagic)));
    }

    #[test]
    fn accepts_any_version_number() {
        let mut buf = Vec::new();
        buf.write_all(MAGIC).unwrap();
        buf.write_u32::<LittleEndian>(999).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        let mut cursor = Cursor::new(&buf);
        let header = Header::parse(&mut cursor).unwrap();
        assert_eq!(header.version, 999);
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = &encode_valid_header()[..8];
        let mut cursor = Cursor::new(bytes);
        assert!(Header::parse(&mut cursor).is_err());
    }
}
