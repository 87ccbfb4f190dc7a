//! A bounds-checked little-endian byte cursor over the mmap'd container.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{EngineError, FormatError};

pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], EngineError> {
        if self.pos + n > self.bytes.len() {
            return Err(FormatError::OutOfBounds { what }.into());
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8, EngineError> {
        Ok(self.take(1, what)?[0])
    }

    pub fn read_i8(&mut self, what: &'static str) -> Result<i8, EngineError> {
        Ok(self.take(1, what)?[0] as i8)
    }

    pub fn read_u16(&mut self, what: &'static str) -> Result<u16, EngineError> {
        Ok(LittleEndian::read_u16(self.take(2, what)?))
    }

    pub fn read_i16(&mut self, what: &'static str) -> Result<i16, EngineError> {
        Ok(LittleEndian::read_i16(self.take(2, what)?))
    }

    pub fn read_u32(&mut self, what: &'static str) -> Result<u32, EngineError> {
        Ok(LittleEndian::read_u32(self.take(4, what)?))
    }

    pub fn read_i32(&mut self, what: &'static str) -> Result<i32, EngineError> {
        Ok(LittleEndian::read_i32(self.take(4, what)?))
    }

    pub fn read_u64(&mut self, what: &'static str) -> Result<u64, EngineError> {
        Ok(LittleEndian::read_u64(self.take(8, what)?))
    }

    pub fn read_i64(&mut self, what: &'static str) -> Result<i64, EngineError> {
        Ok(LittleEndian::read_i64(self.take(8, what)?))
    }

    pub fn read_f32(&mut self, what: &'static str) -> Result<f32, EngineError> {
        Ok(LittleEndian::read_f32(self.take(4, what)?))
    }

    pub fn read_f64(&mut self, what: &'static str) -> Result<f64, EngineError> {
        Ok(LittleEndian::read_f64(self.take(8, what)?))
    }

    pub fn read_bytes(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], EngineError> {
        self.take(n, what)
    }

    /// Length-prefixed (u64) UTF-8 string, capped by `max_len`.
    pub fn read_string(&mut self, max_len: u64, what: &'static str) -> Result<String, EngineError> {
        let len = self.read_u64(what)?;
        if len >= max_len {
            return Err(FormatError::InvalidSize {
                what,
                size: len,
                max: max_len,
            }
            .into());
        }
        let bytes = self.take(len as usize, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| FormatError::OutOfBounds { what }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};

    #[test]
    fn string_length_at_the_cap_is_rejected() {
        let mut buf = Vec::new();
        buf.write_u64::<LittleEndian>(10).unwrap();
        buf.extend_from_slice(b"0123456789");
        let mut cursor = Cursor::new(&buf);
        let err = cursor.read_string(10, "test string").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Format(FormatError::InvalidSize { .. })
        ));
    }

    #[test]
    fn string_length_one_under_the_cap_is_accepted() {
        let mut buf = Vec::new();
        buf.write_u64::<LittleEndian>(9).unwrap();
        buf.extend_from_slice(b"012345678");
        let mut cursor = Cursor::new(&buf);
        let value = cursor.read_string(10, "test string").unwrap();
        assert_eq!(value, "012345678");
    }
}
