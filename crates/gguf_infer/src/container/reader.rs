//! Orchestrates a full container parse: header, metadata key-value section,
//! tensor descriptor section, and the alignment-padded data region that
//! follows them. The parsed result borrows nothing from the mmap beyond the
//! byte slices it hands back for tensor data, so the mmap must outlive it.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::container::cursor::Cursor;
use crate::container::header::Header;
use crate::container::metadata::{MetadataMap, MetadataValue, MAX_ARRAY_LEN, MAX_STRING_LEN};
use crate::container::tensor_desc::{ElementType, TensorDescriptor};
use crate::error::{EngineError, FormatError};

const DEFAULT_ALIGNMENT: u64 = 32;
const MAX_RANK: u32 = 16;

/// GGUF metadata value type tags, in on-disk order.
mod value_tag {
    pub const U8: u32 = 0;
    pub const I8: u32 = 1;
    pub const U16: u32 = 2;
    pub const I16: u32 = 3;
    pub const U32: u32 = 4;
    pub const I32: u32 = 5;
    pub const F32: u32 = 6;
    pub const BOOL: u32 = 7;
    pub const STRING: u32 = 8;
    pub const ARRAY: u32 = 9;
    pub const U64: u32 = 10;
    pub const I64: u32 = 11;
    pub const F64: u32 = 12;
}

pub struct ContainerReader {
    mmap: Mmap,
    metadata: MetadataMap,
    tensors: HashMap<String, TensorDescriptor>,
    data_offset: u64,
}

impl ContainerReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_mmap(mmap)
    }

    fn from_mmap(mmap: Mmap) -> Result<Self, EngineError> {
        let mut cursor = Cursor::new(&mmap[..]);
        let header = Header::parse(&mut cursor)?;

        let mut metadata = MetadataMap::new();
        for _ in 0..header.metadata_count {
            let key = cursor.read_string(MAX_STRING_LEN, "metadata key")?;
            let value = read_metadata_value(&mut cursor)?;
            metadata.insert(key, value);
        }

        let mut tensors = HashMap::with_capacity(header.tensor_count as usize);
        let mut max_end = 0u64;
        for _ in 0..header.tensor_count {
            let name = cursor.read_string(MAX_STRING_LEN, "tensor name")?;
            let rank = cursor.read_u32("tensor rank")?;
            if rank > MAX_RANK {
                return Err(FormatError::InvalidRank { name, rank }.into());
            }
            let mut shape = Vec::with_capacity(rank as usize);
            for _ in 0..rank {
                shape.push(cursor.read_u64("tensor shape dimension")?);
            }
            let type_tag = cursor.read_u32("tensor element type")?;
            let element_type = ElementType::from_tag(type_tag, &name)?;
            let relative_offset = cursor.read_u64("tensor relative offset")?;

            let element_count: u64 = shape.iter().product();
            let end = relative_offset
                + crate::container::tensor_desc::byte_size(element_count, element_type);
            max_end = max_end.max(end);

            tensors.insert(
                name.clone(),
                TensorDescriptor {
                    name,
                    shape,
                    element_type,
                    relative_offset,
                },
            );
        }

        let alignment = resolve_alignment(&metadata)?;
        let header_end = cursor.position() as u64;
        let data_offset = align_up(header_end, alignment);

        if data_offset + max_end > mmap.len() as u64 {
            return Err(FormatError::OutOfBounds {
                what: "tensor data region",
            }
            .into());
        }

        Ok(ContainerReader {
            mmap,
            metadata,
            tensors,
            data_offset,
        })
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn tensor_names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn tensor_descriptor(&self, name: &str) -> Result<&TensorDescriptor, EngineError> {
        self.tensors
            .get(name)
            .ok_or_else(|| FormatError::MissingMetadata(name.to_string()).into())
    }

    /// Zero-copy slice into the mmap'd data region for the named tensor.
    pub fn tensor_bytes(&self, name: &str) -> Result<&[u8], EngineError> {
        let desc = self.tensor_descriptor(name)?;
        let start = self.data_offset + desc.relative_offset;
        let end = start + desc.byte_size();
        if end > self.mmap.len() as u64 {
            return Err(FormatError::OutOfBounds {
                what: "tensor data region",
            }
            .into());
        }
        Ok(&self.mmap[start as usize..end as usize])
    }
}

fn resolve_alignment(metadata: &MetadataMap) -> Result<u64, EngineError> {
    match metadata.get("general.alignment") {
        None => Ok(DEFAULT_ALIGNMENT),
        Some(value) => value.as_u64().ok_or_else(|| {
            FormatError::InvalidMetadataType {
                key: "general.alignment".to_string(),
                expected: "unsigned integer",
            }
            .into()
        }),
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    let remainder = value % alignment;
    if remainder == 0 {
        value
    } else {
        value + (alignment - remainder)
    }
}

fn read_metadata_value(cursor: &mut Cursor<'_>) -> Result<MetadataValue, EngineError> {
    let tag = cursor.read_u32("metadata value tag")?;
    read_metadata_value_of_tag(cursor, tag)
}

fn read_metadata_value_of_tag(
    cursor: &mut Cursor<'_>,
    tag: u32,
) -> Result<MetadataValue, EngineError> {
    match tag {
        value_tag::U8 => Ok(MetadataValue::U8(cursor.read_u8("metadata u8 value")?)),
        value_tag::I8 => Ok(MetadataValue::I8(cursor.read_i8("metadata i8 value")?)),
        value_tag::U16 => Ok(MetadataValue::U16(cursor.read_u16("metadata u16 value")?)),
        value_tag::I16 => Ok(MetadataValue::I16(cursor.read_i16("metadata i16 value")?)),
        value_tag::U32 => Ok(MetadataValue::U32(cursor.read_u32("metadata u32 value")?)),
        value_tag::I32 => Ok(MetadataValue::I32(cursor.read_i32("metadata i32 value")?)),
        value_tag::F32 => Ok(MetadataValue::F32(cursor.read_f32("metadata f32 value")?)),
        value_tag::BOOL => Ok(MetadataValue::Bool(
            cursor.read_u8("metadata bool value")? != 0,
        )),
        value_tag::STRING => Ok(MetadataValue::String(
            cursor.read_string(MAX_STRING_LEN, "metadata string value")?,
        )),
        value_tag::ARRAY => {
            let element_tag = cursor.read_u32("metadata array element type")?;
            let len = cursor.read_u64("metadata array length")?;
            if len >= MAX_ARRAY_LEN {
                return Err(FormatError::InvalidSize {
                    what: "metadata array",
                    size: len,
                    max: MAX_ARRAY_LEN,
                }
                .into());
            }
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(read_metadata_value_of_tag(cursor, element_tag)?);
            }
            Ok(MetadataValue::Array(items))
        }
        value_tag::U64 => Ok(MetadataValue::U64(cursor.read_u64("metadata u64 value")?)),
        value_tag::I64 => Ok(MetadataValue::I64(cursor.read_i64("metadata i64 value")?)),
        value_tag::F64 => Ok(MetadataValue::F64(cursor.read_f64("metadata f64 value")?)),
        _ => Err(FormatError::UnsupportedMetadataType {
            key: String::new(),
            tag,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, WriteBytesExt};
    use std::io::Write;

    fn write_string(buf: &mut Vec<u8>, s: &str) {
        buf.write_u64::<LittleEndian>(s.len() as u64).unwrap();
        buf.write_all(s.as_bytes()).unwrap();
    }

    /// Builds a minimal single-tensor container: one metadata string key and
    /// one F32 tensor of 4 elements, data region aligned to the default 32.
    fn encode_minimal_container() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_all(b"GGUF").unwrap();
        buf.write_u32::<LittleEndian>(3).unwrap();
        buf.write_u64::<LittleEndian>(1).unwrap(); // tensor_count
        buf.write_u64::<LittleEndian>(1).unwrap(); // metadata_count

        write_string(&mut buf, "general.name");
        buf.write_u32::<LittleEndian>(value_tag::STRING).unwrap();
        write_string(&mut buf, "test-model");

        write_string(&mut buf, "weight");
        buf.write_u32::<LittleEndian>(1).unwrap(); // rank
        buf.write_u64::<LittleEndian>(4).unwrap(); // shape[0]
        buf.write_u32::<LittleEndian>(0).unwrap(); // F32 tag
        buf.write_u64::<LittleEndian>(0).unwrap(); // relative_offset

        let header_end = buf.len() as u64;
        let aligned = align_up(header_end, DEFAULT_ALIGNMENT);
        buf.resize(aligned as usize, 0);
        for v in [1.0f32, 2.0, 3.0, 4.0] {
            buf.write_f32::<LittleEndian>(v).unwrap();
        }
        buf
    }

    #[test]
    fn parses_minimal_container_and_reads_tensor() {
        let bytes = encode_minimal_container();
        let mut path = std::env::temp_dir();
        path.push(format!("gguf_infer_test_{:p}.gguf", &bytes));
        std::fs::write(&path, &bytes).unwrap();

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(
            reader.metadata().get("general.name").unwrap().as_str(),
            Some("test-model")
        );
        let data = reader.tensor_bytes("weight").unwrap();
        assert_eq!(data.len(), 16);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn array_length_at_the_cap_is_rejected() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(value_tag::U8).unwrap();
        buf.write_u64::<LittleEndian>(MAX_ARRAY_LEN).unwrap();
        let mut cursor = Cursor::new(&buf);
        let err = read_metadata_value_of_tag(&mut cursor, value_tag::ARRAY).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Format(FormatError::InvalidSize { .. })
        ));
    }

    #[test]
    fn array_length_one_under_the_cap_is_accepted() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(value_tag::U8).unwrap();
        buf.write_u64::<LittleEndian>(1).unwrap();
        buf.write_u8(7).unwrap();
        let mut cursor = Cursor::new(&buf);
        let value = read_metadata_value_of_tag(&mut cursor, value_tag::ARRAY).unwrap();
        assert_eq!(value, MetadataValue::Array(vec![MetadataValue::U8(7)]));
    }

    #[test]
    fn missing_tensor_is_an_error() {
        let bytes = encode_minimal_container();
        let mut path = std::env::temp_dir();
        path.push(format!("gguf_infer_test_missing_{:p}.gguf", &bytes));
        std::fs::write(&path, &bytes).unwrap();

        let reader = ContainerReader::open(&path).unwrap();
        assert!(reader.tensor_bytes("does_not_exist").is_err());

        std::fs::remove_file(&path).ok();
    }
}
