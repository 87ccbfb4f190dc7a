//! Metadata value tags and the typed map they decode into.

use std::collections::HashMap;

use crate::error::{EngineError, FormatError};

pub const MAX_STRING_LEN: u64 = 1_000_000_000;
pub const MAX_ARRAY_LEN: u64 = 5_000_000;

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Array(Vec<MetadataValue>),
}

impl MetadataValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            MetadataValue::U8(_) => "u8",
            MetadataValue::I8(_) => "i8",
            MetadataValue::U16(_) => "u16",
            MetadataValue::I16(_) => "i16",
            MetadataValue::U32(_) => "u32",
            MetadataValue::I32(_) => "i32",
            MetadataValue::U64(_) => "u64",
            MetadataValue::I64(_) => "i64",
            MetadataValue::F32(_) => "f32",
            MetadataValue::F64(_) => "f64",
            MetadataValue::Bool(_) => "bool",
            MetadataValue::String(_) => "string",
            MetadataValue::Array(_) => "array",
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            MetadataValue::U8(v) => Some(v as u64),
            MetadataValue::U16(v) => Some(v as u64),
            MetadataValue::U32(v) => Some(v as u64),
            MetadataValue::U64(v) => Some(v),
            MetadataValue::I8(v) if v >= 0 => Some(v as u64),
            MetadataValue::I16(v) if v >= 0 => Some(v as u64),
            MetadataValue::I32(v) if v >= 0 => Some(v as u64),
            MetadataValue::I64(v) if v >= 0 => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            MetadataValue::F32(v) => Some(v as f64),
            MetadataValue::F64(v) => Some(v),
            _ => self.as_u64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            MetadataValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

pub type MetadataMap = HashMap<String, MetadataValue>;

/// Typed accessors over the raw metadata map, used by the hyperparameter
/// resolver and the tokenizer. Kept separate from `MetadataValue` so callers
/// get `FormatError` variants that name the offending key.
pub struct Metadata<'a>(pub &'a MetadataMap);

impl<'a> Metadata<'a> {
    pub fn require(&self, key: &str) -> Result<&'a MetadataValue, EngineError> {
        self.0
            .get(key)
            .ok_or_else(|| FormatError::MissingMetadata(key.to_string()).into())
    }

    pub fn get_u64(&self, key: &str) -> Result<u64, EngineError> {
        let value = self.require(key)?;
        value.as_u64().ok_or_else(|| {
            FormatError::InvalidMetadataType {
                key: key.to_string(),
                expected: "unsigned integer",
            }
            .into()
        })
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, EngineError> {
        let value = self.require(key)?;
        value.as_f64().ok_or_else(|| {
            FormatError::InvalidMetadataType {
                key: key.to_string(),
                expected: "number",
            }
            .into()
        })
    }

    pub fn get_str(&self, key: &str) -> Result<&'a str, EngineError> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| {
            FormatError::InvalidMetadataType {
                key: key.to_string(),
                expected: "string",
            }
            .into()
        })
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, EngineError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(value) => value.as_bool().ok_or_else(|| {
                FormatError::InvalidMetadataType {
                    key: key.to_string(),
                    expected: "bool",
                }
                .into()
            }),
        }
    }

    pub fn get_u64_or(&self, key: &str, default: u64) -> Result<u64, EngineError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(_) => self.get_u64(key),
        }
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> Result<f64, EngineError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(_) => self.get_f64(key),
        }
    }

    pub fn get_str_or<'b>(&'b self, key: &str, default: &'b str) -> Result<&'b str, EngineError>
    where
        'a: 'b,
    {
        match self.0.get(key) {
            None => Ok(default),
            Some(_) => self.get_str(key),
        }
    }

    /// String array values (e.g. the vocabulary), element-wise.
    pub fn get_string_array(&self, key: &str) -> Result<Vec<String>, EngineError> {
        let value = self.require(key)?;
        match value {
            MetadataValue::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        FormatError::InvalidMetadataType {
                            key: key.to_string(),
                            expected: "array of strings",
                        }
                        .into()
                    })
                })
                .collect(),
            _ => Err(FormatError::InvalidMetadataType {
                key: key.to_string(),
                expected: "array of strings",
            }
            .into()),
        }
    }
}
