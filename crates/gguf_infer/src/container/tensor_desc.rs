//! Tensor descriptors and the closed element-type variant with its on-disk
//! block geometry.

use crate::error::FormatError;

/// On-disk element type. Closed set — an unknown tag is a parse error, not a
/// silently-ignored variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F32,
    F16,
    F64,
    Q4KS,
    Q4KM,
    Q6K,
}

/// `(block_size, block_bytes)` for an element type: how many logical elements
/// one on-disk block covers, and how many bytes that block occupies.
#[derive(Debug, Clone, Copy)]
pub struct BlockGeometry {
    pub block_size: u64,
    pub block_bytes: u64,
}

impl ElementType {
    pub fn from_tag(tag: u32, tensor_name: &str) -> Result<Self, FormatError> {
        match tag {
            0 => Ok(ElementType::F32),
            1 => Ok(ElementType::F16),
            2 => Ok(ElementType::F64),
            3 => Ok(ElementType::Q4KS),
            4 => Ok(ElementType::Q4KM),
            5 => Ok(ElementType::Q6K),
            _ => Err(FormatError::UnsupportedType {
                name: tensor_name.to_string(),
                tag,
            }),
        }
    }

    pub fn geometry(self) -> BlockGeometry {
        match self {
            ElementType::F32 => BlockGeometry {
                block_size: 1,
                block_bytes: 4,
            },
            ElementType::F16 => BlockGeometry {
                block_size: 1,
                block_bytes: 2,
            },
            ElementType::F64 => BlockGeometry {
                block_size: 1,
                block_bytes: 8,
            },
            ElementType::Q4KS => BlockGeometry {
                block_size: 256,
                block_bytes: 146,
            },
            ElementType::Q4KM => BlockGeometry {
                block_size: 256,
                block_bytes: 144,
            },
            ElementType::Q6K => BlockGeometry {
                block_size: 256,
                block_bytes: 210,
            },
        }
    }

    pub fn is_quantized(self) -> bool {
        matches!(self, ElementType::Q4KS | ElementType::Q4KM | ElementType::Q6K)
    }
}

/// Computes `ceil(element_count / block_size) * block_bytes`.
pub fn byte_size(element_count: u64, element_type: ElementType) -> u64 {
    let geo = element_type.geometry();
    element_count.div_ceil(geo.block_size) * geo.block_bytes
}

#[derive(Debug, Clone)]
pub struct TensorDescriptor {
    pub name: String,
    pub shape: Vec<u64>,
    pub element_type: ElementType,
    /// Offset relative to the start of the tensor-data region.
    pub relative_offset: u64,
}

impl TensorDescriptor {
    pub fn element_count(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn byte_size(&self) -> u64 {
        byte_size(self.element_count(), self.element_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_matches_block_geometry() {
        assert_eq!(byte_size(256, ElementType::Q6K), 210);
        assert_eq!(byte_size(512, ElementType::Q6K), 420);
        // Not an exact multiple of the block size: still rounds up to a whole block.
        assert_eq!(byte_size(1, ElementType::Q4KM), 144);
        assert_eq!(byte_size(4096, ElementType::F32), 4096 * 4);
    }

    #[test]
    fn unknown_tag_is_unsupported_type() {
        let err = ElementType::from_tag(99, "blk.0.attn_q.weight").unwrap_err();
        match err {
            FormatError::UnsupportedType { name, tag } => {
                assert_eq!(name, "blk.0.attn_q.weight");
                assert_eq!(tag, 99);
            }
            _ => panic!("wrong error variant"),
        }
    }
}
