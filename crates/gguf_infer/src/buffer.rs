//! Device buffer handle: a labelled wrapper around a `candle_core::Tensor`
//! plus the storage class it was allocated under. Allocation failures at
//! the `Private` class retry once against `Shared` before surfacing.

use candle_core::{DType, Device, Tensor};

use crate::error::{EngineError, ResourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    /// Device-private memory, preferred when available.
    Private,
    /// Host-visible memory, used as the allocation fallback and for any
    /// buffer that must be read back to validate or decode.
    Shared,
}

pub struct DeviceBuffer {
    pub label: String,
    pub storage_class: StorageClass,
    pub tensor: Tensor,
}

impl DeviceBuffer {
    pub fn zeros(
        label: impl Into<String>,
        shape: &[usize],
        dtype: DType,
        device: &Device,
    ) -> Result<Self, EngineError> {
        let label = label.into();
        match Tensor::zeros(shape, dtype, device) {
            Ok(tensor) => Ok(DeviceBuffer {
                label,
                storage_class: StorageClass::Private,
                tensor,
            }),
            Err(_) => {
                let tensor = Tensor::zeros(shape, dtype, &Device::Cpu).map_err(|_| {
                    ResourceError::BufferAllocation {
                        label: label.clone(),
                        bytes: shape.iter().product::<usize>() * dtype.size_in_bytes(),
                    }
                })?;
                Ok(DeviceBuffer {
                    label,
                    storage_class: StorageClass::Shared,
                    tensor,
                })
            }
        }
    }

    /// A single-byte placeholder for a zero-element tensor.
    pub fn placeholder(label: impl Into<String>, device: &Device) -> Result<Self, EngineError> {
        let label = label.into();
        let tensor = Tensor::zeros(&[1], DType::U8, device)?;
        Ok(DeviceBuffer {
            label,
            storage_class: StorageClass::Private,
            tensor,
        })
    }

    pub fn from_tensor(label: impl Into<String>, tensor: Tensor, storage_class: StorageClass) -> Self {
        DeviceBuffer {
            label: label.into(),
            storage_class,
            tensor,
        }
    }
}
