//! Weight materializer (C4): dequantizes and converts on-disk tensors into
//! device buffers at a requested precision, behind a dual cache so repeated
//! requests for the same `(name, precision)` are free after the first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use candle_core::{DType, Device, Tensor};

use crate::buffer::DeviceBuffer;
use crate::container::{ContainerReader, ElementType};
use crate::error::{EngineError, FormatError, NumericalError};
use crate::primitives;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationLevel {
    None,
    /// Samples the first and last `sample_size` elements.
    Partial(usize),
    Full,
}

struct Caches {
    raw: HashMap<String, Arc<DeviceBuffer>>,
    processed: HashMap<(String, DType), Arc<DeviceBuffer>>,
}

pub struct Materializer {
    caches: Mutex<Caches>,
    device: Device,
    validation: ValidationLevel,
}

impl Materializer {
    pub fn new(device: Device, validation: ValidationLevel) -> Self {
        Materializer {
            caches: Mutex::new(Caches {
                raw: HashMap::new(),
                processed: HashMap::new(),
            }),
            device,
            validation,
        }
    }

    /// Returns the device buffer for `name` dequantized/converted to
    /// `target`, computing and caching it on first request. The heavy work
    /// happens outside the cache lock; a race produces duplicate work, not
    /// duplicate state, because dequantization is deterministic.
    pub fn materialize(
        &self,
        reader: &ContainerReader,
        name: &str,
        target: DType,
    ) -> Result<Arc<DeviceBuffer>, EngineError> {
        if let Some(buffer) = self.lookup_processed(name, target) {
            return Ok(buffer);
        }

        let desc = reader.tensor_descriptor(name)?;
        let element_count = desc.element_count();

        if element_count == 0 {
            let buffer = Arc::new(DeviceBuffer::placeholder(
                format!("{name}@{target:?}"),
                &self.device,
            )?);
            self.insert_processed(name, target, buffer.clone());
            return Ok(buffer);
        }

        // The raw cache only ever holds buffers that needed no GPU dispatch
        // to produce: an identity copy or the F64->F32 CPU path. Those are
        // cheap enough to key by name alone and reuse across targets.
        let is_raw_eligible = matches!(
            (desc.element_type, target),
            (ElementType::F32, DType::F32) | (ElementType::F16, DType::F16)
        ) || desc.element_type == ElementType::F64;

        if is_raw_eligible {
            if let Some(buffer) = self.lookup_raw(name) {
                self.insert_processed(name, target, buffer.clone());
                return Ok(buffer);
            }
        }

        let tensor = self.convert(reader, name, target)?;
        self.validate(name, &tensor)?;

        let buffer = Arc::new(DeviceBuffer::from_tensor(
            format!("{name}@{target:?}"),
            tensor,
            crate::buffer::StorageClass::Shared,
        ));
        if is_raw_eligible {
            self.insert_raw(name, buffer.clone());
        }
        self.insert_processed(name, target, buffer.clone());
        Ok(buffer)
    }

    fn lookup_processed(&self, name: &str, target: DType) -> Option<Arc<DeviceBuffer>> {
        let caches = self.caches.lock().expect("materializer cache poisoned");
        caches.processed.get(&(name.to_string(), target)).cloned()
    }

    fn insert_processed(&self, name: &str, target: DType, buffer: Arc<DeviceBuffer>) {
        let mut caches = self.caches.lock().expect("materializer cache poisoned");
        caches
            .processed
            .entry((name.to_string(), target))
            .or_insert(buffer);
    }

    fn lookup_raw(&self, name: &str) -> Option<Arc<DeviceBuffer>> {
        let caches = self.caches.lock().expect("materializer cache poisoned");
        caches.raw.get(name).cloned()
    }

    fn insert_raw(&self, name: &str, buffer: Arc<DeviceBuffer>) {
        let mut caches = self.caches.lock().expect("materializer cache poisoned");
        caches.raw.entry(name.to_string()).or_insert(buffer);
    }

    fn convert(
        &self,
        reader: &ContainerReader,
        name: &str,
        target: DType,
    ) -> Result<Tensor, EngineError> {
        let desc = reader.tensor_descriptor(name)?;
        let shape: Vec<usize> = desc.shape.iter().map(|&d| d as usize).collect();
        let element_count = desc.element_count();
        let bytes = reader.tensor_bytes(name)?;

        let on_disk_matches_target = matches!(
            (desc.element_type, target),
            (ElementType::F32, DType::F32) | (ElementType::F16, DType::F16)
        );
        if on_disk_matches_target {
            let values = raw_values_as_f32(bytes, desc.element_type, element_count);
            return Tensor::from_vec(values, shape.as_slice(), &self.device)?
                .to_dtype(target)
                .map_err(EngineError::from);
        }

        if desc.element_type == ElementType::F64 {
            if target != DType::F32 {
                return Err(FormatError::UnsupportedTensorType {
                    on_disk: "f64",
                    target: "f16",
                }
                .into());
            }
            let values = f64_bytes_to_f32(bytes);
            return Tensor::from_vec(values, shape.as_slice(), &self.device).map_err(EngineError::from);
        }

        if desc.element_type == ElementType::F32 && target == DType::F16 {
            return Err(FormatError::UnsupportedTensorType {
                on_disk: "f32",
                target: "f16",
            }
            .into());
        }

        let f32_values = match desc.element_type {
            ElementType::Q4KS => primitives::dequantize_q4_k_s(bytes, element_count),
            ElementType::Q4KM => primitives::dequantize_q4_k_m(bytes, element_count),
            ElementType::Q6K => primitives::dequantize_q6_k(bytes, element_count),
            ElementType::F16 => raw_values_as_f32(bytes, ElementType::F16, element_count),
            ElementType::F32 => raw_values_as_f32(bytes, ElementType::F32, element_count),
            ElementType::F64 => unreachable!("handled above"),
        };

        let tensor = Tensor::from_vec(f32_values, shape.as_slice(), &self.device)?;
        match target {
            DType::F32 => Ok(tensor),
            DType::F16 => tensor.to_dtype(DType::F16).map_err(EngineError::from),
            _ => Err(FormatError::UnsupportedTensorType {
                on_disk: element_type_name(desc.element_type),
                target: "unknown",
            }
            .into()),
        }
    }

    fn validate(&self, name: &str, tensor: &Tensor) -> Result<(), EngineError> {
        let values = tensor.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
        let invalid = |v: &f32| v.is_nan() || v.is_infinite();

        let has_invalid = match self.validation {
            ValidationLevel::None => false,
            ValidationLevel::Full => values.iter().any(invalid),
            ValidationLevel::Partial(sample_size) => {
                let head = values.iter().take(sample_size);
                let tail = values.iter().rev().take(sample_size);
                head.chain(tail).any(invalid)
            }
        };

        if has_invalid {
            return Err(NumericalError::DequantizationFailed {
                tensor: name.to_string(),
                target: "f32",
            }
            .into());
        }
        Ok(())
    }
}

fn element_type_name(element_type: ElementType) -> &'static str {
    match element_type {
        ElementType::F32 => "f32",
        ElementType::F16 => "f16",
        ElementType::F64 => "f64",
        ElementType::Q4KS => "q4_k_s",
        ElementType::Q4KM => "q4_k_m",
        ElementType::Q6K => "q6_k",
    }
}

fn raw_values_as_f32(bytes: &[u8], element_type: ElementType, element_count: u64) -> Vec<f32> {
    match element_type {
        ElementType::F32 => bytes
            .chunks(4)
            .take(element_count as usize)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        ElementType::F16 => bytes
            .chunks(2)
            .take(element_count as usize)
            .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
            .collect(),
        _ => unreachable!("raw_values_as_f32 only handles unblocked types"),
    }
}

fn f64_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks(8)
        .map(|c| {
            f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
        })
        .collect()
}
