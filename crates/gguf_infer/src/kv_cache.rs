//! Incremental KV cache, indexed by `(layer, position, head, dim)`. Owned
//! exclusively by the inference engine: the engine is the only writer, and
//! reads happen only within that same engine's forward pass.

use candle_core::{DType, Device, Tensor};
use half::f16;

use crate::buffer::StorageClass;
use crate::error::EngineError;

/// Stored at F16 to match the cache's data-model element type; read back as
/// F32 so the rest of the forward pass's matmuls never need to special-case
/// cache dtype.
pub struct KvCache {
    num_layers: usize,
    max_sequence_length: usize,
    num_kv_heads: usize,
    head_dim: usize,
    k: Vec<f16>,
    v: Vec<f16>,
    pub storage_class: StorageClass,
    device: Device,
}

impl KvCache {
    /// Prefers device-private storage; callers fall back to `Shared` by
    /// retrying construction against a CPU device on allocation failure.
    pub fn new(
        num_layers: usize,
        max_sequence_length: usize,
        num_kv_heads: usize,
        head_dim: usize,
        device: Device,
        storage_class: StorageClass,
    ) -> Result<Self, EngineError> {
        let capacity = num_layers * max_sequence_length * num_kv_heads * head_dim;
        Ok(KvCache {
            num_layers,
            max_sequence_length,
            num_kv_heads,
            head_dim,
            k: vec![f16::ZERO; capacity],
            v: vec![f16::ZERO; capacity],
            storage_class,
            device,
        })
    }

    fn slot_len(&self) -> usize {
        self.num_kv_heads * self.head_dim
    }

    fn slot_offset(&self, layer: usize, position: usize) -> usize {
        (layer * self.max_sequence_length + position) * self.slot_len()
    }

    pub fn max_sequence_length(&self) -> usize {
        self.max_sequence_length
    }

    /// Writes the K/V rows for one layer at one position. `k_row`/`v_row`
    /// each have length `num_kv_heads * head_dim`.
    pub fn write(&mut self, layer: usize, position: usize, k_row: &[f32], v_row: &[f32]) {
        let offset = self.slot_offset(layer, position);
        let len = self.slot_len();
        for (dst, &src) in self.k[offset..offset + len].iter_mut().zip(k_row) {
            *dst = f16::from_f32(src);
        }
        for (dst, &src) in self.v[offset..offset + len].iter_mut().zip(v_row) {
            *dst = f16::from_f32(src);
        }
    }

    /// Keys for layer `layer` across positions `[0, seq_len)`, shaped
    /// `[seq_len, num_kv_heads, head_dim]`.
    pub fn keys_upto(&self, layer: usize, seq_len: usize) -> Result<Tensor, EngineError> {
        self.slice_upto(&self.k, layer, seq_len)
    }

    pub fn values_upto(&self, layer: usize, seq_len: usize) -> Result<Tensor, EngineError> {
        self.slice_upto(&self.v, layer, seq_len)
    }

    fn slice_upto(&self, data: &[f16], layer: usize, seq_len: usize) -> Result<Tensor, EngineError> {
        let start = self.slot_offset(layer, 0);
        let len = seq_len * self.slot_len();
        let values: Vec<f32> = data[start..start + len].iter().map(|v| v.to_f32()).collect();
        Tensor::from_vec(values, (seq_len, self.num_kv_heads, self.head_dim), &self.device)
            .map_err(EngineError::from)
    }

    pub fn dtype(&self) -> DType {
        DType::F16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_through_f16() {
        let mut cache =
            KvCache::new(1, 2, 2, 2, Device::Cpu, StorageClass::Shared).unwrap();
        assert_eq!(cache.dtype(), DType::F16);

        let k_row = [1.0f32, 2.0, 3.0, 4.0];
        let v_row = [5.0f32, 6.0, 7.0, 8.0];
        cache.write(0, 0, &k_row, &v_row);

        let keys = cache.keys_upto(0, 1).unwrap();
        let values: Vec<f32> = keys.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }
}
