//! Block-exact dequantizers for the three quantized element types. Each
//! function consumes one element type's raw on-disk bytes for a whole
//! tensor and produces `f32` values in logical (unblocked) order.

use half::f16;

const QK_K: usize = 256;

/// `Q4_K_M`: 256 values per 144-byte block (`d: f16, dmin: f16, scales: [u8; 12],
/// qs: [u8; 128]`). Six-bit packed per-32-value scale/min pairs, matching the
/// reference `block_q4_K` layout bit for bit.
pub fn dequantize_q4_k_m(bytes: &[u8], element_count: u64) -> Vec<f32> {
    const BLOCK_BYTES: usize = 144;
    let mut out = Vec::with_capacity(element_count as usize);
    for block in bytes.chunks(BLOCK_BYTES) {
        let d = read_f16(block, 0);
        let dmin = read_f16(block, 2);
        let scales = &block[4..16];
        let qs = &block[16..144];

        let mut is = 0usize;
        let mut q = 0usize;
        let mut values = [0f32; QK_K];
        let mut idx = 0usize;
        while q < 128 {
            let (sc1, m1) = scale_min_k4(is, scales);
            let d1 = d * sc1 as f32;
            let m1v = dmin * m1 as f32;
            let (sc2, m2) = scale_min_k4(is + 1, scales);
            let d2 = d * sc2 as f32;
            let m2v = dmin * m2 as f32;

            for l in 0..32 {
                values[idx] = d1 * (qs[q + l] & 0x0F) as f32 - m1v;
                idx += 1;
            }
            for l in 0..32 {
                values[idx] = d2 * (qs[q + l] >> 4) as f32 - m2v;
                idx += 1;
            }
            q += 32;
            is += 2;
        }
        out.extend_from_slice(&values);
    }
    out.truncate(element_count as usize);
    out
}

fn scale_min_k4(j: usize, q: &[u8]) -> (u8, u8) {
    if j < 4 {
        (q[j] & 63, q[j + 4] & 63)
    } else {
        let d = (q[j + 4] & 0x0F) | ((q[j - 4] >> 6) << 4);
        let m = (q[j + 4] >> 4) | ((q[j] >> 6) << 4);
        (d, m)
    }
}

/// `Q6_K`: 256 values per 210-byte block (`ql: [u8; 128], qh: [u8; 64],
/// scales: [i8; 16], d: f16`), matching the reference `block_q6_K` layout.
pub fn dequantize_q6_k(bytes: &[u8], element_count: u64) -> Vec<f32> {
    const BLOCK_BYTES: usize = 210;
    let mut out = Vec::with_capacity(element_count as usize);
    for block in bytes.chunks(BLOCK_BYTES) {
        let ql = &block[0..128];
        let qh = &block[128..192];
        let scales = &block[192..208];
        let d = read_f16(block, 208);

        let mut values = [0f32; QK_K];
        for n in 0..(QK_K / 128) {
            let ql = &ql[n * 64..];
            let qh = &qh[n * 32..];
            let sc = &scales[n * 8..];
            let y = &mut values[n * 128..(n + 1) * 128];
            for l in 0..32 {
                let is = l / 16;
                let q1 = ((ql[l] & 0x0F) | (((qh[l] >> 0) & 3) << 4)) as i8 - 32;
                let q2 = ((ql[l + 32] & 0x0F) | (((qh[l] >> 2) & 3) << 4)) as i8 - 32;
                let q3 = ((ql[l] >> 4) | (((qh[l] >> 4) & 3) << 4)) as i8 - 32;
                let q4 = ((ql[l + 32] >> 4) | (((qh[l] >> 6) & 3) << 4)) as i8 - 32;
                y[l] = d * sc[is] as f32 * q1 as f32;
                y[l + 32] = d * sc[is + 2] as f32 * q2 as f32;
                y[l + 64] = d * sc[is + 4] as f32 * q3 as f32;
                y[l + 96] = d * sc[is + 6] as f32 * q4 as f32;
            }
        }
        out.extend_from_slice(&values);
    }
    out.truncate(element_count as usize);
    out
}

/// `Q4_K_S`: 256 values per 146-byte block (`d: f16, scales: [u8; 16],
/// qs: [u8; 128]`). Unlike `Q4_K_M` this variant has no reference ggml
/// counterpart at this exact size; it uses symmetric signed 4-bit codes
/// (range -8..=7) with one `u8` scale fraction per 16-value sub-block.
pub fn dequantize_q4_k_s(bytes: &[u8], element_count: u64) -> Vec<f32> {
    const BLOCK_BYTES: usize = 146;
    const SUB_BLOCK: usize = 16;
    let mut out = Vec::with_capacity(element_count as usize);
    for block in bytes.chunks(BLOCK_BYTES) {
        let d = read_f16(block, 0);
        let scales = &block[2..18];
        let qs = &block[18..146];

        let mut values = [0f32; QK_K];
        for byte_idx in 0..128 {
            let byte = qs[byte_idx];
            let lo = (byte & 0x0F) as i8 - 8;
            let hi = (byte >> 4) as i8 - 8;
            let e0 = byte_idx * 2;
            let e1 = e0 + 1;
            let scale0 = scales[e0 / SUB_BLOCK] as f32 / 255.0;
            let scale1 = scales[e1 / SUB_BLOCK] as f32 / 255.0;
            values[e0] = d * scale0 * lo as f32;
            values[e1] = d * scale1 * hi as f32;
        }
        out.extend_from_slice(&values);
    }
    out.truncate(element_count as usize);
    out
}

fn read_f16(bytes: &[u8], offset: usize) -> f32 {
    f16::from_le_bytes([bytes[offset], bytes[offset + 1]]).to_f32()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn q4_k_m_block_decodes_to_256_values() {
        let block = vec![0u8; 144];
        let values = dequantize_q4_k_m(&block, 256);
        assert_eq!(values.len(), 256);
        // An all-zero block has zero scales and mins, so every value is 0.
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn q6_k_block_decodes_to_256_values() {
        let block = vec![0u8; 210];
        let values = dequantize_q6_k(&block, 256);
        assert_eq!(values.len(), 256);
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn q4_k_s_block_decodes_to_256_values() {
        let block = vec![0u8; 146];
        let values = dequantize_q4_k_s(&block, 256);
        assert_eq!(values.len(), 256);
        assert!(values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn q4_k_s_nonzero_scale_and_code_is_nonzero() {
        let mut block = vec![0u8; 146];
        block[0..2].copy_from_slice(&f16::from_f32(1.0).to_le_bytes());
        block[2] = 255; // scale for sub-block 0
        block[18] = 0x0F; // lo nibble = 7, hi nibble = 0
        let values = dequantize_q4_k_s(&block, 256);
        assert!((values[0] - 7.0).abs() < 1e-4);
    }
}
