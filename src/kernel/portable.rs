//! A safe, ISA-independent 8x8 indirect GEMM micro-kernel.
//!
//! Unlike the NEON translation of the reference kernel, this implementation
//! never reads past the `kc` logical input/weight bytes for a kernel site:
//! the tail chunk (`kc % 8` channels) is accumulated one channel at a time
//! instead of as a full 8-lane vector op with a shifted-in over-read. The
//! crate's associativity guarantee (channel and kernel-site reduction order
//! never changes the final sum) makes this exactly equivalent to the
//! vectorized reference, just slower; it is the implementation every test in
//! this crate validates against.

use super::Kernel;
use crate::requantize::{requantize, QuantizationParams};

#[derive(Default)]
pub struct PortableKernel {
    _private: (),
}

// Safety - this implementation never reads past the documented `kc` bytes of
// any indirection row or weight chunk, so it does not rely on the crate's
// tail over-read contract at all.
unsafe impl Kernel for PortableKernel {
    fn new() -> Option<Self> {
        Some(PortableKernel { _private: () })
    }

    fn name(&self) -> &'static str {
        "portable"
    }

    fn mr(&self) -> usize {
        8
    }

    fn nr(&self) -> usize {
        8
    }

    unsafe fn run(
        &self,
        output: *mut u8,
        output_row_stride: usize,
        indirection: &[*const u8],
        weights: &[u8],
        kc: usize,
        ks: usize,
        mr: usize,
        nr: usize,
        params: &QuantizationParams,
    ) {
        const MR: usize = 8;
        const NR: usize = 8;
        debug_assert!(mr >= 1 && mr <= MR, "mr out of range: {mr}");
        debug_assert!(nr >= 1 && nr <= NR, "nr out of range: {nr}");
        debug_assert!(indirection.len() >= ks * MR, "indirection buffer too short");
        debug_assert!(
            weights.len() >= crate::weights::PackedWeightsLayout::new(kc, ks).total_bytes(),
            "weights buffer too short for kc={kc} ks={ks}"
        );

        let mut acc = [[0i32; NR]; MR];
        for (n, slot) in acc[0].iter_mut().enumerate() {
            *slot = i32::from_le_bytes(weights[n * 4..n * 4 + 4].try_into().unwrap());
        }
        for row in acc.iter_mut().skip(1) {
            *row = acc[0];
        }

        let mut weight_cursor = NR * 4;
        for site in 0..ks {
            let full_chunks = kc / 8;
            let tail = kc % 8;

            for chunk in 0..full_chunks {
                for lane in 0..8 {
                    let channel = chunk * 8 + lane;
                    let chunk_weights = &weights[weight_cursor..weight_cursor + NR];
                    accumulate_channel(
                        &mut acc,
                        indirection,
                        site,
                        channel,
                        chunk_weights,
                        mr,
                        params,
                    );
                    weight_cursor += NR;
                }
            }
            if tail > 0 {
                for lane in 0..tail {
                    let channel = full_chunks * 8 + lane;
                    let chunk_weights = &weights[weight_cursor..weight_cursor + NR];
                    accumulate_channel(
                        &mut acc,
                        indirection,
                        site,
                        channel,
                        chunk_weights,
                        mr,
                        params,
                    );
                    weight_cursor += NR;
                }
            }
        }

        for row in 0..mr {
            let out_row = output.wrapping_add(row * output_row_stride);
            for col in 0..nr {
                let byte = requantize(acc[row][col], params);
                out_row.wrapping_add(col).write(byte);
            }
        }
    }
}

/// Accumulate one input channel of one kernel site into every output row's
/// accumulator.
///
/// `chunk_weights` holds exactly `NR` bytes, one per output channel, for
/// this `(site, channel)` pair.
#[inline]
unsafe fn accumulate_channel(
    acc: &mut [[i32; 8]; 8],
    indirection: &[*const u8],
    site: usize,
    channel: usize,
    chunk_weights: &[u8],
    mr: usize,
    params: &QuantizationParams,
) {
    const MR: usize = 8;
    for row in 0..mr {
        let input_ptr = indirection[site * MR + row];
        let input_byte = *input_ptr.wrapping_add(channel);
        let input_val = input_byte as i32 - params.input_zero_point as i32;
        for col in 0..8 {
            let weight_val = chunk_weights[col] as i32 - params.kernel_zero_point as i32;
            acc[row][col] += input_val * weight_val;
        }
    }
}
