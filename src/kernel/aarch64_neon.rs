//! NEON translation of the reference `q8conv_ukernel_8x8__neon` kernel
//! (`original_source/src/q8conv/8x8-neon.c`).
//!
//! This is a best-effort port exercised only by inspection, not by this
//! crate's test suite (`kernel::portable::PortableKernel` is the kernel all
//! tests validate against). It keeps the reference's central trick: the
//! final ragged channel group is loaded as a full 8-byte vector and shifted
//! so the out-of-range high lanes read as zero, which requires every
//! `kc`-byte indirection row to have at least 7 bytes of readable memory
//! past its logical end. Callers selecting this kernel must uphold that
//! contract; `portable` does not require it.

use std::arch::aarch64::*;

use super::Kernel;
use crate::requantize::QuantizationParams;

const MR: usize = 8;

#[derive(Default)]
pub struct NeonKernel {
    _private: (),
}

// Safety - NEON is part of the aarch64 baseline instruction set, so no
// runtime feature detection is needed to construct this kernel.
unsafe impl Kernel for NeonKernel {
    fn new() -> Option<Self> {
        Some(NeonKernel { _private: () })
    }

    fn name(&self) -> &'static str {
        "aarch64-neon"
    }

    fn mr(&self) -> usize {
        MR
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
        debug_assert!(mr >= 1 && mr <= MR);
        debug_assert!(nr >= 1 && nr <= 8);
        debug_assert!(indirection.len() >= ks * MR);

        let vb_zero_point = vdup_n_u8(params.kernel_zero_point);
        let va_zero_point = vdup_n_u8(params.input_zero_point);

        let mut w = weights.as_ptr();
        let bias_lo = vld1q_s32(w as *const i32);
        let bias_hi = vld1q_s32(w.add(16) as *const i32);
        let mut acc_lo = [bias_lo; MR];
        let mut acc_hi = [bias_hi; MR];
        w = w.add(32);

        for site in 0..ks {
            let rows: [*const u8; MR] = std::array::from_fn(|m| indirection[site * MR + m]);
            let mut offset = 0usize;

            let mut k = kc;
            while k >= 8 {
                let va: [int16x8_t; MR] = std::array::from_fn(|m| {
                    vreinterpretq_s16_u16(vsubl_u8(vld1_u8(rows[m].add(offset)), va_zero_point))
                });
                offset += 8;

                mac_lane::<0>(&mut acc_lo, &mut acc_hi, &va, false, &mut w, vb_zero_point);
                mac_lane::<1>(&mut acc_lo, &mut acc_hi, &va, false, &mut w, vb_zero_point);
                mac_lane::<2>(&mut acc_lo, &mut acc_hi, &va, false, &mut w, vb_zero_point);
                mac_lane::<3>(&mut acc_lo, &mut acc_hi, &va, false, &mut w, vb_zero_point);
                mac_lane::<0>(&mut acc_lo, &mut acc_hi, &va, true, &mut w, vb_zero_point);
                mac_lane::<1>(&mut acc_lo, &mut acc_hi, &va, true, &mut w, vb_zero_point);
                mac_lane::<2>(&mut acc_lo, &mut acc_hi, &va, true, &mut w, vb_zero_point);
                mac_lane::<3>(&mut acc_lo, &mut acc_hi, &va, true, &mut w, vb_zero_point);

                k -= 8;
            }

            if k != 0 {
                // Loads from `offset - (8 - k)`, i.e. predecremented so the
                // 8-byte vector load straddles the logical `kc` end, then
                // shifts right by `8*(8-k)` bits so the `k` valid channel
                // bytes land in the low lanes and the over-read high bytes
                // (equal to the input zero-point, hence zero after
                // `vsubl_u8`) are shifted out. See the module-level safety
                // note on the over-read contract.
                let shift = vdup_n_s64(-(8 * (8 - k) as i64));
                let va: [int16x8_t; MR] = std::array::from_fn(|m| {
                    let raw = vld1_u8(rows[m].add(offset).sub(8 - k));
                    let shifted = vreinterpret_u8_u64(vshl_u64(vreinterpret_u64_u8(raw), shift));
                    vreinterpretq_s16_u16(vsubl_u8(shifted, va_zero_point))
                });

                for i in 0..k {
                    let use_high = i >= 4;
                    match i % 4 {
                        0 => mac_lane::<0>(&mut acc_lo, &mut acc_hi, &va, use_high, &mut w, vb_zero_point),
                        1 => mac_lane::<1>(&mut acc_lo, &mut acc_hi, &va, use_high, &mut w, vb_zero_point),
                        2 => mac_lane::<2>(&mut acc_lo, &mut acc_hi, &va, use_high, &mut w, vb_zero_point),
                        _ => mac_lane::<3>(&mut acc_lo, &mut acc_hi, &va, use_high, &mut w, vb_zero_point),
                    }
                }
            }
        }

        let mut buf = [0i32; 8];
        for row in 0..mr {
            vst1q_s32(buf.as_mut_ptr(), acc_lo[row]);
            vst1q_s32(buf.as_mut_ptr().add(4), acc_hi[row]);
            let out_row = output.add(row * output_row_stride);
            for col in 0..nr {
                out_row
                    .add(col)
                    .write(crate::requantize::requantize(buf[col], params));
            }
        }
    }
}

/// Multiply-accumulate one input channel (selected by `LANE` of the low or
/// high half of each row's loaded vector, per `use_high`) against the next
/// 8 packed weight bytes, into every row's low/high accumulator halves.
///
/// Advances `*w` by 8 bytes. Mirrors one `{ vb01234567 = vld1_u8(w); ...
/// vmlal_lane_s16(...) }` block of the reference kernel.
#[inline(always)]
#[target_feature(enable = "neon")]
unsafe fn mac_lane<const LANE: i32>(
    acc_lo: &mut [int32x4_t; MR],
    acc_hi: &mut [int32x4_t; MR],
    va: &[int16x8_t; MR],
    use_high: bool,
    w: &mut *const u8,
    vb_zero_point: uint8x8_t,
) {
    let vb = vld1_u8(*w);
    let vxb = vreinterpretq_s16_u16(vsubl_u8(vb, vb_zero_point));
    let vxb_lo = vget_low_s16(vxb);
    let vxb_hi = vget_high_s16(vxb);
    *w = (*w).add(8);

    for m in 0..MR {
        let lane_val = if use_high {
            vget_high_s16(va[m])
        } else {
            vget_low_s16(va[m])
        };
        acc_lo[m] = vmlal_lane_s16::<LANE>(acc_lo[m], vxb_lo, lane_val);
        acc_hi[m] = vmlal_lane_s16::<LANE>(acc_hi[m], vxb_hi, lane_val);
    }
}
