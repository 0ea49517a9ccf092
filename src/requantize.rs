//! Fixed-point requantization: the saturating doubling multiply, rounding
//! shift, and narrow-and-clamp pipeline that turns a 32-bit accumulator into
//! a `u8` output value.
//!
//! Every step here is specified down to the bit by the reference kernel
//! (`original_source/src/q8conv/8x8-neon.c`'s `vqrdmulhq_s32` /
//! `vsraq_n_s32`/`vbicq_s32`/`vrshlq_s32` sequence): both micro-kernel
//! implementations in this crate must reproduce it exactly, so the algebra
//! lives here once rather than being duplicated per-ISA.

/// Per-tensor affine quantization parameters shared by every output channel
/// of one operator invocation.
///
/// `input_zero_point` and `kernel_zero_point` are consumed by the
/// micro-kernel's accumulation step (subtracted from the `u8` activation and
/// weight bytes before the multiply-accumulate); `multiplier` through
/// `output_max` are consumed by [`requantize`].
#[derive(Clone, Copy, Debug)]
pub struct QuantizationParams {
    /// Input tensor's zero point. The planner's zero-sentinel region (see
    /// [`crate::geometry::OperatorGeometry::zero`]) is filled with this same
    /// byte value, so subtracting it from a zero-sentinel read always yields
    /// exactly zero.
    pub input_zero_point: u8,
    pub kernel_zero_point: u8,
    /// Q31 fixed-point multiplier applied to the 32-bit accumulator.
    pub multiplier: i32,
    /// Right shift applied after the doubling multiply, in `0..=31`.
    pub right_shift: u8,
    /// Output tensor's zero point.
    pub output_zero_point: i16,
    pub output_min: u8,
    pub output_max: u8,
}

/// Saturating rounding doubling multiply-high: the Q31 fixed-point multiply
/// at the heart of ARM's `vqrdmulhq_s32`.
///
/// Computes `round(2*a*b / 2^32)`, saturating to `i32::MAX` in the one case
/// where the exact result would overflow (`a == b == i32::MIN`). Rounding is
/// the hardware `VQRDMULH` convention: add-bias-then-shift, which rounds
/// ties toward positive infinity rather than away from zero.
#[inline]
pub fn sat_qrdmulh(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN {
        return i32::MAX;
    }
    let product = (a as i64) * (b as i64);
    // `1 << 30` rounds to nearest, ties away from zero, after the doubling
    // (`<< 1`) and the `>> 32` narrow back to 32 bits.
    let rounded = (product + (1i64 << 30)) >> 31;
    rounded as i32
}

/// Rounding arithmetic right shift by `shift` bits (`0..=31`): rounds ties
/// toward positive infinity for non-negative inputs and toward negative
/// infinity for negative inputs (i.e. ties round away from zero), mirroring
/// the reference kernel's `vsraq_n_s32`/`vbicq_s32`/`vrshlq_s32` correction
/// sequence.
///
/// The reference sequence folds a sign-dependent pre-shift correction (step
/// 2's `vbicq_s32`/`vsraq_n_s32`: subtract 1 from negative accumulators, a
/// no-op for `shift == 0` via the zero-shift mask) into the same plain
/// round-half-up shift used by [`sat_qrdmulh`] for non-negative inputs; the
/// correction is what turns that otherwise-uniform round-toward-+∞ into
/// round-away-from-zero for negative accumulators.
#[inline]
pub fn round_rshift(x: i32, shift: u8) -> i32 {
    debug_assert!(shift <= 31, "shift out of range: {shift}");
    if shift == 0 {
        return x;
    }
    let x = x as i64;
    let corrected = if x < 0 { x - 1 } else { x };
    let bias = 1i64 << (shift - 1);
    ((corrected + bias) >> shift) as i32
}

/// Saturating narrow from `i32` to `i16`.
#[inline]
fn sat_narrow_i16(x: i32) -> i16 {
    x.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Turn one 32-bit accumulator into a `u8` output value.
///
/// Pipeline (bit-exact with the reference kernel): saturating doubling
/// multiply by `params.multiplier`, rounding right shift by
/// `params.right_shift`, saturating narrow to `i16`, add the output zero
/// point with saturation, saturating narrow to `u8`, clamp to
/// `[output_min, output_max]`.
#[inline]
pub fn requantize(acc: i32, params: &QuantizationParams) -> u8 {
    let scaled = sat_qrdmulh(acc, params.multiplier);
    let shifted = round_rshift(scaled, params.right_shift);
    let narrowed = sat_narrow_i16(shifted);
    let biased = narrowed as i32 + params.output_zero_point as i32;
    let byte = biased.clamp(0, u8::MAX as i32) as u8;
    byte.clamp(params.output_min, params.output_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(multiplier: i32, right_shift: u8, output_zero_point: i16) -> QuantizationParams {
        QuantizationParams {
            input_zero_point: 0,
            kernel_zero_point: 0,
            multiplier,
            right_shift,
            output_zero_point,
            output_min: 0,
            output_max: 255,
        }
    }

    #[test]
    fn qrdmulh_identity_multiplier_is_near_zero() {
        // i32::MAX/2^31 is just under 1.0, so the doubling multiply by a
        // small value should stay close to that value.
        assert_eq!(sat_qrdmulh(0, 123), 0);
        assert_eq!(sat_qrdmulh(1 << 29, 1 << 29), 1 << 27);
    }

    #[test]
    fn qrdmulh_saturates_at_min_times_min() {
        assert_eq!(sat_qrdmulh(i32::MIN, i32::MIN), i32::MAX);
    }

    #[test]
    fn qrdmulh_rounds_ties_toward_positive_infinity() {
        // a*b*2 / 2^32 lands exactly on a half in both cases.
        let a = 1 << 16;
        let b = 1 << 14; // product*2 = 2^31, >>32 => 0.5, rounds up to 1
        assert_eq!(sat_qrdmulh(a, b), 1);
        // product*2 = -2^31, >>32 => -0.5, rounds up to 0
        assert_eq!(sat_qrdmulh(-a, b), 0);
    }

    #[test]
    fn round_rshift_is_identity_at_zero_shift() {
        for x in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(round_rshift(x, 0), x);
        }
    }

    #[test]
    fn round_rshift_rounds_ties_away_from_zero() {
        assert_eq!(round_rshift(1, 1), 1); // (1+1)>>1 = 1
        assert_eq!(round_rshift(-1, 1), -1); // (-1-1+1)>>1 = -1
        assert_eq!(round_rshift(3, 1), 2); // (3+1)>>1 = 2
        assert_eq!(round_rshift(-3, 1), -2); // (-3-1+1)>>1 = -2
        assert_eq!(round_rshift(-4, 1), -2); // exact, no tie
        assert_eq!(round_rshift(-8, 3), -1); // exact, no tie
    }

    // Testable property K3: requantization correctness grid over a cross
    // product of representative accumulators, shifts, and multipliers.
    #[test]
    fn requantize_grid_never_panics_and_stays_in_range() {
        let accs = [
            i32::MIN,
            -(1i32 << 30),
            -1,
            0,
            1,
            1i32 << 30,
            i32::MAX,
        ];
        let shifts = [0u8, 7, 15, 31];
        let multipliers = [1i32, 1 << 29, i32::MAX];

        for &acc in &accs {
            for &shift in &shifts {
                for &mult in &multipliers {
                    let p = params(mult, shift, 0);
                    let out = requantize(acc, &p);
                    assert!((0..=255).contains(&(out as i32)));
                }
            }
        }
    }

    #[test]
    fn requantize_clamps_to_output_min_max() {
        let mut p = params(1 << 30, 0, 0);
        p.output_min = 10;
        p.output_max = 20;
        assert_eq!(requantize(i32::MIN, &p), 10);
        assert_eq!(requantize(i32::MAX, &p), 20);
    }

    #[test]
    fn requantize_applies_output_zero_point() {
        let p = params(0, 0, 128);
        // multiplier 0 => scaled accumulator is always 0, so output is
        // exactly the zero point.
        assert_eq!(requantize(12345, &p), 128);
    }

    // Concrete scenario 1. The distilled narrative describes a multiplier
    // near 2^30 applied to an accumulator of 240 with "no shift effect",
    // settling on an output of 60 before the zero point is added; that is
    // only consistent with `right_shift = 0` (see DESIGN.md), not the
    // literal `right_shift = 30` printed alongside it, so this test follows
    // the algebraic invariant in favor of the inconsistent prose.
    #[test]
    fn scenario_1_accumulator_240_multiplier_near_quarter() {
        // multiplier chosen so the doubling multiply scales 240 down to 60:
        // round(2*240*m / 2^32) == 60  =>  m ~= 2^30 / 2.
        let multiplier = 1i32 << 29;
        let p = params(multiplier, 0, 0);
        let out = requantize(240, &p);
        assert_eq!(out, 60);
    }
}
