//! The read-only operator descriptor consumed by the indirection planner.
//!
//! This is deliberately a flat, `Copy` struct of plain shape/stride fields
//! rather than a `Tensor`-shaped abstraction: operator configuration and
//! tensor layout discovery are out of scope for this crate (see the crate
//! doc comment), and the planner never needs more than addresses and
//! extents.

/// Geometry and anchors for one convolution-like operator invocation.
///
/// Fields unused by a given planner entry point (e.g. `groups` and
/// `group_input_channels` for depthwise/max-pool, `zero` for max-pool) are
/// simply ignored by that entry point, mirroring how the original reference
/// implementation shares one operator struct across all four plan
/// functions.
#[derive(Clone, Copy, Debug)]
pub struct OperatorGeometry {
    pub groups: usize,
    pub group_input_channels: usize,
    pub batch_size: usize,
    pub input_height: usize,
    pub input_width: usize,
    pub output_height: usize,
    pub output_width: usize,
    pub kernel_height: usize,
    pub kernel_width: usize,
    pub stride_height: usize,
    pub stride_width: usize,
    pub dilation_height: usize,
    pub dilation_width: usize,
    pub pad_top: usize,
    pub pad_left: usize,
    /// Bytes between the start of consecutive pixels along the input's `W`
    /// axis (usually `groups * group_input_channels`).
    pub input_pixel_stride: usize,
    /// Base address of the input tensor's first pixel.
    pub input: *const u8,
    /// Address of a region whose bytes all equal the input zero-point, used
    /// in place of out-of-bounds input addresses. Large enough to alias any
    /// single in-channel row access. Unused by the max-pool planner, which
    /// never substitutes a sentinel.
    pub zero: *const u8,
}

// The geometry is a read-only view into caller-owned memory; sharing it
// across planner invocations that write disjoint index ranges (see the
// crate's concurrency notes) is safe by construction.
unsafe impl Send for OperatorGeometry {}
unsafe impl Sync for OperatorGeometry {}

#[inline]
pub(crate) fn padded_coord(base: usize, tap: usize, dilation: usize, pad: usize) -> usize {
    // Deliberately unsigned: when `base + tap*dilation < pad`, this wraps to
    // a huge value, which then fails the caller's `< extent` range check.
    // That folds the sign test and the upper-bound test into one compare;
    // see the crate's design notes on the unsigned-wrap padding idiom.
    base.wrapping_add(tap.wrapping_mul(dilation))
        .wrapping_sub(pad)
}
