//! The indirection planner: rewrites a convolution/pooling footprint into a
//! flat array of input-row pointers, so the micro-kernel never has to
//! materialize an im2col buffer.
//!
//! Each of the four `plan_*` functions below is embarrassingly parallel over
//! its own outer axes (group/image/tile for conv-like plans, image/row for
//! depthwise and max-pool): two calls that write disjoint slices of
//! `indirection_buffer` never race, so a caller may shard these across a
//! thread pool freely.

use crate::geometry::{padded_coord, OperatorGeometry};
use crate::pointer_math::FastDivisor;

/// Populate `indirection_buffer` for a direct (grouped) 2D convolution.
///
/// `output_tile_size` is the micro-kernel's row tile size (`MR`).
/// `tiled_output_size` is `MR * ceil(output_height * output_width / MR)`.
///
/// `indirection_buffer` must have at least
/// `geo.groups * geo.batch_size * tiled_output_size * geo.kernel_height *
/// geo.kernel_width` entries.
pub fn plan_conv2d(
    indirection_buffer: &mut [*const u8],
    geo: &OperatorGeometry,
    output_tile_size: usize,
    tiled_output_size: usize,
) {
    let output_size = geo.output_height * geo.output_width;
    let kernel_size = geo.kernel_height * geo.kernel_width;
    let output_width_divisor = FastDivisor::new(geo.output_width);

    for group in 0..geo.groups {
        for image in 0..geo.batch_size {
            let mut tile_start = 0;
            while tile_start < tiled_output_size {
                for tile_offset in 0..output_tile_size {
                    let tiled_output_index = tile_start + tile_offset;
                    let output_index = tiled_output_index.min(output_size - 1);
                    let (output_y, output_x) = output_width_divisor.divmod(output_index);

                    for kernel_y in 0..geo.kernel_height {
                        let input_y =
                            padded_coord(output_y * geo.stride_height, kernel_y, geo.dilation_height, geo.pad_top);
                        let y_in_range = input_y < geo.input_height;

                        for kernel_x in 0..geo.kernel_width {
                            let index = (group * geo.batch_size + image) * tiled_output_size * kernel_size
                                + tile_start * kernel_size
                                + (kernel_y * geo.kernel_width + kernel_x) * output_tile_size
                                + tile_offset;

                            let entry = if y_in_range {
                                let input_x = padded_coord(
                                    output_x * geo.stride_width,
                                    kernel_x,
                                    geo.dilation_width,
                                    geo.pad_left,
                                );
                                if input_x < geo.input_width {
                                    geo.input
                                        .wrapping_add(
                                            image * geo.input_height * geo.input_width * geo.input_pixel_stride,
                                        )
                                        .wrapping_add((input_y * geo.input_width + input_x) * geo.input_pixel_stride)
                                        .wrapping_add(group * geo.group_input_channels)
                                } else {
                                    geo.zero
                                }
                            } else {
                                geo.zero
                            };

                            indirection_buffer[index] = entry;
                        }
                    }
                }
                tile_start += output_tile_size;
            }
        }
    }
}

/// Populate `indirection_buffer` for a depthwise 2D convolution.
///
/// `step_height` and `step_width` describe how the caller will stride the
/// indirect buffer while evaluating the depthwise micro-kernel; the index
/// formula these imply is `(image*output_height + output_y)*step_height +
/// output_x*step_width*kernel_height + kernel_x*kernel_height + kernel_y`
/// (note `kernel_x`/`kernel_y` are swapped versus the direct-conv plan,
/// since the depthwise micro-kernel steps fastest over `kernel_y`).
///
/// `indirection_buffer` must have at least
/// `geo.batch_size * geo.output_height * step_height` entries, where
/// `step_height >= output_width * step_width * geo.kernel_height`.
pub fn plan_depthwise2d(
    indirection_buffer: &mut [*const u8],
    geo: &OperatorGeometry,
    batch_start: usize,
    step_height: usize,
    step_width: usize,
) {
    for image in batch_start..geo.batch_size {
        for output_y in 0..geo.output_height {
            for kernel_y in 0..geo.kernel_height {
                let input_y = padded_coord(
                    output_y * geo.stride_height,
                    kernel_y,
                    geo.dilation_height,
                    geo.pad_top,
                );
                let y_in_range = input_y < geo.input_height;

                for output_x in 0..geo.output_width {
                    for kernel_x in 0..geo.kernel_width {
                        let index = (image * geo.output_height + output_y) * step_height
                            + output_x * step_width * geo.kernel_height
                            + kernel_x * geo.kernel_height
                            + kernel_y;

                        let entry = if y_in_range {
                            let input_x = padded_coord(
                                output_x * geo.stride_width,
                                kernel_x,
                                geo.dilation_width,
                                geo.pad_left,
                            );
                            if input_x < geo.input_width {
                                geo.input.wrapping_add(
                                    (image * geo.input_height + input_y) * geo.input_width * geo.input_pixel_stride
                                        + input_x * geo.input_pixel_stride,
                                )
                            } else {
                                geo.zero
                            }
                        } else {
                            geo.zero
                        };

                        indirection_buffer[index] = entry;
                    }
                }
            }
        }
    }
}

/// Populate `indirection_buffer` for a transposed (deconv) 2D convolution.
///
/// Tiling parameters are the same shape as [`plan_conv2d`]'s. An entry is
/// only valid when the output pixel is reachable from the given kernel tap
/// by stride scatter in both dimensions; otherwise it is the zero sentinel.
pub fn plan_deconv2d(
    indirection_buffer: &mut [*const u8],
    geo: &OperatorGeometry,
    output_tile_size: usize,
    tiled_output_size: usize,
) {
    let output_size = geo.output_height * geo.output_width;
    let kernel_size = geo.kernel_height * geo.kernel_width;
    let stride_height_divisor = FastDivisor::new(geo.stride_height);
    let stride_width_divisor = FastDivisor::new(geo.stride_width);

    for group in 0..geo.groups {
        for image in 0..geo.batch_size {
            let mut tile_start = 0;
            while tile_start < tiled_output_size {
                for tile_offset in 0..output_tile_size {
                    let tiled_output_index = tile_start + tile_offset;
                    let output_index = tiled_output_index.min(output_size - 1);
                    let output_y = output_index / geo.output_width;
                    let output_x = output_index % geo.output_width;

                    for kernel_y in 0..geo.kernel_height {
                        // `y`/`x` use the same unsigned-wrap idiom as
                        // `padded_coord`: an out-of-range tap wraps to a huge
                        // value and fails the subsequent `< input_height`
                        // check. See the open question recorded in
                        // DESIGN.md about making this explicit instead.
                        let y = output_y
                            .wrapping_add(geo.pad_top)
                            .wrapping_sub(kernel_y.wrapping_mul(geo.dilation_height));
                        let (input_y, y_rem) = stride_height_divisor.divmod(y);

                        for kernel_x in 0..geo.kernel_width {
                            let x = output_x
                                .wrapping_add(geo.pad_left)
                                .wrapping_sub(kernel_x.wrapping_mul(geo.dilation_width));
                            let (input_x, x_rem) = stride_width_divisor.divmod(x);

                            let index = (group * geo.batch_size + image) * tiled_output_size * kernel_size
                                + tile_start * kernel_size
                                + (kernel_y * geo.kernel_width + kernel_x) * output_tile_size
                                + tile_offset;

                            let valid = y_rem == 0
                                && input_y < geo.input_height
                                && x_rem == 0
                                && input_x < geo.input_width;

                            let entry = if valid {
                                geo.input
                                    .wrapping_add(
                                        (image * geo.input_height + input_y) * geo.input_width
                                            * geo.input_pixel_stride,
                                    )
                                    .wrapping_add(input_x * geo.input_pixel_stride)
                                    .wrapping_add(group * geo.group_input_channels)
                            } else {
                                geo.zero
                            };

                            indirection_buffer[index] = entry;
                        }
                    }
                }
                tile_start += output_tile_size;
            }
        }
    }
}

/// Populate `indirection_buffer` for a 2D max-pool.
///
/// Unlike the other three plans, max-pool never writes the zero sentinel:
/// out-of-bounds sites are clamped to the nearest in-bounds input pixel
/// (replication padding), per the operation's semantics.
pub fn plan_maxpool2d(
    indirection_buffer: &mut [*const u8],
    geo: &OperatorGeometry,
    batch_start: usize,
    step_height: usize,
    step_width: usize,
) {
    use crate::pointer_math::doz;

    for image in batch_start..geo.batch_size {
        for output_y in 0..geo.output_height {
            for kernel_y in 0..geo.kernel_height {
                let input_y = doz(
                    output_y * geo.stride_height + kernel_y * geo.dilation_height,
                    geo.pad_top,
                );
                let clamped_input_y = input_y.min(geo.input_height - 1);

                for output_x in 0..geo.output_width {
                    for kernel_x in 0..geo.kernel_width {
                        let input_x = doz(
                            output_x * geo.stride_width + kernel_x * geo.dilation_width,
                            geo.pad_left,
                        );
                        let clamped_input_x = input_x.min(geo.input_width - 1);

                        let index = (image * geo.output_height + output_y) * step_height
                            + output_x * step_width * geo.kernel_height
                            + kernel_x * geo.kernel_height
                            + kernel_y;

                        let entry = geo.input.wrapping_add(
                            (image * geo.input_height + clamped_input_y) * geo.input_width * geo.input_pixel_stride
                                + clamped_input_x * geo.input_pixel_stride,
                        );

                        indirection_buffer[index] = entry;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    fn base_geo(input: *const u8, zero: *const u8) -> OperatorGeometry {
        OperatorGeometry {
            groups: 1,
            group_input_channels: 1,
            batch_size: 1,
            input_height: 4,
            input_width: 4,
            output_height: 4,
            output_width: 4,
            kernel_height: 3,
            kernel_width: 3,
            stride_height: 1,
            stride_width: 1,
            dilation_height: 1,
            dilation_width: 1,
            pad_top: 1,
            pad_left: 1,
            input_pixel_stride: 1,
            input,
            zero,
        }
    }

    // Scenario 2: 3x3 conv on a 4x4 input, padding 1, stride 1, groups=batch=IC=1.
    // Corner output (0,0) has 4 valid pointers (ky,kx in {1,2}) and 5 zero
    // entries (ky==0 or kx==0).
    #[test]
    fn direct_conv_corner_padding() {
        let input = [0u8; 16];
        let zero = 0xFFu8;
        let geo = base_geo(input.as_ptr(), &zero as *const u8);

        let mr = 4; // output tile size
        let output_size = geo.output_height * geo.output_width;
        let tiled = mr * output_size.div_ceil(mr);
        let mut buf = vec![ptr::null::<u8>(); geo.groups * geo.batch_size * tiled * 9];

        plan_conv2d(&mut buf, &geo, mr, tiled);

        // output pixel (0,0) is tile_offset 0 of the first tile.
        let mut zero_count = 0;
        let mut valid_count = 0;
        for ky in 0..3 {
            for kx in 0..3 {
                let index = (ky * 3 + kx) * mr + 0;
                let ptr = buf[index];
                if ptr == geo.zero {
                    zero_count += 1;
                } else {
                    valid_count += 1;
                    assert!(ky >= 1 && kx >= 1, "non-zero entry at ky={ky} kx={kx}");
                }
            }
        }
        assert_eq!(valid_count, 4);
        assert_eq!(zero_count, 5);
    }

    // Scenario 4: 3x3 max-pool stride 1 on a 4x4 input, padding 1: output
    // (0,0) has nine entries, all valid (never the zero sentinel), with
    // replication at the boundary (input (0,0) appears three times).
    #[test]
    fn maxpool_clamps_instead_of_zeroing() {
        let input = [0u8; 16];
        let geo = OperatorGeometry {
            zero: ptr::null(),
            ..base_geo(input.as_ptr(), ptr::null())
        };

        let step_width = 3; // kernel_width
        let step_height = geo.output_width * step_width * geo.kernel_height;
        let mut buf = vec![ptr::null::<u8>(); geo.batch_size * geo.output_height * step_height];

        plan_maxpool2d(&mut buf, &geo, 0, step_height, step_width);

        let origin = input.as_ptr();
        let mut origin_count = 0;
        for kx in 0..3 {
            for ky in 0..3 {
                let index = 0 * step_height + 0 * step_width * geo.kernel_height + kx * geo.kernel_height + ky;
                let ptr = buf[index];
                assert!(!ptr.is_null());
                if ptr == origin {
                    origin_count += 1;
                }
            }
        }
        assert_eq!(origin_count, 3);
    }

    // Scenario 3: 2x2 stride-2 transposed conv on a 2x2 input producing a
    // 4x4 output, no padding: output pixel (0,0) has exactly one valid
    // input pointer (ky=kx=0) and three zero entries.
    #[test]
    fn deconv_stride_scatter() {
        let input = [0u8; 4];
        let zero = 0xFFu8;
        let geo = OperatorGeometry {
            input_height: 2,
            input_width: 2,
            output_height: 4,
            output_width: 4,
            kernel_height: 2,
            kernel_width: 2,
            stride_height: 2,
            stride_width: 2,
            pad_top: 0,
            pad_left: 0,
            ..base_geo(input.as_ptr(), &zero as *const u8)
        };

        let mr = 4;
        let output_size = geo.output_height * geo.output_width;
        let tiled = mr * output_size.div_ceil(mr);
        let mut buf = vec![ptr::null::<u8>(); tiled * 4];

        plan_deconv2d(&mut buf, &geo, mr, tiled);

        let mut valid = 0;
        for ky in 0..2 {
            for kx in 0..2 {
                let index = (ky * 2 + kx) * mr + 0;
                if buf[index] != geo.zero {
                    valid += 1;
                    assert_eq!(ky, 0);
                    assert_eq!(kx, 0);
                }
            }
        }
        assert_eq!(valid, 1);
    }

    // Property P4: padded tile positions replicate the last real output
    // pixel's entries exactly.
    #[test]
    fn tile_tail_replicates_last_pixel() {
        let input = [0u8; 16];
        let zero = 0xFFu8;
        let geo = base_geo(input.as_ptr(), &zero as *const u8);

        let mr = 8; // doesn't divide 16 evenly in a way that matters, but
                    // forces the tile count past output_size for H=W=2.
        let geo = OperatorGeometry {
            output_height: 2,
            output_width: 2,
            ..geo
        };
        let output_size = geo.output_height * geo.output_width; // 4
        let tiled = mr * output_size.div_ceil(mr); // 8

        let mut buf = vec![ptr::null::<u8>(); tiled * 9];
        plan_conv2d(&mut buf, &geo, mr, tiled);

        for ky in 0..3 {
            for kx in 0..3 {
                let last_real = (ky * 3 + kx) * mr + (output_size - 1);
                let padded = (ky * 3 + kx) * mr + (output_size); // first padded slot
                assert_eq!(buf[last_real], buf[padded]);
            }
        }
    }
}
