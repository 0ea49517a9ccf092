//! Indirect quantized (`u8`) 2-D convolution core.
//!
//! This crate implements the two hard pieces of a fused "indirect
//! convolution": the **indirection planner** ([`indirection`]), which
//! rewrites a convolution, depthwise-convolution, transposed-convolution, or
//! max-pool footprint into a flat array of input-row pointers, and the
//! **8x8 indirect GEMM micro-kernel** ([`kernel`]), which walks that array,
//! fuses the implicit im2col load with a quantized multiply-accumulate, and
//! requantizes the result into an `mr x nr` block of `u8` output pixels.
//!
//! Everything above those two pieces — operator configuration, weight
//! packing, thread scheduling, allocation — is the caller's responsibility.
//! This crate owns no buffers; every function here borrows caller-supplied
//! slices and raw pointers and writes through them.
//!
//! # Sharding
//!
//! Both the planner and the micro-kernel are embarrassingly parallel over
//! their outer axes (see the concurrency notes in each module), so a caller
//! wiring this crate into a real operator typically shards planner calls
//! across `(group, image, tile_start)` and micro-kernel calls across
//! `(row_tile, col_tile)` using an external thread pool, e.g.:
//!
//! ```ignore
//! use rayon::prelude::*;
//!
//! // Plan once per (group, image): the planner only ever writes the slice
//! // it owns, so disjoint ranges never race.
//! (0..groups * batch_size).into_par_iter().for_each(|gi| {
//!     let (group, image) = (gi / batch_size, gi % batch_size);
//!     plan_conv2d(&mut indirection_buffer[slice_for(group, image)], &geo, mr, tiled);
//! });
//!
//! // Then evaluate each output tile independently.
//! output_tiles.into_par_iter().for_each(|tile| {
//!     unsafe { kernel.run(tile.out, stride, tile.indirection, weights, kc, ks, tile.mr, tile.nr, &params) };
//! });
//! ```
//!
//! This crate takes no dependency on `rayon` itself — it performs no
//! scheduling of its own (no suspension points, no allocation, no locks).

pub mod geometry;
pub mod indirection;
pub mod kernel;
pub mod pointer_math;
pub mod requantize;
pub mod weights;

pub use geometry::OperatorGeometry;
pub use indirection::{plan_conv2d, plan_deconv2d, plan_depthwise2d, plan_maxpool2d};
pub use kernel::Kernel;
pub use requantize::{requantize, QuantizationParams};
pub use weights::PackedWeightsLayout;
