//! The 8x8 indirect GEMM micro-kernel, dispatched per target architecture.
//!
//! Mirrors the `Kernel` trait pattern used for the teacher's float GEMM
//! kernels (`src/gemm/kernels/aarch64.rs`): a small `unsafe trait` exposes
//! `MR`/`NR` and a single `run` entry point, implementations are
//! feature-gated per architecture, and [`select`] picks the best one
//! available at runtime, falling back to [`portable::PortableKernel`]
//! everywhere.

use crate::requantize::QuantizationParams;

pub mod portable;

#[cfg(target_arch = "aarch64")]
pub mod aarch64_neon;

/// Implements the 8x8 indirect GEMM micro-kernel for one instruction set.
///
/// # Safety
///
/// Implementors of `run` may assume every pointer in `indirection[..mr *
/// ks]` is either the shared zero-sentinel address or valid to read `kc`
/// bytes from, and that `output` is valid to write `mr` rows of `nr` bytes
/// each at `output_row_stride` apart. Some implementations (the NEON
/// kernel) additionally require the memory just past those `kc` bytes to be
/// readable, per the crate's tail over-read contract; `portable` does not.
pub unsafe trait Kernel {
    /// Construct this kernel if the host supports it.
    fn new() -> Option<Self>
    where
        Self: Sized;

    fn name(&self) -> &'static str;

    /// Output rows (and indirection pointers) per kernel invocation.
    fn mr(&self) -> usize;
    /// Output channels per kernel invocation.
    fn nr(&self) -> usize;

    /// Compute one `mr x nr` output tile (`mr <= MR`, `nr <= NR`) and store
    /// it through `output`.
    ///
    /// `indirection` holds `ks * MR` pointers laid out kernel-site-major
    /// (site `s`, tile row `m` at `indirection[s * MR + m]`); entries at row
    /// offsets `>= mr` are never read. `weights` holds one packed NR=8
    /// output-channel group: one `i32` little-endian bias per output
    /// channel (shared across all `mr` rows), then per kernel site a
    /// `kc`-channel (possibly ragged-tail) row of `NR` bytes per full or
    /// partial 8-channel chunk, per [`crate::weights::PackedWeightsLayout`].
    ///
    /// # Safety
    ///
    /// See the trait-level safety section.
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
    );
}

/// Construct the best kernel implementation available on this host.
///
/// Tries architecture-specific kernels first, falling back to
/// [`portable::PortableKernel`], which is always available. Only `aarch64`
/// has a specialized kernel today; the fallback chain is structured so a
/// future ISA with runtime-optional features (e.g. x86 AVX2) can be added by
/// trying it first here, ahead of the portable fallback.
pub fn select() -> Box<dyn Kernel> {
    #[cfg(target_arch = "aarch64")]
    if let Some(kernel) = aarch64_neon::NeonKernel::new() {
        return Box::new(kernel);
    }

    Box::new(portable::PortableKernel::new().expect("portable kernel is always available"))
}
