//! Tunables for a register allocation call.

/// Configuration for one [`Context::run`](crate::context::Context::run) (or [`crate::allocate`])
/// call.
///
/// Mirrors the shape of a target settings/flags object: a handful of independent toggles, each
/// defaulted to the conservative choice, constructed once by the embedding driver and reused
/// across calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Number of 8-byte spill slots in the pool.
    ///
    /// A compile-time constant in the source this crate is descended from; made a runtime value
    /// here since real embedders size it per target ABI / frame layout rather than baking in one
    /// global number.
    pub n_spill64s: u32,

    /// Run stage 4 (preferencing) before the allocation pass.
    ///
    /// Purely a hint; disabling it can only ever increase the number of moves the allocator's
    /// victim-selection tie-break happens to avoid, never change correctness.
    pub enable_preferencing: bool,

    /// Run the stage-5 invariant assertions after processing every instruction.
    ///
    /// These are `debug_assert!`-backed in the hot loop; this flag additionally gates a small
    /// number of always-on checks (`debug_assertions`-independent) for callers who want the
    /// paranoid checking even in a release build.
    pub enable_sanity_checks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            n_spill64s: 32,
            enable_preferencing: true,
            enable_sanity_checks: true,
        }
    }
}
