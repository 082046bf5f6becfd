//! Target-independent linear-scan register allocator for straight-line instruction streams.
//!
//! The allocator has no notion of control flow, basic blocks, or SSA: it consumes one flat
//! sequence of instructions and a small callback bundle ([`RegAllocTarget`]) describing how to
//! read and rewrite them, and returns a new sequence with every virtual register replaced by a
//! real one, inserting spills and reloads as needed.
//!
//! A typical caller constructs one [`Context`] per function (or reuses one across many
//! straight-line fragments) and calls [`Context::run`] once per fragment; [`allocate`] is a
//! one-shot convenience wrapper for callers who don't need to reuse scratch allocations.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

mod alloc;
mod config;
mod context;
mod error;
mod hreg;
mod preference;
mod reg_usage;
mod rreg;
mod spill;
mod target;
mod vreg;

pub use crate::alloc::Stats;
pub use crate::config::Config;
pub use crate::context::{allocate, Context};
pub use crate::error::RegAllocPanic;
pub use crate::hreg::{HReg, RegClass};
pub use crate::reg_usage::{HRegUsage, RegMode};
pub use crate::rreg::{Disp, RRegInfo, RRegState};
pub use crate::target::RegAllocTarget;
pub use crate::vreg::VRegInfo;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
