//! C ABI records shared between ITT static parts and the reference collector.
//!
//! Every instrumented binary links a "static part" of the ITT API: a
//! `__itt_global` record holding its own object lists and a table of
//! function-pointer slots. When the collector library is loaded, the static
//! part hands that record to `__itt_api_init` and the collector fills the
//! slots. The types here mirror those records bit-for-bit so both sides can
//! read each other's memory.
//!
//! [`StaticPart`] builds an owned static part from Rust, which is how tests
//! (and Rust hosts that want to drive a collector without a C toolchain)
//! stand one up.

#![allow(non_camel_case_types)]

mod part;
mod records;
mod tags;

pub use part::*;
pub use records::*;
pub use tags::*;
