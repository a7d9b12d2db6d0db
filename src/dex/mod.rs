// src/dex/mod.rs
//! Pool model and the pricing math behind `Pool::quote`.

pub mod math;
pub mod pool;

pub use pool::{Asset, Pool, PoolKind, Quote};
