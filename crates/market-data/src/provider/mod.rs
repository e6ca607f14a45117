//! Quote source abstraction and implementations.
//!
//! This module contains:
//! - The `QuoteSource` trait that coordinators fetch through
//! - The Yahoo Finance implementation with its session handshake

mod traits;

pub mod yahoo;

pub use traits::QuoteSource;
