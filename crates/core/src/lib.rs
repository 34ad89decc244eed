//! Answers one question about an image file: does it contain at least one
//! detectable human face?
//!
//! The pipeline is strictly linear: [`decoding`] reads the file into bytes,
//! [`imaging`] turns the bytes into a loaded image through a temporary
//! locator, [`detection`] awaits detector readiness and runs detection, and
//! [`pipeline`] orchestrates the three and collapses every failure to `false`.

pub mod decoding;
pub mod detection;
pub mod imaging;
pub mod pipeline;
pub mod shared;
