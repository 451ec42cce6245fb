//! # pocker-image
//!
//! Image handling for the pocker runtime.
//!
//! - **Storage**: resolving `<name>.tar` archives in the image directory and
//!   publishing each image's extraction once, atomically, as the shared
//!   read-only lower layer of every container using it.
//! - **Layers**: tar extraction that drops device-special members and
//!   refuses members escaping the target directory.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod layer;
pub mod storage;
