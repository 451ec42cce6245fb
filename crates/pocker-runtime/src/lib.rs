//! Container launch pipeline and supervision for the pocker runtime.
//!
//! [`engine::Engine`] mints a container identity, spawns the staged
//! [`init`] pipeline inside fresh namespaces and supervises the resulting
//! process through a [`process::ContainerHandle`]. Each container keeps a
//! JSON [`state`] record next to its filesystem layers.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod engine;
pub mod init;
pub mod process;
pub mod state;
