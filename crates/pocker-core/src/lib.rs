//! # pocker-core
//!
//! Isolation primitives of the pocker container launch pipeline.
//!
//! - **Platform**: the narrow [`platform::Platform`] interface over the
//!   privileged syscalls, with a Linux implementation and an in-memory fake.
//! - **Namespaces**: spawning the container-init process in fresh PID,
//!   mount, UTS and network namespaces; private mount propagation; hostname.
//! - **Cgroups v1**: per-container `cpu` and `memory` leaves and limits.
//! - **Filesystem**: overlay root, `/proc` and `/sys`, a minimal `/dev`,
//!   and `pivot_root`.
//!
//! The only unsafe call, `clone(2)`, lives in the Linux platform with its
//! `// SAFETY:` justification.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
pub mod platform;
