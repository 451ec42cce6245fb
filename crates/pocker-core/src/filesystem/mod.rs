//! Filesystem assembly for container isolation.
//!
//! Builds the overlay root of a container, mounts `/proc` and `/sys`,
//! provisions a minimal `/dev` and switches the process root with
//! `pivot_root(2)`. Every step goes through [`crate::platform::Platform`].

pub mod devices;
pub mod mount;
pub mod overlayfs;
pub mod pivot_root;
