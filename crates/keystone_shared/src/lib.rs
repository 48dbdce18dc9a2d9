//! # KEYSTONE Shared
//!
//! Math types used by both the simulation thread (entity store) and the
//! render thread (event consumers).
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on engine state. If a type needs handles or
//! pools, it belongs in `keystone_core`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod math;

pub use math::{Affine, Quat, Vec3};
