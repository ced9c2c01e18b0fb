//! Test support utilities for azkv integration tests.
//!
//! Provides a mock Key Vault and identity provider built on wiremock.

#![allow(dead_code)]

pub mod fixtures;
pub mod vault;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use vault::*;
