//! Core library components.
//!
//! This module contains the authentication file handling, credential
//! resolution and the Key Vault master key.

pub mod cipher;
pub mod config;
pub mod constants;
pub mod credential;
pub mod encoding;
pub(crate) mod http;
