//! Master key backends.
//!
//! A master key protects the data key of an encrypted document by
//! wrapping it with a remote key-management service.
//!
//! ## Backends
//!
//! - **Azure Key Vault**: [`MasterKey`], wraps with `RSA-OAEP-256` through
//!   the Key Vault `encrypt`/`decrypt` key operations.
//!
//! ## Adding a New Backend
//!
//! 1. Implement the `KeySource` trait
//! 2. Add the implementation in a new file
//! 3. Re-export from this module

use std::collections::BTreeMap;
use std::fmt::Display;

use zeroize::Zeroizing;

use crate::error::Result;

mod client;
mod master_key;

pub use client::{scope_for, CryptoClient, EncryptionAlgorithm};
pub use master_key::MasterKey;

/// A key that can wrap and unwrap a document's data key.
///
/// `Display` renders the key's fully-qualified identifier.
pub trait KeySource: Display {
    /// Encrypt `data_key` and store the result on the key.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoCredential` if no credential is attached, or a
    /// `RemoteError` if the service call fails.
    fn encrypt(&mut self, data_key: &[u8]) -> Result<()>;

    /// Encrypt `data_key` unless an encrypted data key is already stored.
    fn encrypt_if_needed(&mut self, data_key: &[u8]) -> Result<()>;

    /// Decrypt the stored encrypted data key.
    ///
    /// # Errors
    ///
    /// Same as [`encrypt`](Self::encrypt).
    fn decrypt(&self) -> Result<Zeroizing<Vec<u8>>>;

    /// Whether the data key is old enough to be rotated.
    fn needs_rotation(&self) -> bool;

    /// The stored encrypted data key, empty if not yet encrypted.
    fn encrypted_data_key(&self) -> &str;

    fn set_encrypted_data_key(&mut self, encrypted: String);

    /// Persisted representation of the key.
    fn to_map(&self) -> BTreeMap<String, String>;

    /// Key type identifier used in key groups.
    fn key_type(&self) -> &'static str;
}
