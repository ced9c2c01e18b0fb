//! azkv - Azure Key Vault master keys for envelope-encrypted documents.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── core/
//! │   ├── config        # Azure authentication file (AuthConfig)
//! │   ├── encoding      # UTF-8 / UTF-16 detection and transcoding
//! │   ├── credential/   # Credential resolution and token acquisition
//! │   │   ├── secret        # Client secret
//! │   │   ├── certificate   # Client certificate (signed assertion)
//! │   │   └── managed       # Managed identity (IMDS / App Service)
//! │   └── cipher/       # Master key backends
//! │       ├── mod           # KeySource trait
//! │       ├── client        # Key Vault encrypt/decrypt client
//! │       └── master_key    # Key Vault master key record
//! ├── error             # Error types
//! └── logging           # tracing subscriber setup
//! ```
//!
//! # Example
//!
//! ```no_run
//! use azkv::{AuthConfig, KeySource, MasterKey};
//!
//! # fn main() -> azkv::error::Result<()> {
//! let config = AuthConfig::load(std::path::Path::new("azure.json"))?;
//! let mut key = MasterKey::from_url("https://myvault.vault.azure.net/keys/sops/0123abcd")?;
//! key.set_token(&config)?;
//!
//! key.encrypt_if_needed(b"0123456789abcdef0123456789abcdef")?;
//! let data_key = key.decrypt()?;
//! # assert_eq!(data_key.len(), 32);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod logging;

pub use crate::core::cipher::{KeySource, MasterKey};
pub use crate::core::config::AuthConfig;
pub use crate::core::credential::{resolve, AccessToken, Credential, CredentialKind, TokenCredential};
