//! Collaborators the gatekeeper depends on.
//!
//! Each concern is a trait object so hosts and tests can swap backends:
//! - [`SecureVault`]: scoped unlock of the account vault
//! - [`AccountStore`]: session account listing
//! - [`ChainGateway`]: ledger node / indexer queries
//! - [`InternalMethods`]: extension-only account management

pub mod accounts;
pub mod gateway;
pub mod internal;
pub mod vault;

pub use accounts::{AccountStore, SessionAccountStore};
pub use gateway::{parse_network_params, ChainGateway, GatewayError};
#[cfg(feature = "http-gateway")]
pub use gateway::HttpGateway;
pub use internal::InternalMethods;
pub use vault::{AccountRecord, EncryptedVault, SecureVault, UnlockedVault, VaultError, VaultRecords};
