//! Authentication: persisted credentials and the gateway that keeps them
//! fresh for every authenticated request.

mod credentials;
mod gateway;

pub use credentials::{
    CredentialPair, CredentialStore, MemoryCredentialStore, StoreError, StoreResult,
};
pub use gateway::AuthGateway;
