//! Token persistence, refresh locking and the token endpoint client

mod file_lock;
mod file_store;
mod token_client;

pub use file_lock::FileLockClient;
pub use file_store::FileTokenStore;
pub use token_client::HttpTokenExchanger;
