//! Unloading query results into object-storage staging.
//!
//! # Architecture
//!
//! 1. Allocate a fresh staging location for the scan
//! 2. Ask the credential provider how the remote engine may write there
//! 3. Execute the COPY INTO statement on a scoped connection
//! 4. Verify the unload confirmation and hand the row count back
//!
//! Reading the staged files is the job of [`crate::reader`].

pub mod staging;
pub mod unload;

pub use staging::{
    CredentialProvider, StagingArea, StagingLocation, StaticCredentials, StorageCredentials,
};
pub use unload::{
    parse_actions, run_count, run_unload, session_prologue, verify_confirmation, SessionActions,
    UnloadResult,
};
