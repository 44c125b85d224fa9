pub mod hashing;
pub mod transfer;

// Re-exports for convenience
pub use hashing::directory_key;
pub use transfer::{copy_if_newer, plan_copy, CopyPlan, CopyStatus, TransferError};
