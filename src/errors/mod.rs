pub mod types;

pub use types::{MergeError, ProviderError};
