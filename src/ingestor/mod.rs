//! Provider data collection: the launch seam, the socket rendezvous, the
//! payload normalizer and the scheduled re-merge loop.

pub mod invoker;
pub mod launcher;
pub mod normalizer;
pub mod scheduler;

pub use invoker::{ProviderInvoker, SUPPORTED_PAYLOAD_VERSION};
pub use launcher::{launcher_from_config, CommandLauncher, HttpLauncher, ProviderLauncher};
pub use normalizer::DataNormalizer;
pub use scheduler::{ConsumerNotifier, MergeScheduler};
