//! Error type definitions for the IPTV Bridge
//!
//! Provider-level failures are recoverable: the orchestrator logs them and
//! continues with the remaining providers. Merge-level failures abort the
//! request that triggered them and leave the previously published file in
//! place.

use thiserror::Error;

/// Errors raised while collecting a single provider's payload
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider never connected, or never finished pushing, within the budget
    #[error("Timeout waiting for reply from '{provider}' on port {port} after {timeout_secs}s")]
    Timeout {
        provider: String,
        port: u16,
        timeout_secs: u64,
    },

    /// The provider pushed bytes that do not form a usable envelope
    #[error("Protocol error from '{provider}': {message}")]
    Protocol { provider: String, message: String },

    /// The payload decoded but carries no shape this bridge understands
    #[error("Unsupported payload from '{provider}': {message}")]
    UnsupportedPayload { provider: String, message: String },

    /// The host environment could not be signalled to start the provider
    #[error("Failed to launch provider '{provider}': {message}")]
    Launch { provider: String, message: String },

    /// Rendezvous socket setup or transfer failed
    #[error("Socket error for provider '{provider}': {source}")]
    Socket {
        provider: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort a whole merge request
#[derive(Error, Debug)]
pub enum MergeError {
    /// Zero usable records after every provider was tried; the previously
    /// published file stays authoritative instead of being clobbered
    #[error("All providers failed: no usable records for {kind}")]
    AllProvidersFailed { kind: String },

    /// Temp-file write or the atomic rename into place failed
    #[error("Write failed for {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Output directory preparation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
