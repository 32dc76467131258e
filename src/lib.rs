//! IPTV Bridge library
//!
//! A local aggregation bridge: provider plugins push channel-lineup and
//! programme-guide payloads over an ephemeral-socket rendezvous, the
//! bridge normalizes and merges them, and a PVR consumer pulls the merged
//! playlist and XMLTV documents from a local HTTP endpoint.

pub mod config;
pub mod errors;
pub mod ingestor;
pub mod merger;
pub mod models;
pub mod utils;
pub mod web;
