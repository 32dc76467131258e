use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Declared output kind of a configured provider.
///
/// `Raw` providers hand back a pre-rendered playlist document instead of
/// structured records and take part in playlist merges only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    ChannelLineup,
    ProgrammeGuide,
    Raw,
}

/// An external data source, configured once per merge run and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    /// Invocation base address; the rendezvous port is appended as a
    /// `port=<n>` query parameter before launch.
    pub address: String,
    pub kind: ProviderKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Provider {
    pub fn participates_in(&self, kind: MergeKind) -> bool {
        match kind {
            MergeKind::Playlist => {
                matches!(self.kind, ProviderKind::ChannelLineup | ProviderKind::Raw)
            }
            MergeKind::Epg => matches!(self.kind, ProviderKind::ProgrammeGuide),
        }
    }
}

/// One playable playlist entry after normalization.
///
/// `id` and `stream_url` are guaranteed non-empty; entries failing that
/// invariant are dropped by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub stream_url: String,
    pub logo_url: Option<String>,
    pub preset_number: Option<u32>,
    /// Set semantics (deduplicated), kept in first-seen order so the
    /// serialized join is deterministic.
    pub group_tags: Vec<String>,
    pub is_radio: bool,
    /// Opaque playback directives (DRM headers etc). Order-significant for
    /// the sink, so kept as pushed.
    pub kodi_properties: Vec<(String, String)>,
}

/// One guide entry for a channel. `title` is non-empty and `start < stop`;
/// entries failing that are rejected individually by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgrammeRecord {
    pub channel_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub air_date: Option<String>,
    pub image_url: Option<String>,
    pub episode_tag: Option<String>,
    /// Catch-up stream reference, emitted as the programme's `catchup-id`.
    pub catchup_id: Option<String>,
    pub genres: Vec<String>,
    pub credits: Vec<Credit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credit {
    pub role: CreditRole,
    pub name: String,
    /// Character or on-screen role, only meaningful for the actor family.
    pub credited_role: Option<String>,
}

/// Credit roles the XMLTV sink understands. Unrecognized roles are dropped
/// silently during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditRole {
    Actor,
    Presenter,
    Commentator,
    Guest,
    Director,
    Producer,
    Writer,
    Adapter,
    Composer,
    Editor,
}

/// The XMLTV element family a credit role maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditElement {
    Actor,
    Director,
    Writer,
}

impl CreditRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "actor" => Some(Self::Actor),
            "presenter" => Some(Self::Presenter),
            "commentator" => Some(Self::Commentator),
            "guest" => Some(Self::Guest),
            "director" => Some(Self::Director),
            "producer" => Some(Self::Producer),
            "writer" => Some(Self::Writer),
            "adapter" => Some(Self::Adapter),
            "composer" => Some(Self::Composer),
            "editor" => Some(Self::Editor),
            _ => None,
        }
    }

    pub fn element(&self) -> CreditElement {
        match self {
            Self::Actor | Self::Presenter | Self::Commentator | Self::Guest => {
                CreditElement::Actor
            }
            Self::Director | Self::Producer => CreditElement::Director,
            Self::Writer | Self::Adapter | Self::Composer | Self::Editor => CreditElement::Writer,
        }
    }
}

/// Which of the two published documents a merge request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeKind {
    Playlist,
    Epg,
}

impl MergeKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Playlist => "playlist.m3u8",
            Self::Epg => "epg.xml",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Playlist => "application/vnd.apple.mpegurl",
            Self::Epg => "text/xml",
        }
    }
}

impl std::fmt::Display for MergeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Playlist => write!(f, "playlist"),
            Self::Epg => write!(f, "epg"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MergeRequest {
    pub kind: MergeKind,
    pub force_refresh: bool,
}

/// Outcome of a successful merge. Superseded by the next successful merge;
/// the file at `file_path` is only ever replaced atomically.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub file_path: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub record_count: usize,
}

/// What a provider pushed over the rendezvous socket, before normalization.
#[derive(Debug, Clone)]
pub enum RawPayload {
    /// A parsed JSON document from a structured provider.
    Document(serde_json::Value),
    /// Verbatim text from a provider declared `raw`.
    Text(String),
}

/// A provider's contribution after validation and canonicalization.
#[derive(Debug, Clone)]
pub enum NormalizedPayload {
    Channels(Vec<ChannelRecord>),
    Programmes(Vec<ProgrammeRecord>),
    /// Pre-rendered document body, appended verbatim by the writers.
    Raw(String),
}

impl NormalizedPayload {
    /// Number of usable records this contribution adds to a merge. A raw
    /// block counts as one so a merge fed only by raw providers still
    /// publishes.
    pub fn record_count(&self) -> usize {
        match self {
            Self::Channels(channels) => channels.len(),
            Self::Programmes(programmes) => programmes.len(),
            Self::Raw(text) => usize::from(!text.trim().is_empty()),
        }
    }
}
