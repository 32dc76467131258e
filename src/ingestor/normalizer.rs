//! Payload validation and canonicalization.
//!
//! One provider's contribution is normalized in isolation: malformed
//! individual records are skipped with a logged reason and never abort the
//! rest of the batch, while an unusable envelope fails the whole provider
//! (the merge then continues without it).

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ProviderError;
use crate::models::{
    ChannelRecord, Credit, CreditRole, NormalizedPayload, ProgrammeRecord, Provider, ProviderKind,
    RawPayload,
};

/// Keys a channel entry may carry its stream URL under. `mjh_master` is the
/// i.mjh.nz feed key several providers push verbatim.
const STREAM_URL_KEYS: [&str; 3] = ["stream", "url", "mjh_master"];

pub struct DataNormalizer;

impl DataNormalizer {
    pub fn normalize(
        payload: RawPayload,
        provider: &Provider,
    ) -> Result<NormalizedPayload, ProviderError> {
        let document = match payload {
            RawPayload::Text(text) => return Ok(NormalizedPayload::Raw(text)),
            RawPayload::Document(document) => document,
        };

        let object = match document {
            Value::Object(object) => object,
            // A JSON scalar is opaque pre-rendered text handed back
            // directly instead of structured records.
            Value::String(text) => {
                debug!(
                    "Provider '{}' returned pre-rendered text, passing through",
                    provider.name
                );
                return Ok(NormalizedPayload::Raw(text));
            }
            other => {
                debug!(
                    "Provider '{}' returned non-object JSON, passing through",
                    provider.name
                );
                return Ok(NormalizedPayload::Raw(other.to_string()));
            }
        };

        if let Some(guide) = object.get("epg") {
            if provider.kind != ProviderKind::ProgrammeGuide {
                return Err(ProviderError::UnsupportedPayload {
                    provider: provider.name.clone(),
                    message: "got a programme guide from a channel-lineup provider".to_string(),
                });
            }
            Ok(NormalizedPayload::Programmes(Self::normalize_guide(
                guide, provider,
            )?))
        } else if let Some(streams) = object.get("streams") {
            if provider.kind != ProviderKind::ChannelLineup {
                return Err(ProviderError::UnsupportedPayload {
                    provider: provider.name.clone(),
                    message: "got a channel lineup from a programme-guide provider".to_string(),
                });
            }
            Ok(NormalizedPayload::Channels(Self::normalize_lineup(
                streams, provider,
            )?))
        } else {
            Err(ProviderError::UnsupportedPayload {
                provider: provider.name.clone(),
                message: "expected one of 'epg' or 'streams'".to_string(),
            })
        }
    }

    fn normalize_lineup(
        streams: &Value,
        provider: &Provider,
    ) -> Result<Vec<ChannelRecord>, ProviderError> {
        let entries = streams
            .as_array()
            .ok_or_else(|| ProviderError::UnsupportedPayload {
                provider: provider.name.clone(),
                message: "'streams' is not a list".to_string(),
            })?;

        let mut channels = Vec::with_capacity(entries.len());
        let mut skipped = 0usize;

        for entry in entries {
            match Self::normalize_channel(entry) {
                Ok(channel) => channels.push(channel),
                Err(reason) => {
                    skipped += 1;
                    warn!(
                        "Skipping channel entry from provider '{}': {}",
                        provider.name, reason
                    );
                }
            }
        }

        debug!(
            "Provider '{}' lineup normalized: {} channels, {} skipped",
            provider.name,
            channels.len(),
            skipped
        );
        Ok(channels)
    }

    fn normalize_channel(entry: &Value) -> Result<ChannelRecord, String> {
        let entry = entry.as_object().ok_or("entry is not an object")?;

        let id = string_field(entry.get("id")).ok_or("missing or empty 'id'")?;
        let stream_url = STREAM_URL_KEYS
            .iter()
            .find_map(|key| string_field(entry.get(*key)))
            .ok_or("missing or empty stream URL")?;

        let name = string_field(entry.get("name")).unwrap_or_default();
        let logo_url = string_field(entry.get("logo"));
        let preset_number = numeric_field(entry.get("preset"));
        let is_radio = entry.get("radio").and_then(Value::as_bool).unwrap_or(false);
        let group_tags = group_tags(entry.get("group"));
        let kodi_properties = kodi_properties(entry.get("kodiprops"));

        Ok(ChannelRecord {
            id,
            name,
            stream_url,
            logo_url,
            preset_number,
            group_tags,
            is_radio,
            kodi_properties,
        })
    }

    fn normalize_guide(
        guide: &Value,
        provider: &Provider,
    ) -> Result<Vec<ProgrammeRecord>, ProviderError> {
        let by_channel = guide
            .as_object()
            .ok_or_else(|| ProviderError::UnsupportedPayload {
                provider: provider.name.clone(),
                message: "'epg' is not a channel map".to_string(),
            })?;

        let mut programmes = Vec::new();
        let mut skipped = 0usize;

        for (channel_id, items) in by_channel {
            let Some(items) = items.as_array() else {
                skipped += 1;
                warn!(
                    "Skipping guide channel '{}' from provider '{}': entries are not a list",
                    channel_id, provider.name
                );
                continue;
            };

            for item in items {
                match Self::normalize_programme(channel_id, item) {
                    Ok(programme) => programmes.push(programme),
                    Err(reason) => {
                        skipped += 1;
                        warn!(
                            "Skipping programme on '{}' from provider '{}': {}",
                            channel_id, provider.name, reason
                        );
                    }
                }
            }
        }

        debug!(
            "Provider '{}' guide normalized: {} programmes, {} skipped",
            provider.name,
            programmes.len(),
            skipped
        );
        Ok(programmes)
    }

    fn normalize_programme(channel_id: &str, item: &Value) -> Result<ProgrammeRecord, String> {
        let item = item.as_object().ok_or("entry is not an object")?;

        let title = string_field(item.get("title")).ok_or("missing or empty 'title'")?;
        let start = time_field(item.get("start")).ok_or("missing or unparseable 'start'")?;
        let stop = time_field(item.get("stop")).ok_or("missing or unparseable 'stop'")?;
        if start >= stop {
            return Err(format!("window is empty or inverted ({} >= {})", start, stop));
        }

        let genres = match item.get("genre") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(genre)) => vec![genre.clone()],
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|value| string_field(Some(value)))
                .collect(),
            Some(_) => Vec::new(),
        };

        let credits = item
            .get("credits")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| Self::normalize_credit(entry))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ProgrammeRecord {
            channel_id: channel_id.to_string(),
            title,
            start,
            stop,
            subtitle: string_field(item.get("subtitle")),
            description: string_field(item.get("description")),
            air_date: string_field(item.get("date")),
            image_url: string_field(item.get("image")),
            episode_tag: string_field(item.get("episode")),
            catchup_id: string_field(item.get("stream")),
            genres,
            credits,
        })
    }

    /// Credits with an unrecognized role or no name are dropped silently;
    /// they must never abort the enclosing programme.
    fn normalize_credit(entry: &Value) -> Option<Credit> {
        let entry = entry.as_object()?;
        let role = CreditRole::parse(entry.get("type")?.as_str()?)?;
        let name = string_field(entry.get("name"))?;
        Some(Credit {
            role,
            name,
            credited_role: string_field(entry.get("role")),
        })
    }
}

/// A non-empty trimmed string, or nothing.
fn string_field(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Accepts a number or a numeric string; the original formats presets
/// straight into the playlist so providers push either.
fn numeric_field(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Coerce `group` from a `;`-delimited string, a list of strings, or
/// nothing into deduplicated tags in first-seen order.
fn group_tags(value: Option<&Value>) -> Vec<String> {
    let raw: Vec<String> = match value {
        Some(Value::String(joined)) => joined
            .split(';')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|value| string_field(Some(value)))
            .collect(),
        _ => Vec::new(),
    };

    let mut tags = Vec::with_capacity(raw.len());
    for tag in raw {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Playback directives, order preserved as pushed. Scalar values are kept;
/// anything nested is dropped with a log line.
fn kodi_properties(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Object(map)) = value else {
        return Vec::new();
    };

    let mut properties = Vec::with_capacity(map.len());
    for (key, value) in map {
        let rendered = match value {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            Value::Bool(flag) => flag.to_string(),
            other => {
                warn!("Dropping non-scalar kodiprop '{}': {}", key, other);
                continue;
            }
        };
        properties.push((key.clone(), rendered));
    }
    properties
}

/// Programme times arrive as integer epoch seconds or RFC 3339 text.
fn time_field(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(number) => Utc.timestamp_opt(number.as_i64()?, 0).single(),
        Value::String(text) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            // Some providers push epoch seconds as text.
            let epoch: i64 = text.trim().parse().ok()?;
            Utc.timestamp_opt(epoch, 0).single()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;
    use serde_json::json;

    fn provider(kind: ProviderKind) -> Provider {
        Provider {
            name: "test".to_string(),
            address: "plugin://plugin.video.test/".to_string(),
            kind,
            enabled: true,
        }
    }

    fn normalize_lineup(payload: Value) -> Vec<ChannelRecord> {
        match DataNormalizer::normalize(
            RawPayload::Document(payload),
            &provider(ProviderKind::ChannelLineup),
        )
        .unwrap()
        {
            NormalizedPayload::Channels(channels) => channels,
            other => panic!("expected channels, got {other:?}"),
        }
    }

    fn normalize_guide(payload: Value) -> Vec<ProgrammeRecord> {
        match DataNormalizer::normalize(
            RawPayload::Document(payload),
            &provider(ProviderKind::ProgrammeGuide),
        )
        .unwrap()
        {
            NormalizedPayload::Programmes(programmes) => programmes,
            other => panic!("expected programmes, got {other:?}"),
        }
    }

    #[test]
    fn group_tags_coerce_from_string_list_and_absence() {
        let channels = normalize_lineup(json!({
            "streams": [
                {"id": "a", "stream": "http://x/a", "group": "Sports;News;;Sports"},
                {"id": "b", "stream": "http://x/b", "group": ["Docs", "", "Kids"]},
                {"id": "c", "stream": "http://x/c"},
                {"id": "d", "stream": "http://x/d", "group": 42},
            ]
        }));

        assert_eq!(channels.len(), 4);
        assert_eq!(channels[0].group_tags, ["Sports", "News"]);
        assert_eq!(channels[1].group_tags, ["Docs", "Kids"]);
        assert!(channels[2].group_tags.is_empty());
        assert!(channels[3].group_tags.is_empty());
    }

    #[test]
    fn channels_without_id_or_stream_url_are_dropped_individually() {
        let channels = normalize_lineup(json!({
            "streams": [
                {"id": "ok", "name": "Fine", "mjh_master": "http://x/ok.m3u8"},
                {"name": "No id", "stream": "http://x/noid"},
                {"id": "nourl", "name": "No url"},
                {"id": "", "stream": "http://x/emptyid"},
            ]
        }));

        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].id, "ok");
        assert_eq!(channels[0].stream_url, "http://x/ok.m3u8");
    }

    #[test]
    fn stream_url_aliases_are_tried_in_order() {
        let channels = normalize_lineup(json!({
            "streams": [
                {"id": "a", "stream": "http://x/first", "url": "http://x/second"},
                {"id": "b", "url": "http://x/second"},
                {"id": "c", "mjh_master": "http://x/third"},
            ]
        }));

        assert_eq!(channels[0].stream_url, "http://x/first");
        assert_eq!(channels[1].stream_url, "http://x/second");
        assert_eq!(channels[2].stream_url, "http://x/third");
    }

    #[test]
    fn kodi_properties_keep_push_order() {
        let channels = normalize_lineup(json!({
            "streams": [{
                "id": "drm",
                "stream": "http://x/drm",
                "kodiprops": {
                    "inputstream.adaptive.manifest_type": "hls",
                    "inputstream.adaptive.license_type": "com.widevine.alpha",
                    "inputstream.adaptive.stream_selection_type": "adaptive"
                }
            }]
        }));

        let keys: Vec<&str> = channels[0]
            .kodi_properties
            .iter()
            .map(|(key, _)| key.as_str())
            .collect();
        assert_eq!(
            keys,
            [
                "inputstream.adaptive.manifest_type",
                "inputstream.adaptive.license_type",
                "inputstream.adaptive.stream_selection_type"
            ]
        );
    }

    #[test]
    fn programmes_missing_required_fields_are_skipped_individually() {
        let programmes = normalize_guide(json!({
            "epg": {
                "ch1": [
                    {"title": "Morning Show", "start": 1700000000, "stop": 1700003600},
                    {"start": 1700003600, "stop": 1700007200},
                    {"title": "Evening Show", "start": 1700007200, "stop": 1700010800},
                ]
            }
        }));

        assert_eq!(programmes.len(), 2);
        assert_eq!(programmes[0].title, "Morning Show");
        assert_eq!(programmes[1].title, "Evening Show");
    }

    #[test]
    fn programmes_with_inverted_windows_are_excluded() {
        let programmes = normalize_guide(json!({
            "epg": {
                "ch1": [
                    {"title": "Backwards", "start": 1700003600, "stop": 1700000000},
                    {"title": "Zero length", "start": 1700000000, "stop": 1700000000},
                    {"title": "Valid", "start": 1700000000, "stop": 1700003600},
                ]
            }
        }));

        assert_eq!(programmes.len(), 1);
        assert_eq!(programmes[0].title, "Valid");
    }

    #[test]
    fn programme_times_accept_epoch_and_rfc3339() {
        let programmes = normalize_guide(json!({
            "epg": {
                "ch1": [{
                    "title": "Mixed",
                    "start": "2023-11-14T22:13:20+00:00",
                    "stop": 1700004600,
                }]
            }
        }));

        assert_eq!(programmes.len(), 1);
        assert_eq!(programmes[0].start.timestamp(), 1700000000);
        assert_eq!(programmes[0].stop.timestamp(), 1700004600);
    }

    #[test]
    fn unrecognized_credit_roles_are_dropped_without_aborting() {
        let programmes = normalize_guide(json!({
            "epg": {
                "ch1": [{
                    "title": "Film",
                    "start": 1700000000,
                    "stop": 1700003600,
                    "credits": [
                        {"type": "actor", "name": "Alex Doe", "role": "Lead"},
                        {"type": "narrator", "name": "Unknown Role"},
                        {"type": "director", "name": "Sam Roe"},
                        {"type": "writer"},
                    ]
                }]
            }
        }));

        let credits = &programmes[0].credits;
        assert_eq!(credits.len(), 2);
        assert_eq!(credits[0].role, CreditRole::Actor);
        assert_eq!(credits[0].credited_role.as_deref(), Some("Lead"));
        assert_eq!(credits[1].role, CreditRole::Director);
    }

    #[test]
    fn catchup_reference_is_carried_from_the_stream_field() {
        let programmes = normalize_guide(json!({
            "epg": {
                "ch1": [{
                    "title": "Replayable",
                    "start": 1700000000,
                    "stop": 1700003600,
                    "stream": "plugin://plugin.video.test/play/123",
                }]
            }
        }));

        assert_eq!(
            programmes[0].catchup_id.as_deref(),
            Some("plugin://plugin.video.test/play/123")
        );
    }

    #[test]
    fn declared_raw_text_passes_through_unchanged() {
        let payload = RawPayload::Text("#EXTM3U\n#EXTINF:-1,Pre\nhttp://x\n".to_string());
        match DataNormalizer::normalize(payload, &provider(ProviderKind::Raw)).unwrap() {
            NormalizedPayload::Raw(text) => assert!(text.starts_with("#EXTM3U")),
            other => panic!("expected raw passthrough, got {other:?}"),
        }
    }

    #[test]
    fn non_object_json_passes_through_as_raw() {
        let payload = RawPayload::Document(json!("#EXTM3U\nalready rendered"));
        match DataNormalizer::normalize(payload, &provider(ProviderKind::ChannelLineup)).unwrap() {
            NormalizedPayload::Raw(text) => assert!(text.contains("already rendered")),
            other => panic!("expected raw passthrough, got {other:?}"),
        }
    }

    #[test]
    fn payload_kind_must_match_the_declared_capability() {
        let payload = RawPayload::Document(json!({"epg": {}}));
        let err =
            DataNormalizer::normalize(payload, &provider(ProviderKind::ChannelLineup)).unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedPayload { .. }));

        let payload = RawPayload::Document(json!({"streams": []}));
        let err = DataNormalizer::normalize(payload, &provider(ProviderKind::ProgrammeGuide))
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedPayload { .. }));
    }

    #[test]
    fn payload_with_neither_key_is_unsupported() {
        let payload = RawPayload::Document(json!({"version": 1, "other": []}));
        let err =
            DataNormalizer::normalize(payload, &provider(ProviderKind::ChannelLineup)).unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedPayload { .. }));
    }
}
