//! Extended-playlist serialization.

use std::io::Write;

use crate::models::ChannelRecord;

/// Delimiter used when joining a channel's group tags into `group-title`.
pub const GROUP_DELIMITER: &str = ";";

pub struct PlaylistWriter;

impl PlaylistWriter {
    /// Serialize the merged channel list, followed by any raw pre-rendered
    /// blocks. Emission order is the caller's; output is deterministic for
    /// identical input.
    pub fn write<W: Write>(
        out: &mut W,
        channels: &[ChannelRecord],
        raw_blocks: &[String],
    ) -> std::io::Result<()> {
        writeln!(out, "#EXTM3U")?;

        for channel in channels {
            writeln!(out)?;
            Self::write_channel(out, channel)?;
        }

        for block in raw_blocks {
            let body = strip_playlist_header(block);
            if body.is_empty() {
                continue;
            }
            writeln!(out)?;
            writeln!(out, "{}", body)?;
        }

        Ok(())
    }

    fn write_channel<W: Write>(out: &mut W, channel: &ChannelRecord) -> std::io::Result<()> {
        let mut line = format!("#EXTINF:-1 tvg-id=\"{}\"", channel.id);

        if let Some(preset) = channel.preset_number {
            line.push_str(&format!(" tvg-chno=\"{}\"", preset));
        }
        if let Some(logo) = &channel.logo_url {
            line.push_str(&format!(" tvg-logo=\"{}\"", logo));
        }
        if !channel.group_tags.is_empty() {
            let groups: Vec<&str> = channel.group_tags.iter().map(String::as_str).collect();
            line.push_str(&format!(
                " group-title=\"{}\"",
                groups.join(GROUP_DELIMITER)
            ));
        }
        if channel.is_radio {
            line.push_str(" radio=\"true\"");
        }
        line.push(',');
        line.push_str(&channel.name);

        writeln!(out, "{}", line)?;
        for (key, value) in &channel.kodi_properties {
            writeln!(out, "#KODIPROP:{}={}", key, value)?;
        }
        writeln!(out, "{}", channel.stream_url)?;

        Ok(())
    }
}

/// Raw blocks may carry their own `#EXTM3U` header; the merged document
/// already has one.
fn strip_playlist_header(block: &str) -> &str {
    let trimmed = block.trim();
    match trimmed.strip_prefix("#EXTM3U") {
        Some(rest) => rest.trim_start_matches(|c| c != '\n').trim(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, name: &str) -> ChannelRecord {
        ChannelRecord {
            id: id.to_string(),
            name: name.to_string(),
            stream_url: format!("http://x/{}.m3u8", id),
            logo_url: None,
            preset_number: None,
            group_tags: Vec::new(),
            is_radio: false,
            kodi_properties: Vec::new(),
        }
    }

    fn render(channels: &[ChannelRecord], raw: &[String]) -> String {
        let mut out = Vec::new();
        PlaylistWriter::write(&mut out, channels, raw).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn full_channel_round_trips_with_fixed_attribute_order() {
        let record = ChannelRecord {
            id: "ch1".to_string(),
            name: "Channel One".to_string(),
            stream_url: "http://x/a.m3u8".to_string(),
            logo_url: Some("http://x/logo.png".to_string()),
            preset_number: Some(4),
            group_tags: vec!["Sports".to_string(), "News".to_string()],
            is_radio: false,
            kodi_properties: vec![(
                "inputstream.adaptive.manifest_type".to_string(),
                "hls".to_string(),
            )],
        };

        let output = render(&[record], &[]);
        assert!(output.starts_with("#EXTM3U\n"));
        assert!(output.contains(
            "#EXTINF:-1 tvg-id=\"ch1\" tvg-chno=\"4\" tvg-logo=\"http://x/logo.png\" \
             group-title=\"Sports;News\",Channel One\n"
        ));
        assert!(output.contains("#KODIPROP:inputstream.adaptive.manifest_type=hls\n"));
        assert!(output.contains("http://x/a.m3u8\n"));
    }

    #[test]
    fn optional_attributes_are_omitted_when_absent() {
        let output = render(&[channel("bare", "Bare")], &[]);
        let extinf = output
            .lines()
            .find(|line| line.starts_with("#EXTINF"))
            .unwrap();
        assert_eq!(extinf, "#EXTINF:-1 tvg-id=\"bare\",Bare");
    }

    #[test]
    fn radio_flag_is_emitted_after_groups() {
        let mut record = channel("fm", "FM One");
        record.is_radio = true;
        record.group_tags = vec!["Music".to_string()];

        let output = render(&[record], &[]);
        assert!(output.contains("group-title=\"Music\" radio=\"true\",FM One"));
    }

    #[test]
    fn identical_input_produces_identical_bytes() {
        let records = vec![channel("a", "Alpha"), channel("b", "Beta")];
        assert_eq!(render(&records, &[]), render(&records, &[]));
    }

    #[test]
    fn raw_blocks_lose_their_duplicate_header() {
        let raw = vec!["#EXTM3U\n#EXTINF:-1,Pre-rendered\nhttp://x/raw\n".to_string()];
        let output = render(&[channel("a", "Alpha")], &raw);

        assert_eq!(output.matches("#EXTM3U").count(), 1);
        assert!(output.contains("#EXTINF:-1,Pre-rendered\nhttp://x/raw"));
    }
}
