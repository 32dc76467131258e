//! XMLTV serialization.
//!
//! The document is built element-by-element so a single bad programme can
//! be dropped with a log line while the rest of the guide, and the closing
//! root tag, still go out.

use quick_xml::escape::escape;
use std::collections::HashSet;
use std::io::Write;
use tracing::warn;

use crate::models::{CreditElement, ProgrammeRecord};

const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S %z";

pub struct EpgWriter;

impl EpgWriter {
    /// Serialize the merged guide: one `channel` element per distinct
    /// channel id in first-seen order, then every programme, then any raw
    /// pre-rendered blocks. The root element closes even if individual
    /// programmes fail mid-stream.
    pub fn write<W: Write>(
        out: &mut W,
        programmes: &[ProgrammeRecord],
        raw_blocks: &[String],
    ) -> std::io::Result<()> {
        out.write_all(br#"<?xml version="1.0" encoding="utf-8" ?><tv>"#)?;

        let mut seen = HashSet::new();
        for programme in programmes {
            if seen.insert(programme.channel_id.as_str()) {
                write!(
                    out,
                    r#"<channel id="{}"></channel>"#,
                    escape(&programme.channel_id)
                )?;
            }
        }

        for programme in programmes {
            match programme_element(programme) {
                Ok(element) => out.write_all(element.as_bytes())?,
                Err(reason) => {
                    warn!(
                        "Skipping programme '{}' on channel '{}': {}",
                        programme.title, programme.channel_id, reason
                    );
                }
            }
        }

        for block in raw_blocks {
            let body = strip_xmltv_wrapper(block);
            if !body.is_empty() {
                out.write_all(body.as_bytes())?;
            }
        }

        out.write_all(b"</tv>")?;
        Ok(())
    }
}

/// Render one programme element, or a reason to skip it.
fn programme_element(programme: &ProgrammeRecord) -> Result<String, String> {
    if programme.title.is_empty() {
        return Err("empty title".to_string());
    }
    if programme.start >= programme.stop {
        return Err("empty or inverted window".to_string());
    }

    let mut element = format!(
        r#"<programme start="{}" stop="{}" channel="{}""#,
        programme.start.format(XMLTV_TIME_FORMAT),
        programme.stop.format(XMLTV_TIME_FORMAT),
        escape(&programme.channel_id),
    );
    if let Some(catchup_id) = &programme.catchup_id {
        element.push_str(&format!(r#" catchup-id="{}""#, escape(catchup_id)));
    }
    element.push('>');

    element.push_str(&format!("<title>{}</title>", escape(&programme.title)));
    if let Some(subtitle) = &programme.subtitle {
        element.push_str(&format!("<sub-title>{}</sub-title>", escape(subtitle)));
    }
    if let Some(description) = &programme.description {
        element.push_str(&format!("<desc>{}</desc>", escape(description)));
    }
    if let Some(air_date) = &programme.air_date {
        element.push_str(&format!("<date>{}</date>", escape(air_date)));
    }
    if let Some(image_url) = &programme.image_url {
        element.push_str(&format!(r#"<icon src="{}"/>"#, escape(image_url)));
    }
    if let Some(episode_tag) = &programme.episode_tag {
        element.push_str(&format!(
            r#"<episode-num system="onscreen">{}</episode-num>"#,
            escape(episode_tag)
        ));
    }
    for genre in &programme.genres {
        element.push_str(&format!("<category>{}</category>", escape(genre)));
    }

    let credits: Vec<&crate::models::Credit> = programme
        .credits
        .iter()
        .filter(|credit| !credit.name.is_empty())
        .collect();
    if !credits.is_empty() {
        element.push_str("<credits>");
        for credit in credits {
            match credit.role.element() {
                CreditElement::Actor => match &credit.credited_role {
                    Some(role) => element.push_str(&format!(
                        r#"<actor role="{}">{}</actor>"#,
                        escape(role),
                        escape(&credit.name)
                    )),
                    None => element
                        .push_str(&format!("<actor>{}</actor>", escape(&credit.name))),
                },
                CreditElement::Director => element
                    .push_str(&format!("<director>{}</director>", escape(&credit.name))),
                CreditElement::Writer => {
                    element.push_str(&format!("<writer>{}</writer>", escape(&credit.name)))
                }
            }
        }
        element.push_str("</credits>");
    }

    element.push_str("</programme>");
    Ok(element)
}

/// Raw guide blocks may be complete XMLTV documents; only their element
/// content belongs inside the merged root.
fn strip_xmltv_wrapper(block: &str) -> &str {
    let mut body = block.trim();

    if body.starts_with("<?xml") {
        body = match body.find("?>") {
            Some(end) => body[end + 2..].trim_start(),
            None => return "",
        };
    }
    if body.starts_with("<tv") {
        body = match body.find('>') {
            Some(end) => body[end + 1..].trim_start(),
            None => return "",
        };
    }
    body.strip_suffix("</tv>").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Credit, CreditRole};
    use chrono::{TimeZone, Utc};

    fn programme(channel_id: &str, title: &str, start: i64, stop: i64) -> ProgrammeRecord {
        ProgrammeRecord {
            channel_id: channel_id.to_string(),
            title: title.to_string(),
            start: Utc.timestamp_opt(start, 0).unwrap(),
            stop: Utc.timestamp_opt(stop, 0).unwrap(),
            subtitle: None,
            description: None,
            air_date: None,
            image_url: None,
            episode_tag: None,
            catchup_id: None,
            genres: Vec::new(),
            credits: Vec::new(),
        }
    }

    fn render(programmes: &[ProgrammeRecord], raw: &[String]) -> String {
        let mut out = Vec::new();
        EpgWriter::write(&mut out, programmes, raw).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn document_wraps_channels_then_programmes() {
        let programmes = vec![
            programme("ch1", "First", 1700000000, 1700003600),
            programme("ch2", "Second", 1700000000, 1700003600),
            programme("ch1", "Third", 1700003600, 1700007200),
        ];

        let output = render(&programmes, &[]);
        assert!(output.starts_with(r#"<?xml version="1.0" encoding="utf-8" ?><tv>"#));
        assert!(output.ends_with("</tv>"));
        // One channel element per distinct id, not per programme.
        assert_eq!(output.matches(r#"<channel id="ch1">"#).count(), 1);
        assert_eq!(output.matches(r#"<channel id="ch2">"#).count(), 1);
        assert_eq!(output.matches("<programme ").count(), 3);
    }

    #[test]
    fn times_are_emitted_in_xmltv_format() {
        let output = render(&[programme("ch1", "Show", 1700000000, 1700003600)], &[]);
        assert!(output.contains(r#"start="20231114221320 +0000""#));
        assert!(output.contains(r#"stop="20231114231320 +0000""#));
    }

    #[test]
    fn text_content_is_escaped() {
        let mut record = programme("ch&1", "Laurel & Hardy <live>", 1700000000, 1700003600);
        record.description = Some("A \"classic\" double act".to_string());

        let output = render(&[record], &[]);
        assert!(output.contains(r#"<channel id="ch&amp;1">"#));
        assert!(output.contains("<title>Laurel &amp; Hardy &lt;live&gt;</title>"));
        assert!(output.contains("<desc>A &quot;classic&quot; double act</desc>"));
    }

    #[test]
    fn optional_subelements_appear_when_present() {
        let mut record = programme("ch1", "Film", 1700000000, 1700003600);
        record.subtitle = Some("Part 1".to_string());
        record.air_date = Some("2023".to_string());
        record.image_url = Some("http://x/poster.jpg".to_string());
        record.episode_tag = Some("S01E02".to_string());
        record.catchup_id = Some("plugin://x/play/1".to_string());
        record.genres = vec!["Drama".to_string(), "History".to_string()];

        let output = render(&[record], &[]);
        assert!(output.contains(r#"catchup-id="plugin://x/play/1""#));
        assert!(output.contains("<sub-title>Part 1</sub-title>"));
        assert!(output.contains("<date>2023</date>"));
        assert!(output.contains(r#"<icon src="http://x/poster.jpg"/>"#));
        assert!(output.contains(r#"<episode-num system="onscreen">S01E02</episode-num>"#));
        assert!(output.contains("<category>Drama</category><category>History</category>"));
    }

    #[test]
    fn credit_families_map_to_their_elements() {
        let mut record = programme("ch1", "Film", 1700000000, 1700003600);
        record.credits = vec![
            Credit {
                role: CreditRole::Actor,
                name: "Alex Doe".to_string(),
                credited_role: Some("Lead".to_string()),
            },
            Credit {
                role: CreditRole::Presenter,
                name: "Jo Host".to_string(),
                credited_role: None,
            },
            Credit {
                role: CreditRole::Producer,
                name: "Sam Roe".to_string(),
                credited_role: None,
            },
            Credit {
                role: CreditRole::Composer,
                name: "Kit Lane".to_string(),
                credited_role: None,
            },
        ];

        let output = render(&[record], &[]);
        assert!(output.contains(r#"<credits><actor role="Lead">Alex Doe</actor>"#));
        assert!(output.contains("<actor>Jo Host</actor>"));
        assert!(output.contains("<director>Sam Roe</director>"));
        assert!(output.contains("<writer>Kit Lane</writer></credits>"));
    }

    #[test]
    fn root_element_closes_even_when_a_programme_is_skipped() {
        let mut bad = programme("ch1", "", 1700000000, 1700003600);
        bad.title = String::new();
        let programmes = vec![
            programme("ch1", "Before", 1700000000, 1700003600),
            bad,
            programme("ch1", "After", 1700003600, 1700007200),
        ];

        let output = render(&programmes, &[]);
        assert_eq!(output.matches("<programme ").count(), 2);
        assert!(output.ends_with("</tv>"));
    }

    #[test]
    fn raw_blocks_are_inlined_without_their_wrapper() {
        let raw = vec![
            r#"<?xml version="1.0" encoding="utf-8" ?><tv generator-info-name="other"><channel id="ext"></channel></tv>"#
                .to_string(),
        ];
        let output = render(&[], &raw);

        assert_eq!(output.matches("<?xml").count(), 1);
        assert_eq!(output.matches("<tv").count(), 1);
        assert!(output.contains(r#"<channel id="ext"></channel>"#));
    }
}
