use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::types::{NormalizedPost, RawFeedEntry};

/// Prefix on every derived post id so ids never collide with another
/// pipeline writing to the same store.
pub const POST_ID_NAMESPACE: &str = "reddit_";

/// Body text used when an entry has neither title nor summary.
pub const NO_CONTENT: &str = "(no content)";

pub const UNKNOWN_AUTHOR: &str = "unknown";

/// Path segments that never identify a post on their own.
const GENERIC_SEGMENTS: [&str; 2] = ["comments", "r"];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(String),
}

/// Parses an Atom search feed into normalized posts.
///
/// Never fails: a malformed document yields an empty list. Timestamps that
/// cannot be parsed resolve to the current time.
pub fn parse_feed(bytes: &[u8], source: &str) -> Vec<NormalizedPost> {
    parse_feed_at(bytes, source, Utc::now())
}

/// [`parse_feed`] with an explicit clock for the timestamp fallback.
pub fn parse_feed_at(bytes: &[u8], source: &str, now: DateTime<Utc>) -> Vec<NormalizedPost> {
    match read_entries(bytes) {
        Ok(entries) => entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| normalize_entry(entry, source, index, now))
            .collect(),
        Err(e) => {
            tracing::debug!(source = %source, error = %e, "Discarding malformed feed document");
            Vec::new()
        }
    }
}

// ============================================================================
// XML
// ============================================================================

#[derive(Default)]
struct EntryBuilder {
    raw: RawFeedEntry,
    content: Option<String>,
}

impl EntryBuilder {
    fn finish(mut self) -> RawFeedEntry {
        // Reddit search feeds only carry <content>; plain Atom feeds use <summary>.
        if self.raw.summary.as_deref().map_or(true, |s| s.trim().is_empty()) {
            self.raw.summary = self.content;
        }
        self.raw
    }

    fn push_text(&mut self, path: &[Vec<u8>], text: &str) {
        let field = match path {
            [name] => match name.as_slice() {
                b"title" => &mut self.raw.title,
                b"summary" => &mut self.raw.summary,
                b"content" => &mut self.content,
                b"id" => &mut self.raw.native_id,
                b"updated" => &mut self.raw.updated,
                b"published" => &mut self.raw.published,
                _ => return,
            },
            [author, name] if author.as_slice() == b"author" && name.as_slice() == b"name" => {
                &mut self.raw.author
            }
            _ => return,
        };
        field.get_or_insert_with(String::new).push_str(text);
    }

    fn take_link(&mut self, e: &BytesStart<'_>, reader: &Reader<&[u8]>) {
        if self.raw.link.is_some() {
            return;
        }
        for attr in e.attributes().flatten() {
            if attr.key.local_name().as_ref() == b"href" {
                if let Ok(href) = attr.decode_and_unescape_value(reader.decoder()) {
                    self.raw.link = Some(href.to_string());
                }
            }
        }
    }
}

/// Reads every `<entry>` of an Atom document.
///
/// Elements are matched by local name so prefixed documents (`atom:entry`)
/// parse the same way. Only the 5 predefined XML entities are resolved here;
/// HTML entities inside the text are decoded during normalization.
pub(crate) fn read_entries(bytes: &[u8]) -> Result<Vec<RawFeedEntry>, ParseError> {
    // Text is kept untrimmed so adjacent text and CDATA chunks keep their
    // spacing; normalization trims each field once.
    let mut reader = Reader::from_reader(bytes);

    let mut entries = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    // Element names below the current <entry>
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                if name == b"entry" {
                    current = Some(EntryBuilder::default());
                    path.clear();
                } else if let Some(entry) = current.as_mut() {
                    if name == b"link" && path.is_empty() {
                        entry.take_link(&e, &reader);
                    }
                    path.push(name);
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    if e.local_name().as_ref() == b"link" && path.is_empty() {
                        entry.take_link(&e, &reader);
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(entry) = current.take() {
                        entries.push(entry.finish());
                    }
                    path.clear();
                } else if current.is_some() {
                    path.pop();
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(entry) = current.as_mut() {
                    let text = t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                    entry.push_text(&path, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(entry) = current.as_mut() {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    entry.push_text(&path, &text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

// ============================================================================
// Normalization
// ============================================================================

fn normalize_entry(
    raw: RawFeedEntry,
    source: &str,
    index: usize,
    now: DateTime<Utc>,
) -> NormalizedPost {
    let title = decode_markup(raw.title.as_deref());
    let summary = decode_markup(raw.summary.as_deref());
    let text = body_text(&title, &summary);

    let stamp = non_empty(raw.updated.as_deref()).or(non_empty(raw.published.as_deref()));
    let (created_at, timezone) = resolve_timestamp(stamp, now);

    let url = raw.link.unwrap_or_default();
    let author = non_empty(raw.author.as_deref())
        .unwrap_or(UNKNOWN_AUTHOR)
        .to_string();

    let id_source = non_empty(raw.native_id.as_deref()).or(non_empty(Some(url.as_str())));
    let native_id = derive_native_id(id_source, source, index);

    NormalizedPost {
        id: format!("{}{}", POST_ID_NAMESPACE, native_id),
        native_id,
        source: source.to_string(),
        title,
        text,
        author,
        url,
        created_at,
        timezone,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn decode_markup(value: Option<&str>) -> String {
    value
        .map(|v| html_escape::decode_html_entities(v).trim().to_string())
        .unwrap_or_default()
}

/// Title and summary separated by a blank line, or [`NO_CONTENT`].
pub(crate) fn body_text(title: &str, summary: &str) -> String {
    let parts: Vec<&str> = [title.trim(), summary.trim()]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        NO_CONTENT.to_string()
    } else {
        parts.join("\n\n")
    }
}

/// Last path segment of the entry id (or link) that is not a generic marker
/// or the source's own name, falling back to a placeholder unique within the
/// batch.
pub(crate) fn derive_native_id(raw: Option<&str>, source: &str, index: usize) -> String {
    raw.and_then(|raw| {
        raw.split('/')
            .rev()
            .map(str::trim)
            .find(|part| !part.is_empty() && !GENERIC_SEGMENTS.contains(part) && *part != source)
    })
    .map(str::to_string)
    .unwrap_or_else(|| format!("post_{}", index))
}

/// Resolve a feed timestamp to an offset-aware time plus a zone label.
///
/// Strings without an offset are taken as UTC. Missing or unparsable input
/// falls back to `now`, so every post gets a sortable timestamp.
pub(crate) fn resolve_timestamp(
    raw: Option<&str>,
    now: DateTime<Utc>,
) -> (DateTime<FixedOffset>, String) {
    match raw.and_then(parse_timestamp) {
        Some(resolved) => resolved,
        None => {
            if let Some(raw) = raw {
                tracing::debug!(timestamp = %raw, "Unparsable timestamp, using current time");
            }
            (now.fixed_offset(), "UTC".to_string())
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<(DateTime<FixedOffset>, String)> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some((dt, zone_label(dt.offset())));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some((dt, zone_label(dt.offset())));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some((naive.and_utc().fixed_offset(), "UTC".to_string()));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| (naive.and_utc().fixed_offset(), "UTC".to_string()))
}

fn zone_label(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    if seconds == 0 {
        return "UTC".to_string();
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let minutes = seconds.abs() / 60;
    format!("UTC{}{:02}:{:02}", sign, minutes / 60, minutes % 60)
}
