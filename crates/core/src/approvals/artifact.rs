use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::action::ActionRequest;

const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6f";
const LEGACY_KEY_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";
const SUBJECT_SLUG_MAX_CHARS: usize = 50;

/// The single object written when a communication is committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentArtifact {
    pub key: String,
    pub content: String,
}

impl SentArtifact {
    /// Key layout: `{prefix}/{date}/{timestamp}-{nonce}_{recipient}_{subject-slug}.txt`.
    /// The microsecond timestamp plus nonce keeps concurrent commits of the same
    /// content on distinct keys.
    pub fn render(request: &ActionRequest, at: DateTime<Utc>, prefix: &str) -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        let key = format!(
            "{}/{}/{}-{}_{}_{}.txt",
            prefix.trim_end_matches('/'),
            at.format("%Y-%m-%d"),
            at.format(KEY_TIMESTAMP_FORMAT),
            &nonce[..8],
            request.recipient,
            subject_slug(&request.subject),
        );
        let content = format!(
            "To: {}\nSubject: {}\nDate: {}\n\n{}\n",
            request.recipient,
            request.subject,
            at.format("%Y-%m-%d %H:%M:%S"),
            request.body,
        );
        Self { key, content }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentSummary {
    pub sent_at: NaiveDateTime,
    pub recipient: String,
    pub subject: String,
}

/// Recovers timestamp, recipient and a display subject from an artifact key.
/// Keys that do not follow the layout yield `None`.
///
/// Current keys carry a nonce and a slug without `_`, so the recipient is
/// everything up to the last `_`. Legacy keys (no nonce) may keep `_` in the
/// subject and are split on the first two `_` instead.
pub fn parse_key(key: &str) -> Option<SentSummary> {
    let file_name = key.rsplit('/').next()?.strip_suffix(".txt")?;
    let (stamp, rest) = file_name.split_once('_')?;

    let (sent_at, (recipient, slug)) = match stamp.split_once('-') {
        Some((timestamp, _nonce)) => (
            NaiveDateTime::parse_from_str(timestamp, KEY_TIMESTAMP_FORMAT).ok()?,
            rest.rsplit_once('_')?,
        ),
        None => (
            NaiveDateTime::parse_from_str(stamp, LEGACY_KEY_TIMESTAMP_FORMAT).ok()?,
            rest.split_once('_')?,
        ),
    };
    if recipient.is_empty() {
        return None;
    }

    Some(SentSummary { sent_at, recipient: recipient.to_string(), subject: title_case(slug) })
}

fn subject_slug(subject: &str) -> String {
    subject
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { '-' })
        .take(SUBJECT_SLUG_MAX_CHARS)
        .collect()
}

fn title_case(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{parse_key, SentArtifact};
    use crate::domain::action::ActionRequest;

    #[test]
    fn renders_key_and_plain_text_content() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 5).single().expect("valid time");
        let request = ActionRequest::new("jane_doe@bank-x.com", "Bond Y: 4.5% offer!", "Hello");

        let artifact = SentArtifact::render(&request, at, "sent-emails/");

        assert!(artifact.key.starts_with("sent-emails/2026-10-19/20261019T093005000000-"));
        assert!(artifact.key.ends_with("_jane_doe@bank-x.com_bond-y--4-5--offer-.txt"));
        assert_eq!(
            artifact.content,
            "To: jane_doe@bank-x.com\nSubject: Bond Y: 4.5% offer!\nDate: 2026-10-19 09:30:05\n\nHello\n"
        );
    }

    #[test]
    fn same_content_at_same_instant_gets_distinct_keys() {
        let at = Utc::now();
        let request = ActionRequest::new("a@b.com", "Offer", "Hello");
        let first = SentArtifact::render(&request, at, "sent-emails");
        let second = SentArtifact::render(&request, at, "sent-emails");
        assert_ne!(first.key, second.key);
        assert_eq!(first.content, second.content);
    }

    #[test]
    fn parse_round_trips_rendered_keys() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single().expect("valid time");
        let request = ActionRequest::new("jane_doe@bank-x.com", "Government Bond Y", "Hello");
        let artifact = SentArtifact::render(&request, at, "sent-emails");

        let summary = parse_key(&artifact.key).expect("key should parse");

        assert_eq!(summary.recipient, "jane_doe@bank-x.com");
        assert_eq!(summary.subject, "Government Bond Y");
        assert_eq!(
            summary.sent_at,
            NaiveDate::from_ymd_opt(2026, 1, 2)
                .and_then(|date| date.and_hms_opt(3, 4, 5))
                .expect("valid datetime")
        );
    }

    #[test]
    fn parse_accepts_legacy_second_resolution_keys() {
        let summary = parse_key("sent-emails/2025-11-03/20251103T142200_a@b.com_quarterly-update.txt")
            .expect("legacy key should parse");
        assert_eq!(summary.subject, "Quarterly Update");
        assert_eq!(summary.recipient, "a@b.com");
    }

    #[test]
    fn parse_keeps_underscores_of_legacy_subjects_out_of_the_recipient() {
        let summary = parse_key("sent-emails/2025-11-03/20251103T142200_a@b.com_q3_update.txt")
            .expect("legacy key should parse");
        assert_eq!(summary.recipient, "a@b.com");
        assert_eq!(summary.subject, "Q3_update");
    }

    #[test]
    fn parse_skips_foreign_files() {
        assert_eq!(parse_key("sent-emails/README.md"), None);
        assert_eq!(parse_key("sent-emails/2025-11-03/notes.txt"), None);
        assert_eq!(parse_key("sent-emails/2025-11-03/garbage_a@b.com_x.txt"), None);
    }
}
