//! `@name` mentions in cast text.
//!
//! A resolved mention is cut out of the text and recorded as an identifier
//! plus the byte offset where clients render it back. Names that do not
//! resolve stay in the text as typed.

use hubstrap_types::Fid;
use regex::Regex;
use std::sync::OnceLock;

use crate::message::CastAddBody;

fn mention_pattern() -> Option<&'static Regex> {
	static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
	PATTERN
		.get_or_init(|| Regex::new(r"(?:^|[^A-Za-z0-9_@.])@([a-z0-9][a-z0-9-]{0,15})\b").ok())
		.as_ref()
}

/// One `@name` occurrence, as a byte range over the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionSpan {
	pub name: String,
	/// Offset of the `@`.
	pub start: usize,
	/// Offset one past the last name byte.
	pub end: usize,
}

pub fn parse_mentions(text: &str) -> Vec<MentionSpan> {
	let Some(pattern) = mention_pattern() else {
		return Vec::new();
	};
	pattern
		.captures_iter(text)
		.filter_map(|captures| {
			let name = captures.get(1)?;
			Some(MentionSpan {
				name: name.as_str().to_string(),
				start: name.start() - 1,
				end: name.end(),
			})
		})
		.collect()
}

/// Builds the cast body for `text`, removing every span that has an entry
/// in `resolved`.
pub fn apply_mentions(text: &str, spans: &[MentionSpan], resolved: &[Option<Fid>]) -> CastAddBody {
	let mut body = CastAddBody::default();
	let mut cursor = 0;
	for (span, fid) in spans.iter().zip(resolved) {
		let Some(fid) = fid else {
			continue;
		};
		body.text.push_str(&text[cursor..span.start]);
		body.mentions.push(*fid);
		body.mentions_positions.push(body.text.len() as u32);
		cursor = span.end;
	}
	body.text.push_str(&text[cursor..]);
	body
}
