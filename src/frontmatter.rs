//! Parse and rewrite the tag entry of a markdown note's metadata block.
//!
//! Hand-rolled key/value parsing (no serde_yaml). Two tag formats are
//! recognized: a `tags:` key inside a leading `---` frontmatter block
//! (inline list or `#a #b` tokens), and a legacy `Tags: #a #b` line in the
//! note body. Parsing never fails; a missing or malformed block simply
//! yields zero tags.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static TAGS_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Tags:[ \t]*(.*)$").unwrap());

/// Metadata extracted from a note's leading frontmatter block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteMetadata {
    /// Raw key/value pairs from the frontmatter block (keys lowercased).
    pub fields: BTreeMap<String, String>,
    /// Existing tags, normalized: `#` stripped, trimmed, deduplicated
    /// case-insensitively, original order preserved.
    pub tags: Vec<String>,
}

/// Location and style of the tag entry inside a note.
enum TagEntry {
    /// `tags:` key line inside the leading frontmatter block.
    BlockKey(Range<usize>),
    /// Legacy `Tags: #a #b` line in the body.
    Line(Range<usize>),
}

/// Parses a note's metadata.
///
/// Returns the frontmatter key/value mapping plus the normalized tag list.
/// Files without a frontmatter block, or with an unclosed one, are treated
/// as having no metadata fields; the legacy `Tags:` line is still honored.
pub fn parse(content: &str) -> NoteMetadata {
    let mut fields = BTreeMap::new();
    if let Some(block) = leading_block(content) {
        for line in content[block].lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = trimmed.split_once(':') {
                fields.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }
    }

    let tags = match find_tag_entry(content) {
        Some(TagEntry::BlockKey(range)) | Some(TagEntry::Line(range)) => {
            let line = &content[range];
            let value = line.split_once(':').map(|(_, v)| v).unwrap_or("");
            parse_tag_list(value)
        }
        None => Vec::new(),
    };

    NoteMetadata { fields, tags }
}

/// Rewrites the note's tag entry in place, preserving every other byte.
///
/// The existing entry keeps its style: a frontmatter `tags:` key is
/// rewritten as an inline list, a legacy `Tags:` line as `#`-prefixed
/// tokens. Notes without any tag entry get a `Tags: #a #b` line appended.
pub fn write_tags(content: &str, tags: &[String]) -> String {
    match find_tag_entry(content) {
        Some(TagEntry::BlockKey(range)) => {
            let rendered = format!("tags: [{}]", tags.join(", "));
            splice(content, range, &rendered)
        }
        Some(TagEntry::Line(range)) => {
            let rendered = format!("Tags: {}", hash_list(tags));
            splice(content, range, &rendered)
        }
        None => format!("{}\nTags: {}", content, hash_list(tags)),
    }
}

/// Renders tags as space-separated `#`-prefixed tokens.
fn hash_list(tags: &[String]) -> String {
    tags.iter()
        .map(|t| format!("#{t}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn splice(content: &str, range: Range<usize>, replacement: &str) -> String {
    format!(
        "{}{}{}",
        &content[..range.start],
        replacement,
        &content[range.end..]
    )
}

/// Byte range of the inner lines of a leading `---` block, if present and
/// properly closed.
fn leading_block(content: &str) -> Option<Range<usize>> {
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != "---" {
        return None;
    }
    let start = first.len();
    let mut pos = start;
    for line in lines {
        if line.trim_end() == "---" {
            return Some(start..pos);
        }
        pos += line.len();
    }
    None
}

/// Locates the tag entry, preferring the frontmatter `tags:` key over a
/// legacy `Tags:` body line.
fn find_tag_entry(content: &str) -> Option<TagEntry> {
    if let Some(block) = leading_block(content) {
        let mut pos = block.start;
        for line in content[block].split_inclusive('\n') {
            let trimmed = line.trim_end();
            if let Some((key, _)) = trimmed.split_once(':')
                && key.trim().eq_ignore_ascii_case("tags")
            {
                return Some(TagEntry::BlockKey(pos..pos + trimmed.len()));
            }
            pos += line.len();
        }
    }
    TAGS_LINE_RE.find(content).map(|m| TagEntry::Line(m.range()))
}

/// Parses a tag value: either an inline list `[a, b]` or whitespace-
/// separated tokens (`#a #b` or bare). Leading `#` is stripped, empty
/// entries dropped, duplicates removed case-insensitively.
fn parse_tag_list(value: &str) -> Vec<String> {
    let value = value.trim();
    let raw: Vec<&str> = if value.starts_with('[') && value.ends_with(']') {
        value[1..value.len() - 1].split(',').collect()
    } else {
        value.split_whitespace().collect()
    };

    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .map(|t| t.trim().trim_start_matches('#').trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}
