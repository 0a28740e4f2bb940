//! JSONL persistence and queries for converted entries.
//!
//! A converted corpus is one [`GlossEntry`] JSON document per line. This is
//! the interchange format between the converter and the downstream tooling.
//! Writing, validation and search all go line by line; only
//! [`read_entries`] materializes a whole file.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use glosstag_types::{GlossEntry, Pos};

/// Matches returned by [`search`] when the caller sets no cap.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum JsonlError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{file}:{line}: invalid record: {source}")]
    Record {
        file: String,
        line: usize,
        source: serde_json::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Write entries as one JSON document per line, returning the line count.
pub fn write_entries(path: &Path, entries: &[GlossEntry]) -> Result<usize, JsonlError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for entry in entries {
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    info!("wrote {} entries to {}", entries.len(), path.display());
    Ok(entries.len())
}

/// Read a JSONL file back into entries. Blank lines are skipped; a line
/// that is not a valid entry fails with its line number.
pub fn read_entries(path: &Path) -> Result<Vec<GlossEntry>, JsonlError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let entry = serde_json::from_str(trimmed).map_err(|source| JsonlError::Record {
            file: path.display().to_string(),
            line: number + 1,
            source,
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// One finding from [`validate_file`].
#[derive(Clone, Debug, Serialize)]
pub struct LineIssue {
    /// 1-based line number.
    pub line: usize,
    pub message: String,
}

/// Check that every line of a JSONL file deserializes as an entry.
/// Unlike [`read_entries`] this collects findings instead of stopping
/// at the first bad record.
pub fn validate_file(path: &Path) -> Result<Vec<LineIssue>, JsonlError> {
    let reader = BufReader::new(File::open(path)?);
    let mut issues = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Err(err) = serde_json::from_str::<GlossEntry>(trimmed) {
            issues.push(LineIssue {
                line: number + 1,
                message: err.to_string(),
            });
        }
    }
    Ok(issues)
}

/// In-memory search criteria; unset fields do not constrain.
#[derive(Clone, Debug, Default)]
pub struct SearchFilter {
    /// Exact synset id.
    pub synset_id: Option<String>,
    pub pos: Option<Pos>,
    /// Case-insensitive substring match against terms.
    pub term: Option<String>,
    /// Match cap, [`DEFAULT_SEARCH_LIMIT`] when unset.
    pub limit: Option<usize>,
}

/// Filter entries, preserving their order.
pub fn search<'a>(entries: &'a [GlossEntry], filter: &SearchFilter) -> Vec<&'a GlossEntry> {
    let needle = filter.term.as_ref().map(|t| t.to_lowercase());
    entries
        .iter()
        .filter(|entry| matches(entry, filter, needle.as_deref()))
        .take(filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
        .collect()
}

/// Stream a JSONL file through the search filter one line at a time, so
/// the corpus is never held in memory and the scan stops at the match
/// cap. A line that does not deserialize is skipped with a warning, the
/// same tolerance [`validate_file`] applies.
pub fn search_file(path: &Path, filter: &SearchFilter) -> Result<Vec<GlossEntry>, JsonlError> {
    let reader = BufReader::new(File::open(path)?);
    let needle = filter.term.as_ref().map(|t| t.to_lowercase());
    let limit = filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let mut hits = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        if hits.len() >= limit {
            break;
        }
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<GlossEntry>(trimmed) {
            Ok(entry) => {
                if matches(&entry, filter, needle.as_deref()) {
                    hits.push(entry);
                }
            }
            Err(err) => warn!(
                "{}:{}: skipping invalid record: {}",
                path.display(),
                number + 1,
                err
            ),
        }
    }
    Ok(hits)
}

fn matches(entry: &GlossEntry, filter: &SearchFilter, term_needle: Option<&str>) -> bool {
    if let Some(id) = &filter.synset_id
        && entry.synset_id != *id
    {
        return false;
    }
    if let Some(pos) = filter.pos
        && entry.pos != pos
    {
        return false;
    }
    if let Some(needle) = term_needle
        && !entry
            .terms
            .iter()
            .any(|term| term.to_lowercase().contains(needle))
    {
        return false;
    }
    true
}

/// Per-POS means over a converted corpus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PosAverages {
    /// Mean length of the original gloss text, in characters.
    pub gloss_length: f64,
    pub token_count: f64,
}

/// Aggregates over a converted corpus.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct JsonlStats {
    pub total_synsets: u64,
    pub synsets_by_pos: BTreeMap<String, u64>,
    pub averages_by_pos: BTreeMap<String, PosAverages>,
    pub total_annotations: u64,
}

pub fn stats(entries: &[GlossEntry]) -> JsonlStats {
    let mut stats = JsonlStats {
        total_synsets: entries.len() as u64,
        ..JsonlStats::default()
    };
    let mut sums: BTreeMap<String, (u64, u64, u64)> = BTreeMap::new();
    for entry in entries {
        let (count, gloss_chars, tokens) =
            sums.entry(entry.pos.to_char().to_string()).or_default();
        *count += 1;
        *gloss_chars += entry.original_text.chars().count() as u64;
        *tokens += entry.tokens.len() as u64;
        stats.total_annotations += entry.annotations.len() as u64;
    }
    for (pos, (count, gloss_chars, tokens)) in sums {
        stats.synsets_by_pos.insert(pos.clone(), count);
        stats.averages_by_pos.insert(
            pos,
            PosAverages {
                gloss_length: gloss_chars as f64 / count as f64,
                token_count: tokens as f64 / count as f64,
            },
        );
    }
    stats
}

/// Flatten entries to a spreadsheet-friendly CSV file. List fields are
/// joined with `"; "`.
pub fn export_csv(path: &Path, entries: &[GlossEntry]) -> Result<(), JsonlError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "synset_id",
        "pos",
        "offset",
        "terms",
        "sense_keys",
        "original_text",
    ])?;
    for entry in entries {
        let pos = entry.pos.to_char().to_string();
        let terms = entry.terms.join("; ");
        let sense_keys = entry.sense_keys.join("; ");
        writer.write_record([
            entry.synset_id.as_str(),
            pos.as_str(),
            entry.offset.as_str(),
            terms.as_str(),
            sense_keys.as_str(),
            entry.original_text.as_str(),
        ])?;
    }
    writer.flush()?;
    info!("exported {} entries to {}", entries.len(), path.display());
    Ok(())
}

/// One finding from [`validate_schema`].
#[derive(Clone, Debug, Serialize)]
pub struct SchemaIssue {
    pub synset_id: String,
    pub message: String,
}

/// Check the internal consistency of converted entries: identity fields
/// agree, token ids are unique, annotation and collocation references
/// resolve, and spans stay inside the tokenized text.
pub fn validate_schema(entries: &[GlossEntry]) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for entry in entries {
        let mut report = |message: String| {
            issues.push(SchemaIssue {
                synset_id: entry.synset_id.clone(),
                message,
            });
        };

        if !seen.insert(entry.synset_id.as_str()) {
            report("duplicate synset id".to_string());
        }
        let expected = format!("{}{}", entry.pos.to_char(), entry.offset);
        if entry.synset_id != expected {
            report(format!(
                "synset id does not match pos and offset (expected '{expected}')"
            ));
        }
        if entry.offset.len() != 8 || !entry.offset.bytes().all(|b| b.is_ascii_digit()) {
            report(format!("offset '{}' is not eight digits", entry.offset));
        }

        let mut token_ids: HashSet<&str> = HashSet::new();
        for token in &entry.tokens {
            if !token_ids.insert(token.id.as_str()) {
                report(format!("duplicate token id '{}'", token.id));
            }
        }
        for ann in &entry.annotations {
            // Annotations without a token reference are legitimate: glob
            // markers tag a collocation, not a single token.
            if let Some(target) = ann.token_id.as_deref()
                && !token_ids.contains(target)
            {
                report(format!(
                    "annotation '{}' references missing token '{}'",
                    ann.id, target
                ));
            }
        }
        for coll in &entry.collocations {
            for member in &coll.token_ids {
                if !token_ids.contains(member.as_str()) {
                    report(format!(
                        "collocation '{}' references missing token '{}'",
                        coll.id, member
                    ));
                }
            }
        }

        let text_len = entry.tokenized_text.chars().count() as u32;
        for span in entry.definitions.iter().chain(&entry.examples) {
            if span.start > span.end {
                report(format!("span '{}' starts after it ends", span.id));
            } else if span.end > text_len {
                report(format!(
                    "span '{}' reaches past the tokenized text ({} > {})",
                    span.id, span.end, text_len
                ));
            }
        }
    }
    issues
}
