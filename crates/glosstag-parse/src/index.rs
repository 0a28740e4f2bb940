//! Corpus index files.
//!
//! The standoff layout ships `index.byid.tab` next to the entry
//! directories: one line per synset, tab separated, the synset id first
//! and one or more relative file-family paths after it. Lines that do not
//! carry both pieces are skipped.

use std::collections::BTreeMap;
use std::path::Path;

use crate::{ParseError, encoding};

/// Parse an index file into key to relative-path lists. Keys keep their
/// first occurrence; the map iterates in sorted order, which makes corpus
/// walks deterministic.
pub fn parse_index_file(path: &Path) -> Result<BTreeMap<String, Vec<String>>, ParseError> {
    let (text, _) = encoding::read_text(path)?;
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let Some(key) = fields.next() else { continue };
        let paths: Vec<String> = fields
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if key.is_empty() || paths.is_empty() {
            continue;
        }
        map.entry(key.to_string()).or_insert(paths);
    }
    Ok(map)
}
