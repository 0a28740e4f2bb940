//! Corpus discovery and whole-corpus parsing.
//!
//! A corpus root holds a `merged/` directory, a `standoff/` directory, or
//! both; when both are present the merged layout is parsed and the
//! standoff one ignored, since it encodes the same entries. Whatever the
//! layout, the result is one flat entry list with unique synset ids plus
//! the validation summary accumulated by the loader.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glosstag_types::{GlossEntry, Pos, SynsetKey};
use tracing::{debug, info, warn};

use crate::dtd::ValidationSummary;
use crate::index;
use crate::loader::{ParseOptions, XmlLoader};
use crate::{ParseError, merged, standoff};

pub const MERGED_DIR: &str = "merged";
pub const STANDOFF_DIR: &str = "standoff";
pub const INDEX_BY_ID: &str = "index.byid.tab";

/// The four per-POS files of the merged layout.
pub const MERGED_FILES: [(Pos, &str); 4] = [
    (Pos::Noun, "noun.xml"),
    (Pos::Verb, "verb.xml"),
    (Pos::Adj, "adj.xml"),
    (Pos::Adv, "adv.xml"),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Layout {
    Merged,
    Standoff,
}

/// Which layout a corpus root will be parsed as, if any.
pub fn detect_layout(root: &Path) -> Option<Layout> {
    if root.join(MERGED_DIR).is_dir() {
        return Some(Layout::Merged);
    }
    if root.join(STANDOFF_DIR).is_dir() {
        return Some(Layout::Standoff);
    }
    None
}

/// Parsed corpus: entries in source order (deduplicated) and the
/// validation summary for the run.
#[derive(Clone, Debug)]
pub struct CorpusOutcome {
    pub entries: Vec<GlossEntry>,
    pub summary: ValidationSummary,
}

/// Parse everything under a corpus root.
pub fn parse_corpus(root: &Path, options: &ParseOptions) -> Result<CorpusOutcome, ParseError> {
    let mut loader = XmlLoader::new(options)?;
    let mut entries = Vec::new();

    match detect_layout(root) {
        Some(Layout::Merged) => {
            parse_merged_dir(&root.join(MERGED_DIR), &mut loader, &mut entries)?;
        }
        Some(Layout::Standoff) => {
            parse_standoff_dir(&root.join(STANDOFF_DIR), options, &mut loader, &mut entries)?;
        }
        None => warn!(
            "no {}/ or {}/ directory under {}",
            MERGED_DIR,
            STANDOFF_DIR,
            root.display()
        ),
    }

    dedup(&mut entries);
    info!("parsed {} entries from {}", entries.len(), root.display());
    Ok(CorpusOutcome {
        entries,
        summary: loader.summary(),
    })
}

fn parse_merged_dir(
    dir: &Path,
    loader: &mut XmlLoader,
    entries: &mut Vec<GlossEntry>,
) -> Result<(), ParseError> {
    for (pos, file) in MERGED_FILES {
        let path = dir.join(file);
        if !path.exists() {
            debug!("no {} file in {}", pos, dir.display());
            continue;
        }
        if let Some(doc) = loader.load(&path)? {
            let extracted = merged::extract_entries(&doc);
            info!("{}: {} entries", path.display(), extracted.len());
            entries.extend(extracted);
        }
    }
    Ok(())
}

fn parse_standoff_dir(
    dir: &Path,
    options: &ParseOptions,
    loader: &mut XmlLoader,
    entries: &mut Vec<GlossEntry>,
) -> Result<(), ParseError> {
    let index_path = dir.join(INDEX_BY_ID);
    if !index_path.exists() {
        warn!("standoff layout without {}, nothing to parse", INDEX_BY_ID);
        return Ok(());
    }
    let index = index::parse_index_file(&index_path)?;
    info!("standoff index lists {} entries", index.len());

    for (id, paths) in &index {
        let Some(key) = SynsetKey::parse(id) else {
            debug!("index key '{}' is not a synset id, skipping", id);
            continue;
        };
        let Some(first) = paths.first() else { continue };
        let (family_dir, prefix) = family_location(dir, first);
        match standoff::assemble_entry(&family_dir, &prefix, &key, loader) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(err) if options.continue_on_error => {
                warn!("skipping standoff entry {}: {}", id, err);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Resolve an index path like `00/n00001740` into the family directory and
/// file-name prefix.
fn family_location(dir: &Path, rel: &str) -> (PathBuf, String) {
    let rel_path = Path::new(rel);
    let prefix = rel_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(rel);
    let prefix = prefix.strip_suffix(".txt").unwrap_or(prefix).to_string();
    let family_dir = match rel_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => dir.join(parent),
        _ => dir.to_path_buf(),
    };
    (family_dir, prefix)
}

/// Drop entries without an id and later duplicates of an already seen id.
fn dedup(entries: &mut Vec<GlossEntry>) {
    let mut seen = HashSet::new();
    entries.retain(|entry| {
        if entry.synset_id.is_empty() {
            warn!("dropping entry with an empty synset id");
            return false;
        }
        if seen.insert(entry.synset_id.clone()) {
            true
        } else {
            warn!("duplicate synset id '{}', keeping the first", entry.synset_id);
            false
        }
    });
}

/// Every XML file a validation-only run would look at, in parse order.
pub fn corpus_xml_files(root: &Path) -> Result<Vec<PathBuf>, ParseError> {
    let mut files = Vec::new();
    match detect_layout(root) {
        Some(Layout::Merged) => {
            let dir = root.join(MERGED_DIR);
            for (_, file) in MERGED_FILES {
                let path = dir.join(file);
                if path.exists() {
                    files.push(path);
                }
            }
        }
        Some(Layout::Standoff) => {
            let dir = root.join(STANDOFF_DIR);
            let index_path = dir.join(INDEX_BY_ID);
            if !index_path.exists() {
                return Ok(files);
            }
            for paths in index::parse_index_file(&index_path)?.values() {
                let Some(first) = paths.first() else { continue };
                let (family_dir, prefix) = family_location(&dir, first);
                for suffix in ["wngloss", "wnann", "wnword", "wncoll", "wndc"] {
                    let path = family_dir.join(format!("{prefix}-{suffix}.xml"));
                    if path.exists() {
                        files.push(path);
                    }
                }
            }
        }
        None => {}
    }
    Ok(files)
}
