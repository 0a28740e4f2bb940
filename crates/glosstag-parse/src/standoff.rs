//! Standoff-layout assembly: one entry from a family of files.
//!
//! A standoff entry is anchored by `{prefix}.txt`, the gloss text that
//! every annotation file references by character offsets. The companion
//! files are all optional and all share one shape, `<struct>` elements
//! with `<feat name value>` children:
//!
//! - `{prefix}-wngloss.xml`: definition and example spans
//! - `{prefix}-wnann.xml`: tokens
//! - `{prefix}-wnword.xml`: sense annotations
//! - `{prefix}-wncoll.xml`: collocations
//! - `{prefix}-wndc.xml`: discontiguity markers and member nodes
//!
//! A missing anchor makes the whole entry unassemblable; a missing
//! companion just leaves its collection empty.

use std::collections::HashMap;
use std::path::Path;

use glosstag_types::{
    Annotation, Collocation, DEFAULT_SEPARATOR, DisambTag, GlossEntry, StructSpan, SynsetKey,
    Token, TokenKind,
};
use tracing::debug;

use crate::loader::XmlLoader;
use crate::wsd;
use crate::xml::{Document, Element};
use crate::{ParseError, encoding};

/// Assemble the entry for one file family. `dir` and `prefix` locate the
/// family on disk; `key` is the identity derived from the corpus index.
/// Returns `None` when the anchor text is missing.
pub fn assemble_entry(
    dir: &Path,
    prefix: &str,
    key: &SynsetKey,
    loader: &mut XmlLoader,
) -> Result<Option<GlossEntry>, ParseError> {
    let anchor = dir.join(format!("{prefix}.txt"));
    if !anchor.exists() {
        debug!("no anchor text for '{}', skipping entry", prefix);
        return Ok(None);
    }
    let (text, _) = encoding::read_text(&anchor)?;
    let gloss = text.trim().to_string();

    let mut entry = GlossEntry::new(key.to_string(), key.offset_string(), key.pos);
    entry.original_text = gloss.clone();
    entry.tokenized_text = gloss.clone();

    if let Some(doc) = load_companion(loader, dir, prefix, "wngloss")? {
        for s in structs(&doc) {
            let span = StructSpan {
                id: s.attr("id").unwrap_or_default().to_string(),
                start: parse_offset(s.attr("from")),
                end: parse_offset(s.attr("to")),
            };
            match s.attr("type") {
                Some("def") => entry.definitions.push(span),
                Some("ex") => entry.examples.push(span),
                _ => {}
            }
        }
    }

    if let Some(doc) = load_companion(loader, dir, prefix, "wnann")? {
        for s in structs(&doc) {
            entry.tokens.push(token_from_struct(s, &gloss));
        }
    }

    if let Some(doc) = load_companion(loader, dir, prefix, "wnword")? {
        for s in structs(&doc) {
            let feats = feats(s);
            // Struct ids in wnword name the annotated token directly.
            entry.annotations.push(Annotation {
                id: s.attr("id").unwrap_or_default().to_string(),
                token_id: None,
                lemma: feats.get("lemma").map(|v| v.to_string()),
                sense_key: feats.get("wnsk").map(|v| v.to_string()),
                tag: s.attr("type").and_then(DisambTag::from_attr),
            });
        }
    }

    if let Some(doc) = load_companion(loader, dir, prefix, "wncoll")? {
        for s in structs(&doc) {
            let (mut coll, label) = collocation_from_struct(s);
            wsd::resolve_members(&mut coll, label.as_deref(), &entry.tokens);
            entry.collocations.push(coll);
        }
    }

    if let Some(doc) = load_companion(loader, dir, prefix, "wndc")? {
        apply_discontiguous(&doc, &mut entry.collocations);
    }

    Ok(Some(entry))
}

fn load_companion(
    loader: &mut XmlLoader,
    dir: &Path,
    prefix: &str,
    suffix: &str,
) -> Result<Option<Document>, ParseError> {
    let path = dir.join(format!("{prefix}-{suffix}.xml"));
    if !path.exists() {
        return Ok(None);
    }
    loader.load(&path)
}

fn structs<'a>(doc: &'a Document) -> impl Iterator<Item = &'a Element> + 'a {
    doc.root.descendants().filter(|el| el.name == "struct")
}

fn feats<'a>(s: &'a Element) -> HashMap<&'a str, &'a str> {
    s.find_all("feat")
        .filter_map(|f| Some((f.attr("name")?, f.attr("value")?)))
        .collect()
}

/// Token from a `wnann` struct. The surface string is the anchor slice at
/// `from..to` unless a `text` feature overrides it; offsets count
/// characters, not bytes. Unrecognized feature names are ignored.
fn token_from_struct(s: &Element, anchor: &str) -> Token {
    let feats = feats(s);
    let start = parse_offset(s.attr("from"));
    let end = parse_offset(s.attr("to"));
    let text = feats
        .get("text")
        .map(|v| v.to_string())
        .unwrap_or_else(|| slice_chars(anchor, start, end));
    Token {
        id: s.attr("id").unwrap_or_default().to_string(),
        text,
        lemma: feats.get("lemma").map(|v| v.to_string()),
        pos: feats.get("pos").map(|v| v.to_string()),
        tag: feats.get("tag").and_then(|t| DisambTag::from_attr(t)),
        kind: s
            .attr("type")
            .and_then(TokenKind::from_label)
            .unwrap_or(TokenKind::WordForm),
        start,
        end,
        separator: feats
            .get("sep")
            .map(|v| v.to_string())
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
        coll: feats.get("coll").map(|v| v.to_string()),
    }
}

fn collocation_from_struct(s: &Element) -> (Collocation, Option<String>) {
    let feats = feats(s);
    let id = s.attr("id").unwrap_or_default().to_string();
    let label = feats
        .get("coll")
        .map(|v| v.to_string())
        .or_else(|| id.split_once("_coll.").map(|(_, suffix)| suffix.to_string()));
    let coll = Collocation {
        id,
        text: feats.get("text").map(|v| v.to_string()).unwrap_or_default(),
        lemma: feats.get("lemma").map(|v| v.to_string()),
        sense_key: feats.get("wnsk").map(|v| v.to_string()),
        tag: s.attr("type").and_then(DisambTag::from_attr),
        glob_type: feats.get("glob").map(|v| v.to_string()),
        is_discontiguous: false,
        token_ids: Vec::new(),
    };
    (coll, label)
}

/// Patch collocations from a `wndc` document.
///
/// An `auto` struct marks the collocation with its id as discontiguous; a
/// marker whose id matches nothing is a silent no-op. A `node` struct
/// (id `{collocation}.{n}`) contributes member token ids through its
/// `idref`/`wf`/`cf` features, skipping members already resolved.
fn apply_discontiguous(doc: &Document, collocations: &mut Vec<Collocation>) {
    let index: HashMap<String, usize> = collocations
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.clone(), i))
        .collect();

    for s in structs(doc) {
        let id = s.attr("id").unwrap_or_default();
        match s.attr("type") {
            Some("auto") => match index.get(id) {
                Some(&i) => collocations[i].is_discontiguous = true,
                None => debug!("discontiguity marker for unknown collocation '{}'", id),
            },
            Some("node") => {
                let Some((parent, _)) = id.rsplit_once('.') else {
                    continue;
                };
                let Some(&i) = index.get(parent) else {
                    debug!("member node for unknown collocation '{}'", parent);
                    continue;
                };
                for f in s.find_all("feat") {
                    let (Some(name), Some(value)) = (f.attr("name"), f.attr("value")) else {
                        continue;
                    };
                    if matches!(name, "idref" | "wf" | "cf")
                        && !collocations[i].token_ids.iter().any(|t| t == value)
                    {
                        collocations[i].token_ids.push(value.to_string());
                    }
                }
            }
            _ => {}
        }
    }
}

fn parse_offset(value: Option<&str>) -> u32 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn slice_chars(anchor: &str, start: u32, end: u32) -> String {
    if end <= start {
        return String::new();
    }
    anchor
        .chars()
        .skip(start as usize)
        .take((end - start) as usize)
        .collect()
}
