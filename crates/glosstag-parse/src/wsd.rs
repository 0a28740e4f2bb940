//! Decomposition of sense-disambiguated gloss markup.
//!
//! The `<gloss desc="wsd">` body of a merged synset nests definition and
//! example sections whose token stream mixes `wf`, `cf` and wrapper
//! elements (quoted forms keep their tokens one level deeper). Everything
//! here works on the already parsed tree: one document-order walk collects
//! tokens with their nested sense annotations, then a second pass builds
//! collocations and resolves their members.

use glosstag_types::{
    Annotation, Collocation, DEFAULT_SEPARATOR, DisambTag, GlossEntry, StructSpan, Token, TokenKind,
};

use crate::xml::Element;

/// Decompose a `wsd` gloss body into `entry`'s token, annotation,
/// collocation and span collections.
pub fn decompose(wsd: &Element, entry: &mut GlossEntry) {
    for section in wsd.children_elements() {
        let span = StructSpan {
            id: section.attr("id").unwrap_or_default().to_string(),
            start: parse_offset(section.attr("from")),
            end: parse_offset(section.attr("to")),
        };
        match section.name.as_str() {
            "def" => entry.definitions.push(span),
            "ex" => entry.examples.push(span),
            _ => {}
        }
    }

    // Annotations live nested inside the element they tag. A token's `id`
    // points back at its token; a glob's `id` has no single token, so its
    // annotation stands alone while the sense key and lemma also feed the
    // collocation record.
    for el in wsd.descendants() {
        if matches!(el.name.as_str(), "wf" | "cf") {
            let token = token_from_element(el);
            for nested in el.find_all("id") {
                entry
                    .annotations
                    .push(annotation_for(nested, Some(&token.id)));
            }
            entry.tokens.push(token);
        }
    }

    for el in wsd.descendants() {
        if el.name == "glob" {
            for nested in el.find_all("id") {
                entry.annotations.push(annotation_for(nested, None));
            }
            let (mut coll, label) = collocation_from_glob(el);
            resolve_members(&mut coll, label.as_deref(), &entry.tokens);
            entry.collocations.push(coll);
        }
    }
}

fn annotation_for(el: &Element, token_id: Option<&str>) -> Annotation {
    Annotation {
        id: el.attr("id").unwrap_or_default().to_string(),
        token_id: token_id.map(str::to_string),
        lemma: el.attr("lemma").map(str::to_string),
        sense_key: el.attr("sk").map(str::to_string),
        tag: el.attr("tag").and_then(DisambTag::from_attr),
    }
}

/// Build a token from a `wf`/`cf` element. An explicit `type` attribute
/// wins over the element name; the merged layout has no character spans,
/// so `start`/`end` stay zero.
fn token_from_element(el: &Element) -> Token {
    let kind = el
        .attr("type")
        .and_then(TokenKind::from_label)
        .or_else(|| TokenKind::from_label(&el.name))
        .unwrap_or(TokenKind::WordForm);
    Token {
        id: el.attr("id").unwrap_or_default().to_string(),
        text: el.text(),
        lemma: el.attr("lemma").map(str::to_string),
        pos: el.attr("pos").map(str::to_string),
        tag: el.attr("tag").and_then(DisambTag::from_attr),
        kind,
        start: 0,
        end: 0,
        separator: el
            .attr("sep")
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string()),
        coll: el.attr("coll").map(str::to_string),
    }
}

/// Build a collocation from a `glob` element, returning the membership
/// label its `cf` tokens reference. The label is the `coll` attribute when
/// present, otherwise the id suffix after `_coll.`.
fn collocation_from_glob(el: &Element) -> (Collocation, Option<String>) {
    let id = el.attr("id").unwrap_or_default().to_string();
    let label = el
        .attr("coll")
        .map(str::to_string)
        .or_else(|| id.split_once("_coll.").map(|(_, suffix)| suffix.to_string()));

    let nested = el.find("id");
    let lemma = nested
        .and_then(|n| n.attr("lemma"))
        .map(str::to_string)
        .or_else(|| el.attr("lemma").map(str::to_string));

    let coll = Collocation {
        id,
        text: lemma.clone().unwrap_or_default(),
        lemma,
        sense_key: nested.and_then(|n| n.attr("sk")).map(str::to_string),
        tag: el.attr("tag").and_then(DisambTag::from_attr),
        glob_type: el.attr("glob").map(str::to_string),
        is_discontiguous: false,
        token_ids: Vec::new(),
    };
    (coll, label)
}

/// Fill `token_ids` with the `cf` tokens carrying `label` and infer
/// discontiguity from their positions in the token stream: a gap between
/// consecutive members makes the collocation discontiguous. Standoff
/// assembly shares this rule.
pub(crate) fn resolve_members(coll: &mut Collocation, label: Option<&str>, tokens: &[Token]) {
    let Some(label) = label else { return };
    let mut positions = Vec::new();
    for (idx, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::CollocationForm {
            continue;
        }
        let Some(labels) = &token.coll else { continue };
        if labels.split(',').map(str::trim).any(|l| l == label) {
            positions.push(idx);
            coll.token_ids.push(token.id.clone());
        }
    }
    coll.is_discontiguous = positions.windows(2).any(|w| w[1] != w[0] + 1);
}

fn parse_offset(value: Option<&str>) -> u32 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}
