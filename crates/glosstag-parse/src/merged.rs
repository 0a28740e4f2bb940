//! Merged-layout extraction: per-POS files carrying whole synsets inline.
//!
//! Each `merged/{noun,verb,adj,adv}.xml` file holds thousands of `<synset>`
//! elements with terms, sense keys and up to three gloss projections
//! (`orig`, `text`, `wsd`). Extraction is per synset: one with an unusable
//! identity is dropped with a debug line while the rest of the file goes
//! through.

use glosstag_types::{GlossEntry, Pos};
use tracing::debug;

use crate::wsd;
use crate::xml::{Document, Element};

/// Pull every synset out of a parsed merged file, in document order.
pub fn extract_entries(doc: &Document) -> Vec<GlossEntry> {
    let mut entries = Vec::new();
    if doc.root.name == "synset" {
        entries.extend(parse_synset(&doc.root));
    }
    for el in doc.root.descendants() {
        if el.name == "synset" {
            entries.extend(parse_synset(el));
        }
    }
    entries
}

/// Build one entry. `id`, `ofs` and a recognizable `pos` are the identity
/// and are all required; anything else may be absent.
fn parse_synset(el: &Element) -> Option<GlossEntry> {
    let id = el.attr("id").filter(|v| !v.is_empty());
    let ofs = el.attr("ofs").filter(|v| !v.is_empty());
    let pos = el
        .attr("pos")
        .and_then(|v| v.chars().next())
        .and_then(Pos::from_char);
    let (Some(id), Some(ofs), Some(pos)) = (id, ofs, pos) else {
        debug!(
            "dropping synset at line {} with incomplete identity",
            el.line
        );
        return None;
    };
    let mut entry = GlossEntry::new(id, ofs, pos);

    if let Some(terms) = el.find("terms") {
        for term in terms.find_all("term") {
            let text = term.text();
            if !text.is_empty() {
                entry.terms.push(text);
            }
        }
    }
    if let Some(keys) = el.find("keys") {
        for sk in keys.find_all("sk") {
            let text = sk.text();
            if !text.is_empty() {
                entry.sense_keys.push(text);
            }
        }
    }

    for gloss in el.find_all("gloss") {
        match gloss.attr("desc") {
            Some("orig") => entry.original_text = projection_text(gloss, "orig"),
            Some("text") => entry.tokenized_text = projection_text(gloss, "text"),
            Some("wsd") => wsd::decompose(gloss, &mut entry),
            _ => {}
        }
    }
    Some(entry)
}

/// Gloss text lives in a wrapper child named after the projection; fall
/// back to the gloss element's own text when the wrapper is missing.
fn projection_text(gloss: &Element, wrapper: &str) -> String {
    match gloss.find(wrapper) {
        Some(inner) => inner.text().trim().to_string(),
        None => gloss.text().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_tolerant;
    use glosstag_types::{DisambTag, TokenKind};

    fn extracted(xml: &str) -> Vec<GlossEntry> {
        let (doc, defects) = parse_tolerant(xml);
        assert!(defects.is_empty(), "{defects:?}");
        extract_entries(&doc.expect("document"))
    }

    const ENTITY: &str = r#"<wordnetgloss>
<synset id="n00001740" ofs="00001740" pos="n">
  <terms><term>entity</term></terms>
  <keys><sk>entity%1:03:00::</sk></keys>
  <gloss desc="orig"><orig>that which is perceived to have its own distinct existence</orig></gloss>
  <gloss desc="text"><text>that which is perceived to have its own distinct existence</text></gloss>
  <gloss desc="wsd">
    <def id="n00001740_d">
      <wf id="n00001740_wf1" tag="ignore">that</wf>
      <wf id="n00001740_wf2" tag="ignore">which</wf>
      <wf id="n00001740_wf3" lemma="be" pos="VBZ" tag="un">is</wf>
      <wf id="n00001740_wf4" lemma="perceive" pos="VBN" tag="man">perceived<id id="n00001740_id.1" sk="perceive%2:39:00::" lemma="perceive"/></wf>
      <wf id="n00001740_wf5" tag="ignore">to</wf>
      <wf id="n00001740_wf6" lemma="have" pos="VB" tag="un">have</wf>
      <wf id="n00001740_wf7" tag="ignore">its</wf>
      <wf id="n00001740_wf8" lemma="own" pos="JJ" tag="un">own</wf>
      <glob id="n00001740_coll.a" tag="auto" glob="auto" coll="a"><id id="n00001740_id.2" sk="distinct_existence%1:26:00::" lemma="distinct_existence"/></glob>
      <cf id="n00001740_cf1" lemma="distinct" pos="JJ" coll="a">distinct</cf>
      <cf id="n00001740_cf2" lemma="existence" pos="NN" coll="a">existence</cf>
    </def>
  </gloss>
</synset>
</wordnetgloss>"#;

    #[test]
    fn extracts_a_complete_synset() {
        let entries = extracted(ENTITY);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.synset_id, "n00001740");
        assert_eq!(entry.offset, "00001740");
        assert_eq!(entry.pos, Pos::Noun);
        assert_eq!(entry.terms, ["entity"]);
        assert_eq!(entry.sense_keys, ["entity%1:03:00::"]);
        assert_eq!(
            entry.original_text,
            "that which is perceived to have its own distinct existence"
        );
        assert_eq!(entry.original_text, entry.tokenized_text);

        assert_eq!(entry.tokens.len(), 10);
        assert_eq!(entry.tokens[0].id, "n00001740_wf1");
        assert_eq!(entry.tokens[0].tag, Some(DisambTag::Ignore));
        assert_eq!(entry.tokens[3].text, "perceived");
        assert_eq!(entry.tokens[8].kind, TokenKind::CollocationForm);

        assert_eq!(entry.annotations.len(), 2);
        assert_eq!(entry.annotations[0].id, "n00001740_id.1");
        assert_eq!(
            entry.annotations[0].token_id.as_deref(),
            Some("n00001740_wf4")
        );
        assert_eq!(entry.annotations[1].id, "n00001740_id.2");
        assert_eq!(entry.annotations[1].token_id, None);
        assert_eq!(
            entry.annotations[1].sense_key.as_deref(),
            Some("distinct_existence%1:26:00::")
        );

        assert_eq!(entry.collocations.len(), 1);
        let coll = &entry.collocations[0];
        assert_eq!(coll.id, "n00001740_coll.a");
        assert_eq!(
            coll.sense_key.as_deref(),
            Some("distinct_existence%1:26:00::")
        );
        assert_eq!(coll.token_ids, ["n00001740_cf1", "n00001740_cf2"]);
        assert!(!coll.is_discontiguous);

        assert_eq!(entry.definitions.len(), 1);
        assert_eq!(entry.definitions[0].id, "n00001740_d");
        assert!(entry.examples.is_empty());
    }

    #[test]
    fn synset_without_offset_is_dropped() {
        let entries = extracted(
            r#"<wordnetgloss>
<synset id="n1" pos="n"><terms><term>x</term></terms></synset>
<synset id="n00000002" ofs="00000002" pos="n"><terms><term>y</term></terms></synset>
</wordnetgloss>"#,
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].synset_id, "n00000002");
    }

    #[test]
    fn synset_with_unknown_pos_is_dropped() {
        let entries = extracted(
            r#"<wordnetgloss>
<synset id="x1" ofs="00000001" pos="x"><terms><term>x</term></terms></synset>
</wordnetgloss>"#,
        );
        assert!(entries.is_empty());
    }

    #[test]
    fn satellite_pos_maps_to_adjective() {
        let entries = extracted(
            r#"<wordnetgloss>
<synset id="s00000001" ofs="00000001" pos="s"><terms><term>quick</term></terms></synset>
</wordnetgloss>"#,
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pos, Pos::Adj);
    }

    #[test]
    fn unknown_gloss_projection_is_ignored() {
        let entries = extracted(
            r#"<wordnetgloss>
<synset id="n00000001" ofs="00000001" pos="n">
  <gloss desc="mystery"><text>nope</text></gloss>
  <gloss desc="orig"><orig>real</orig></gloss>
</synset>
</wordnetgloss>"#,
        );
        assert_eq!(entries[0].original_text, "real");
        assert_eq!(entries[0].tokenized_text, "");
    }

    #[test]
    fn projection_text_survives_a_missing_wrapper() {
        let entries = extracted(
            r#"<wordnetgloss>
<synset id="n00000001" ofs="00000001" pos="n">
  <gloss desc="orig">bare text</gloss>
</synset>
</wordnetgloss>"#,
        );
        assert_eq!(entries[0].original_text, "bare text");
    }

    #[test]
    fn document_order_is_preserved_across_synsets() {
        let entries = extracted(
            r#"<wordnetgloss>
<synset id="v00000001" ofs="00000001" pos="v"/>
<synset id="v00000002" ofs="00000002" pos="v"/>
<synset id="v00000003" ofs="00000003" pos="v"/>
</wordnetgloss>"#,
        );
        let ids: Vec<&str> = entries.iter().map(|e| e.synset_id.as_str()).collect();
        assert_eq!(ids, ["v00000001", "v00000002", "v00000003"]);
    }
}
