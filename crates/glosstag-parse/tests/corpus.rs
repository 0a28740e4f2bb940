//! End-to-end parsing of the bundled corpus fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use glosstag_parse::{ParseError, ParseOptions, corpus_xml_files, parse_corpus};
use glosstag_types::{DisambTag, Pos, TokenKind};

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn dtd_path() -> PathBuf {
    fixture_dir().join("glosstag.dtd")
}

#[test]
fn merged_corpus_parses_and_validates() {
    let options = ParseOptions {
        dtd_path: Some(dtd_path()),
        ..ParseOptions::default()
    };
    let outcome =
        parse_corpus(&fixture_dir().join("merged_corpus"), &options).expect("corpus parses");

    assert_eq!(outcome.entries.len(), 2);

    let entity = &outcome.entries[0];
    assert_eq!(entity.synset_id, "n00001740");
    assert_eq!(entity.offset, "00001740");
    assert_eq!(entity.pos, Pos::Noun);
    assert_eq!(entity.terms, ["entity"]);
    assert_eq!(entity.sense_keys, ["entity%1:03:00::"]);
    assert_eq!(
        entity.original_text,
        "that which is perceived to have its own distinct existence (living or nonliving)"
    );
    assert_eq!(
        entity.tokenized_text,
        "that which is perceived to have its own distinct existence ( living or nonliving )"
    );

    assert_eq!(entity.tokens.len(), 15);
    assert_eq!(entity.tokens[0].id, "n00001740_wf1");
    assert_eq!(entity.tokens[0].tag, Some(DisambTag::Ignore));
    assert_eq!(entity.tokens[3].text, "perceived");
    assert_eq!(entity.tokens[3].tag, Some(DisambTag::Manual));
    assert_eq!(entity.tokens[3].lemma.as_deref(), Some("perceive"));
    assert_eq!(entity.tokens[8].kind, TokenKind::CollocationForm);
    assert_eq!(entity.tokens[8].coll.as_deref(), Some("a"));
    assert_eq!(entity.tokens[10].text, "(");
    assert_eq!(entity.tokens[10].kind, TokenKind::Punctuation);
    assert_eq!(entity.tokens[10].separator, "");
    assert_eq!(entity.tokens[13].separator, "");
    assert_eq!(entity.tokens[14].text, ")");
    assert_eq!(entity.tokens[14].separator, " ");

    assert_eq!(entity.annotations.len(), 2);
    assert_eq!(entity.annotations[0].id, "n00001740_id.1");
    assert_eq!(
        entity.annotations[0].token_id.as_deref(),
        Some("n00001740_wf4")
    );
    assert_eq!(
        entity.annotations[0].sense_key.as_deref(),
        Some("perceive%2:39:00::")
    );
    assert_eq!(entity.annotations[1].id, "n00001740_id.2");
    assert_eq!(entity.annotations[1].token_id, None);
    assert_eq!(
        entity.annotations[1].sense_key.as_deref(),
        Some("distinct_existence%1:26:00::")
    );

    assert_eq!(entity.collocations.len(), 1);
    let coll = &entity.collocations[0];
    assert_eq!(coll.id, "n00001740_coll.a");
    assert_eq!(coll.token_ids, ["n00001740_cf1", "n00001740_cf2"]);
    assert!(!coll.is_discontiguous);
    assert_eq!(coll.tag, Some(DisambTag::Auto));
    assert_eq!(coll.glob_type.as_deref(), Some("auto"));
    assert_eq!(
        coll.sense_key.as_deref(),
        Some("distinct_existence%1:26:00::")
    );

    assert_eq!(entity.definitions.len(), 1);
    assert_eq!(entity.definitions[0].id, "n00001740_d");
    assert!(entity.examples.is_empty());

    let adv = &outcome.entries[1];
    assert_eq!(adv.synset_id, "r00001837");
    assert_eq!(adv.pos, Pos::Adv);
    assert_eq!(adv.terms, ["a cappella"]);
    assert_eq!(adv.tokens.len(), 3);
    assert_eq!(adv.annotations.len(), 1);

    let summary = outcome.summary;
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.valid_files, 2);
    assert_eq!(summary.invalid_files, 0);
    assert_eq!(summary.parsing_errors, 0);
    assert_eq!(summary.validation_errors, 0);
    assert!((summary.success_rate - 100.0).abs() < f64::EPSILON);
}

#[test]
fn standoff_corpus_assembles_entry_families() {
    let outcome = parse_corpus(
        &fixture_dir().join("standoff_corpus"),
        &ParseOptions::default(),
    )
    .expect("corpus parses");

    // The index lists two entries; one has no anchor text on disk.
    assert_eq!(outcome.entries.len(), 1);
    let entry = &outcome.entries[0];
    assert_eq!(entry.synset_id, "n00001740");
    assert_eq!(entry.pos, Pos::Noun);
    assert_eq!(
        entry.original_text,
        "that which is perceived to have its own distinct existence"
    );
    assert_eq!(entry.original_text, entry.tokenized_text);

    assert_eq!(entry.tokens.len(), 10);
    assert_eq!(entry.tokens[0].text, "that");
    assert_eq!(entry.tokens[3].text, "perceived");
    assert_eq!(entry.tokens[3].start, 14);
    assert_eq!(entry.tokens[3].end, 23);
    assert_eq!(entry.tokens[8].kind, TokenKind::CollocationForm);

    assert_eq!(entry.annotations.len(), 1);
    assert_eq!(entry.annotations[0].tag, Some(DisambTag::Manual));

    assert_eq!(entry.collocations.len(), 1);
    let coll = &entry.collocations[0];
    assert_eq!(coll.text, "distinct existence");
    assert!(coll.is_discontiguous);
    assert_eq!(coll.token_ids, ["n00001740_cf1", "n00001740_cf2"]);

    assert_eq!(entry.definitions.len(), 1);
    assert_eq!(entry.definitions[0].end, 58);

    assert_eq!(outcome.summary.total_files, 0);
}

#[test]
fn standoff_companions_validate_against_the_grammar() {
    let options = ParseOptions {
        dtd_path: Some(dtd_path()),
        ..ParseOptions::default()
    };
    let outcome =
        parse_corpus(&fixture_dir().join("standoff_corpus"), &options).expect("corpus parses");

    let summary = outcome.summary;
    assert_eq!(summary.total_files, 5);
    assert_eq!(summary.valid_files, 5);
    assert_eq!(summary.validation_errors, 0);
}

#[test]
fn stray_end_tag_does_not_lose_the_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let merged = dir.path().join("merged");
    fs::create_dir_all(&merged).expect("mkdir");
    fs::copy(
        fixture_dir().join("merged_corpus").join("merged").join("noun.xml"),
        merged.join("noun.xml"),
    )
    .expect("copied");
    fs::write(
        merged.join("verb.xml"),
        "<!DOCTYPE wordnetgloss SYSTEM \"glosstag.dtd\">\n<wordnetgloss><synset id=\"v00000001\" ofs=\"00000001\" pos=\"v\"><terms><term>be</term></terms></synset></bogus></wordnetgloss>",
    )
    .expect("written");

    let options = ParseOptions {
        dtd_path: Some(dtd_path()),
        ..ParseOptions::default()
    };
    let outcome = parse_corpus(dir.path(), &options).expect("recovered");
    assert_eq!(outcome.entries.len(), 2);
    assert_eq!(outcome.entries[0].synset_id, "n00001740");
    assert_eq!(outcome.entries[1].synset_id, "v00000001");
    assert_eq!(outcome.entries[1].terms, ["be"]);

    // The defect is not swallowed: the file counts as invalid.
    let summary = outcome.summary;
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.invalid_files, 1);
    assert_eq!(summary.parsing_errors, 0);
    assert!(summary.validation_errors >= 1);

    let strict = ParseOptions {
        dtd_path: Some(dtd_path()),
        validate_dtd: true,
        continue_on_error: false,
    };
    assert!(matches!(
        parse_corpus(dir.path(), &strict),
        Err(ParseError::Malformed { .. })
    ));
}

#[test]
fn unparseable_file_is_skipped_and_counted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let merged = dir.path().join("merged");
    fs::create_dir_all(&merged).expect("mkdir");
    fs::copy(
        fixture_dir().join("merged_corpus").join("merged").join("noun.xml"),
        merged.join("noun.xml"),
    )
    .expect("copied");
    fs::write(merged.join("verb.xml"), "not markup at all\n").expect("written");

    let options = ParseOptions {
        dtd_path: Some(dtd_path()),
        ..ParseOptions::default()
    };
    let outcome = parse_corpus(dir.path(), &options).expect("contained");
    assert_eq!(outcome.entries.len(), 1);
    assert_eq!(outcome.entries[0].synset_id, "n00001740");

    let summary = outcome.summary;
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.valid_files, 1);
    assert_eq!(summary.invalid_files, 1);
    assert_eq!(summary.parsing_errors, 1);
    assert!((summary.success_rate - 50.0).abs() < f64::EPSILON);
}

#[test]
fn xml_file_listing_covers_both_layouts() {
    let files = corpus_xml_files(&fixture_dir().join("merged_corpus")).expect("listed");
    assert_eq!(files.len(), 2);
    assert!(files[0].ends_with("merged/noun.xml"));
    assert!(files[1].ends_with("merged/adv.xml"));

    let files = corpus_xml_files(&fixture_dir().join("standoff_corpus")).expect("listed");
    assert_eq!(files.len(), 5);
    assert!(files.iter().all(|f| f.to_string_lossy().contains("n00001740-wn")));
}
