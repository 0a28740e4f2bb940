//! Parsers for the WordNet Gloss Disambiguation Project corpus.
//!
//! The corpus ships the same sense-annotated glosses in two layouts: four
//! `merged/` files (one XML document per part of speech) and a `standoff/`
//! tree (one plain-text anchor plus up to five annotation files per synset,
//! addressed through tab-separated index files). Both layouts normalize into
//! the [`glosstag_types::GlossEntry`] graph.
//!
//! # Features
//!
//! - encoding sniffing for the mixed UTF-8/UTF-16 files the corpus ships
//!   ([`encoding`])
//! - a tolerant XML reader that keeps going on malformed markup ([`xml`])
//! - DTD validation with classified diagnostics and resettable run
//!   statistics ([`dtd`])
//! - a loader composing the three, with a continue-on-error policy
//!   ([`loader`])
//! - extractors for both layouts and a directory-level dispatcher
//!   ([`merged`], [`standoff`], [`corpus`])
//!
//! # Example
//!
//! ```no_run
//! use glosstag_parse::{ParseOptions, parse_corpus};
//!
//! let outcome = parse_corpus("WordNet-3.0/glosstag".as_ref(), &ParseOptions::default())?;
//! println!("{} synsets", outcome.entries.len());
//! # Ok::<(), glosstag_parse::ParseError>(())
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod corpus;
pub mod dtd;
pub mod encoding;
pub mod index;
pub mod loader;
pub mod merged;
pub mod standoff;
pub mod wsd;
pub mod xml;

pub use corpus::{CorpusOutcome, Layout, corpus_xml_files, detect_layout, parse_corpus};
pub use dtd::{
    DiagCategory, Diagnostic, DtdGrammar, Severity, ValidationReport, ValidationStats,
    ValidationSummary,
};
pub use loader::{LoadOutcome, ParseOptions, XmlLoader};
pub use xml::{Document, Element, Node};

/// Errors that escape the parsing pipeline.
///
/// Most per-file trouble is contained: under the default continue-on-error
/// policy a bad file is logged, counted in [`ValidationStats`], and skipped.
/// These variants surface only for unusable inputs (an unreadable grammar
/// file, an unreadable index) or when the policy is strict.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to load DTD grammar {}: {message}", path.display())]
    Grammar { path: PathBuf, message: String },
    #[error("{} is not well-formed XML ({defects} defect(s))", path.display())]
    Malformed { path: PathBuf, defects: usize },
    #[error("{} failed DTD validation with {errors} error(s)", path.display())]
    Invalid { path: PathBuf, errors: usize },
}
