//! Shared types for the WordNet Gloss Disambiguation Project corpus.
//!
//! Both source layouts (the merged per-POS files and the standoff file
//! families) normalize into the same [`GlossEntry`] graph: a synset with its
//! terms and sense keys, three gloss projections, and the token, annotation
//! and collocation records extracted from the sense-disambiguated gloss.
//! The serde derives on these types define the JSONL wire contract used by
//! the conversion tooling.
//!
//! ```rust
//! use glosstag_types::{Pos, SynsetKey};
//!
//! let key = SynsetKey::parse("n00001740").unwrap();
//! assert_eq!(key.pos, Pos::Noun);
//! assert_eq!(key.to_string(), "n00001740");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Gap between a token and its successor when the source does not say
/// otherwise.
pub const DEFAULT_SEPARATOR: &str = " ";

/// Part-of-speech category of a synset (`n`, `v`, `a`/`s`, `r`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Pos {
    #[serde(rename = "n")]
    Noun,
    #[serde(rename = "v")]
    Verb,
    #[serde(rename = "a", alias = "s")]
    Adj,
    #[serde(rename = "r")]
    Adv,
}

impl Pos {
    /// All four categories, in the corpus's conventional order.
    pub const ALL: [Pos; 4] = [Pos::Noun, Pos::Verb, Pos::Adj, Pos::Adv];

    /// Parse the POS character used in synset ids and `pos` attributes.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'n' => Some(Pos::Noun),
            'v' => Some(Pos::Verb),
            'a' | 's' => Some(Pos::Adj),
            'r' => Some(Pos::Adv),
            _ => None,
        }
    }

    /// Emit the POS character used in synset ids.
    pub fn to_char(self) -> char {
        match self {
            Pos::Noun => 'n',
            Pos::Verb => 'v',
            Pos::Adj => 'a',
            Pos::Adv => 'r',
        }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Pos::Noun => "noun",
            Pos::Verb => "verb",
            Pos::Adj => "adj",
            Pos::Adv => "adv",
        })
    }
}

/// Decomposed synset identity: POS category plus the numeric byte offset
/// carried over from the original WordNet database files.
///
/// The rendered form is the POS character followed by the zero-padded
/// eight-digit offset (`n00001740`), which is how every id in the corpus is
/// written.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SynsetKey {
    pub pos: Pos,
    pub offset: u32,
}

impl SynsetKey {
    /// Parse a rendered synset id. Returns `None` unless the string is a
    /// POS character followed by decimal digits.
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let pos = Pos::from_char(chars.next()?)?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let offset = digits.parse().ok()?;
        Some(SynsetKey { pos, offset })
    }

    /// The zero-padded offset field as it appears in `ofs` attributes.
    pub fn offset_string(&self) -> String {
        format!("{:08}", self.offset)
    }
}

impl fmt::Display for SynsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:08}", self.pos.to_char(), self.offset)
    }
}

/// Disambiguation status of a token, annotation or collocation.
///
/// Closed vocabulary: the corpus only ever writes `ignore`, `man`, `auto`
/// and `un`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DisambTag {
    /// Excluded from disambiguation (stopwords, most punctuation).
    #[serde(rename = "ignore")]
    Ignore,
    /// Manually sense-tagged.
    #[serde(rename = "man")]
    Manual,
    /// Sense-tagged by the automatic tagger.
    #[serde(rename = "auto")]
    Auto,
    /// Eligible but not yet tagged.
    #[serde(rename = "un")]
    Untagged,
}

impl DisambTag {
    /// Parse a `tag` attribute or feature value.
    pub fn from_attr(s: &str) -> Option<Self> {
        match s {
            "ignore" => Some(DisambTag::Ignore),
            "man" => Some(DisambTag::Manual),
            "auto" => Some(DisambTag::Auto),
            "un" => Some(DisambTag::Untagged),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisambTag::Ignore => "ignore",
            DisambTag::Manual => "man",
            DisambTag::Auto => "auto",
            DisambTag::Untagged => "un",
        }
    }
}

/// Kind of a gloss token, named after the source markup.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Plain word form (`wf`).
    #[serde(rename = "wf")]
    WordForm,
    /// Collocation member form (`cf`).
    #[serde(rename = "cf")]
    CollocationForm,
    /// Punctuation (`punc`).
    #[serde(rename = "punc")]
    Punctuation,
    /// Markup-level ignorable material (`ignore`).
    #[serde(rename = "ignore")]
    Ignored,
}

impl TokenKind {
    /// Parse an element name or standoff `type` label.
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "wf" => Some(TokenKind::WordForm),
            "cf" => Some(TokenKind::CollocationForm),
            "punc" => Some(TokenKind::Punctuation),
            "ignore" => Some(TokenKind::Ignored),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::WordForm => "wf",
            TokenKind::CollocationForm => "cf",
            TokenKind::Punctuation => "punc",
            TokenKind::Ignored => "ignore",
        }
    }
}

/// One token of the sense-disambiguated gloss, in reading order.
///
/// `start`/`end` are character offsets into the tokenized gloss text; the
/// merged layout does not carry spans, so `0/0` there means "unknown", not
/// an empty span. `separator` is the gap between this token and the next
/// and defaults to a single space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub text: String,
    pub lemma: Option<String>,
    pub pos: Option<String>,
    pub tag: Option<DisambTag>,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub start: u32,
    pub end: u32,
    pub separator: String,
    /// Collocation label(s) this token belongs to, comma separated as
    /// written in the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coll: Option<String>,
}

/// A sense annotation.
///
/// `token_id` names the annotated token when the source nests the
/// annotation inside it (the merged layout); the standoff layout names
/// annotations after their tokens instead, so attachment at storage time
/// uses `token_id` when set and falls back to `id`. A reference that
/// resolves to no token is dangling and is dropped there, never attached
/// to a different token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    pub lemma: Option<String>,
    pub sense_key: Option<String>,
    pub tag: Option<DisambTag>,
}

/// A multi-word expression over gloss tokens.
///
/// `token_ids` lists the member tokens in reading order. A collocation is
/// discontiguous when its members are not adjacent in the gloss; the
/// standoff layout records this in a separate file that patches already
/// built collocations by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collocation {
    pub id: String,
    pub text: String,
    pub lemma: Option<String>,
    pub sense_key: Option<String>,
    pub tag: Option<DisambTag>,
    /// Origin of the grouping (`man` or `auto`), from the `glob` attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob_type: Option<String>,
    pub is_discontiguous: bool,
    pub token_ids: Vec<String>,
}

/// Definition or example span within a gloss, by id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructSpan {
    pub id: String,
    pub start: u32,
    pub end: u32,
}

/// One synset of the corpus in its normalized form, identical for both
/// source layouts.
///
/// `synset_id` is the rendered [`SynsetKey`] and is unique within a parse
/// run; `offset` keeps the zero-padded form from the source. The three gloss
/// projections are the verbatim original text, the tokenized text, and the
/// decomposed WSD structure (tokens, annotations, collocations, definition
/// and example spans).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlossEntry {
    pub synset_id: String,
    pub offset: String,
    pub pos: Pos,
    pub terms: Vec<String>,
    pub sense_keys: Vec<String>,
    pub original_text: String,
    pub tokenized_text: String,
    pub tokens: Vec<Token>,
    pub annotations: Vec<Annotation>,
    pub collocations: Vec<Collocation>,
    pub definitions: Vec<StructSpan>,
    pub examples: Vec<StructSpan>,
}

impl GlossEntry {
    /// Entry with identity fields set and every collection empty.
    pub fn new(synset_id: impl Into<String>, offset: impl Into<String>, pos: Pos) -> Self {
        GlossEntry {
            synset_id: synset_id.into(),
            offset: offset.into(),
            pos,
            terms: Vec::new(),
            sense_keys: Vec::new(),
            original_text: String::new(),
            tokenized_text: String::new(),
            tokens: Vec::new(),
            annotations: Vec::new(),
            collocations: Vec::new(),
            definitions: Vec::new(),
            examples: Vec::new(),
        }
    }
}
