//! DTD validation for corpus XML.
//!
//! The corpus ships one grammar file (`glosstag.dtd`) that every XML file
//! references through a relative system id. This module loads the subset of
//! DTD syntax that grammar uses (`ELEMENT` and `ATTLIST` declarations) and
//! checks parsed documents against it, classifying findings into three
//! categories:
//!
//! - `syntax`: the markup itself was malformed (produced by the tolerant
//!   reader, attached by the loader)
//! - `grammar-rule`: a declared element violates its content model or
//!   attribute list
//! - `structural`: an element or reference the grammar does not know
//!
//! Diagnostics about the unresolvable external entity for the grammar's own
//! file name, and about documents with no DOCTYPE at all, are noise by
//! definition here (nothing is fetched from disk or network during
//! validation) and are filtered by [`suppress`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::xml::{Document, Element};
use crate::{ParseError, encoding};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Severity {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warning")]
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum DiagCategory {
    #[serde(rename = "syntax")]
    Syntax,
    #[serde(rename = "grammar-rule")]
    GrammarRule,
    #[serde(rename = "structural")]
    Structural,
}

impl DiagCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagCategory::Syntax => "syntax",
            DiagCategory::GrammarRule => "grammar-rule",
            DiagCategory::Structural => "structural",
        }
    }
}

/// One classified finding against a source file.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub category: DiagCategory,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file)?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        write!(
            f,
            ": {} ({}): {}",
            self.severity.as_str(),
            self.category.as_str(),
            self.message
        )
    }
}

/// Outcome of validating one file.
///
/// `is_valid` is false exactly when `errors` is non-empty; syntax defects
/// from the tolerant reader always land there, so a malformed file can
/// never validate.
#[derive(Clone, Debug)]
pub struct ValidationReport {
    pub file: String,
    pub is_valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub elapsed: Duration,
}

impl ValidationReport {
    pub fn from_diagnostics(
        file: impl Into<String>,
        diagnostics: Vec<Diagnostic>,
        elapsed: Duration,
    ) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for diag in diagnostics {
            match diag.severity {
                Severity::Error => errors.push(diag),
                Severity::Warning => warnings.push(diag),
            }
        }
        ValidationReport {
            file: file.into(),
            is_valid: errors.is_empty(),
            errors,
            warnings,
            elapsed,
        }
    }
}

/// Running counters over a parse run. Explicit state: the loader owns one,
/// callers can snapshot it as a [`ValidationSummary`] or reset it between
/// runs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ValidationStats {
    pub total_files: u64,
    pub valid_files: u64,
    pub invalid_files: u64,
    pub parsing_errors: u64,
    pub validation_errors: u64,
}

impl ValidationStats {
    pub fn record(&mut self, report: &ValidationReport) {
        self.total_files += 1;
        if report.is_valid {
            self.valid_files += 1;
        } else {
            self.invalid_files += 1;
            self.validation_errors += report.errors.len() as u64;
        }
    }

    pub fn record_parse_failure(&mut self) {
        self.parsing_errors += 1;
    }

    pub fn reset(&mut self) {
        *self = ValidationStats::default();
    }

    pub fn summary(&self) -> ValidationSummary {
        let success_rate = if self.total_files > 0 {
            self.valid_files as f64 * 100.0 / self.total_files as f64
        } else {
            0.0
        };
        ValidationSummary {
            total_files: self.total_files,
            valid_files: self.valid_files,
            invalid_files: self.invalid_files,
            parsing_errors: self.parsing_errors,
            validation_errors: self.validation_errors,
            success_rate,
        }
    }
}

/// Snapshot of [`ValidationStats`] with the derived success percentage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub total_files: u64,
    pub valid_files: u64,
    pub invalid_files: u64,
    pub parsing_errors: u64,
    pub validation_errors: u64,
    pub success_rate: f64,
}

/// Drop diagnostics that only say the grammar could not be fetched.
pub fn suppress(diagnostics: Vec<Diagnostic>, grammar_file: &str) -> Vec<Diagnostic> {
    diagnostics
        .into_iter()
        .filter(|d| !is_suppressed(&d.message, grammar_file))
        .collect()
}

fn is_suppressed(message: &str, grammar_file: &str) -> bool {
    (message.contains("failed to load external entity") && message.contains(grammar_file))
        || message.contains("no DTD found")
}

#[derive(Clone, Debug)]
struct AttrDecl {
    name: String,
    required: bool,
}

#[derive(Clone, Debug)]
enum ContentModel {
    Empty,
    Any,
    Mixed(HashSet<String>),
    Children {
        allowed: HashSet<String>,
        required: Vec<String>,
    },
}

/// Parsed grammar: element content models plus attribute lists.
#[derive(Clone, Debug)]
pub struct DtdGrammar {
    file_name: String,
    elements: HashMap<String, ContentModel>,
    attlists: HashMap<String, Vec<AttrDecl>>,
}

impl DtdGrammar {
    /// Load and parse a grammar file.
    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let (text, _) = encoding::read_text(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("grammar.dtd")
            .to_string();
        parse_grammar(&text, file_name).map_err(|message| ParseError::Grammar {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse grammar text directly; `file_name` is what source documents
    /// reference in their DOCTYPE.
    pub fn from_str(text: &str, file_name: &str) -> Result<Self, ParseError> {
        parse_grammar(text, file_name.to_string()).map_err(|message| ParseError::Grammar {
            path: PathBuf::from(file_name),
            message,
        })
    }

    /// The grammar's own file name, used for suppression and DOCTYPE
    /// matching.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Check a parsed document, returning unfiltered diagnostics.
    ///
    /// The caller composes these with the reader's syntax defects and runs
    /// [`suppress`] before building a [`ValidationReport`].
    pub fn validate(&self, doc: &Document, file: &str) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        match &doc.doctype_system {
            Some(system) => diags.push(Diagnostic {
                file: file.to_string(),
                line: None,
                column: None,
                category: DiagCategory::Structural,
                severity: Severity::Error,
                message: format!("failed to load external entity \"{system}\""),
            }),
            None => diags.push(Diagnostic {
                file: file.to_string(),
                line: None,
                column: None,
                category: DiagCategory::Structural,
                severity: Severity::Error,
                message: "no DTD found in document".to_string(),
            }),
        }
        self.check_element(&doc.root, file, &mut diags);
        diags
    }

    fn check_element(&self, el: &Element, file: &str, diags: &mut Vec<Diagnostic>) {
        let diag = |category, message: String| Diagnostic {
            file: file.to_string(),
            line: Some(el.line),
            column: Some(el.column),
            category,
            severity: Severity::Error,
            message,
        };

        match self.elements.get(&el.name) {
            None => diags.push(diag(
                DiagCategory::Structural,
                format!("no declaration for element '{}'", el.name),
            )),
            Some(model) => {
                let declared = self.attlists.get(&el.name);
                if let Some(declared) = declared {
                    for attr in declared {
                        if attr.required && el.attr(&attr.name).is_none() {
                            diags.push(diag(
                                DiagCategory::GrammarRule,
                                format!(
                                    "element '{}' is missing required attribute '{}'",
                                    el.name, attr.name
                                ),
                            ));
                        }
                    }
                }
                for (key, _) in &el.attrs {
                    let known = declared
                        .map(|list| list.iter().any(|a| &a.name == key))
                        .unwrap_or(false);
                    if !known {
                        diags.push(diag(
                            DiagCategory::GrammarRule,
                            format!("attribute '{}' is not declared on element '{}'", key, el.name),
                        ));
                    }
                }

                match model {
                    ContentModel::Any => {}
                    ContentModel::Empty => {
                        if el.children_elements().next().is_some() || el.has_non_whitespace_text() {
                            diags.push(diag(
                                DiagCategory::GrammarRule,
                                format!("element '{}' is declared EMPTY but has content", el.name),
                            ));
                        }
                    }
                    ContentModel::Mixed(allowed) => {
                        for child in el.children_elements() {
                            if !allowed.contains(&child.name) {
                                diags.push(diag(
                                    DiagCategory::GrammarRule,
                                    format!(
                                        "element '{}' is not allowed inside '{}'",
                                        child.name, el.name
                                    ),
                                ));
                            }
                        }
                    }
                    ContentModel::Children { allowed, required } => {
                        let mut present: HashSet<&str> = HashSet::new();
                        for child in el.children_elements() {
                            present.insert(child.name.as_str());
                            if !allowed.contains(&child.name) {
                                diags.push(diag(
                                    DiagCategory::GrammarRule,
                                    format!(
                                        "element '{}' is not allowed inside '{}'",
                                        child.name, el.name
                                    ),
                                ));
                            }
                        }
                        for req in required {
                            if !present.contains(req.as_str()) {
                                diags.push(diag(
                                    DiagCategory::GrammarRule,
                                    format!(
                                        "element '{}' is missing required child '{}'",
                                        el.name, req
                                    ),
                                ));
                            }
                        }
                        if el.has_non_whitespace_text() {
                            diags.push(diag(
                                DiagCategory::GrammarRule,
                                format!(
                                    "element '{}' has character data where only child elements are allowed",
                                    el.name
                                ),
                            ));
                        }
                    }
                }
            }
        }

        for child in el.children_elements() {
            self.check_element(child, file, diags);
        }
    }
}

fn parse_grammar(text: &str, file_name: String) -> Result<DtdGrammar, String> {
    let mut elements = HashMap::new();
    let mut attlists: HashMap<String, Vec<AttrDecl>> = HashMap::new();

    for decl in split_declarations(text) {
        if let Some(rest) = decl.strip_prefix("<!ELEMENT") {
            let (name, model_text) =
                split_first_token(rest).ok_or("ELEMENT declaration missing a name")?;
            let model = parse_content_model(model_text.trim())
                .map_err(|e| format!("element '{name}': {e}"))?;
            elements.insert(name.to_string(), model);
        } else if let Some(rest) = decl.strip_prefix("<!ATTLIST") {
            let (element, attrs) = parse_attlist(rest)?;
            attlists.entry(element).or_default().extend(attrs);
        }
        // ENTITY and NOTATION declarations carry nothing we check against.
    }

    if elements.is_empty() {
        return Err("grammar declares no elements".to_string());
    }
    Ok(DtdGrammar {
        file_name,
        elements,
        attlists,
    })
}

/// Split grammar text into `<!...>` declarations, skipping comments and
/// respecting quoted strings.
fn split_declarations(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut decls = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'<' && i + 1 < bytes.len() && bytes[i + 1] == b'!' {
            if text[i..].starts_with("<!--") {
                i = match text[i..].find("-->") {
                    Some(end) => i + end + 3,
                    None => bytes.len(),
                };
                continue;
            }
            let mut j = i;
            let mut quote: Option<u8> = None;
            while j < bytes.len() {
                let b = bytes[j];
                match quote {
                    Some(q) => {
                        if b == q {
                            quote = None;
                        }
                    }
                    None => {
                        if b == b'"' || b == b'\'' {
                            quote = Some(b);
                        } else if b == b'>' {
                            break;
                        }
                    }
                }
                j += 1;
            }
            decls.push(text[i..j.min(bytes.len())].to_string());
            i = j + 1;
        } else {
            i += 1;
        }
    }
    decls
}

fn split_first_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(i) => Some((&s[..i], &s[i..])),
        None => Some((s, "")),
    }
}

fn parse_content_model(model: &str) -> Result<ContentModel, String> {
    match model {
        "EMPTY" => return Ok(ContentModel::Empty),
        "ANY" => return Ok(ContentModel::Any),
        _ => {}
    }
    if model.contains('%') {
        return Err("parameter entities are not supported".to_string());
    }
    if model.contains("#PCDATA") {
        let inner = model
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(['*', ')']);
        let names: HashSet<String> = inner
            .split('|')
            .map(str::trim)
            .filter(|n| !n.is_empty() && *n != "#PCDATA")
            .map(str::to_string)
            .collect();
        return Ok(ContentModel::Mixed(names));
    }

    let tokens = model_tokens(model)?;
    let mut pos = 0;
    let node = parse_group(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err("trailing tokens in content model".to_string());
    }
    let mut allowed = HashSet::new();
    collect_names(&node, &mut allowed);
    let mut required = Vec::new();
    collect_required(&node, &mut required);
    Ok(ContentModel::Children { allowed, required })
}

#[derive(Clone, Debug, PartialEq)]
enum Repeat {
    One,
    Optional,
    Star,
    Plus,
}

struct ContentNode {
    kind: ContentKind,
    repeat: Repeat,
}

enum ContentKind {
    Name(String),
    Seq(Vec<ContentNode>),
    Choice(Vec<ContentNode>),
}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Open,
    Close,
    Pipe,
    Comma,
    Rep(char),
    Word(String),
}

fn model_tokens(s: &str) -> Result<Vec<Tok>, String> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Tok::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::Close);
            }
            '|' => {
                chars.next();
                tokens.push(Tok::Pipe);
            }
            ',' => {
                chars.next();
                tokens.push(Tok::Comma);
            }
            '?' | '*' | '+' => {
                chars.next();
                tokens.push(Tok::Rep(c));
            }
            c if c.is_alphanumeric() || "_-.:".contains(c) => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || "_-.:".contains(c) {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Tok::Word(word));
            }
            other => return Err(format!("unexpected '{other}' in content model")),
        }
    }
    Ok(tokens)
}

fn parse_group(tokens: &[Tok], pos: &mut usize) -> Result<ContentNode, String> {
    if tokens.get(*pos) != Some(&Tok::Open) {
        return Err("content model must start with '('".to_string());
    }
    *pos += 1;
    let mut items = vec![parse_item(tokens, pos)?];
    let mut choice: Option<bool> = None;
    loop {
        match tokens.get(*pos) {
            Some(Tok::Pipe) | Some(Tok::Comma) => {
                let is_pipe = tokens.get(*pos) == Some(&Tok::Pipe);
                match choice {
                    None => choice = Some(is_pipe),
                    Some(prev) if prev != is_pipe => {
                        return Err("mixed ',' and '|' separators in one group".to_string());
                    }
                    _ => {}
                }
                *pos += 1;
                items.push(parse_item(tokens, pos)?);
            }
            Some(Tok::Close) => {
                *pos += 1;
                break;
            }
            _ => return Err("expected ',', '|' or ')' in content model".to_string()),
        }
    }
    let repeat = take_repeat(tokens, pos);
    let kind = if choice == Some(true) {
        ContentKind::Choice(items)
    } else {
        ContentKind::Seq(items)
    };
    Ok(ContentNode { kind, repeat })
}

fn parse_item(tokens: &[Tok], pos: &mut usize) -> Result<ContentNode, String> {
    match tokens.get(*pos) {
        Some(Tok::Open) => parse_group(tokens, pos),
        Some(Tok::Word(word)) => {
            let name = word.clone();
            *pos += 1;
            let repeat = take_repeat(tokens, pos);
            Ok(ContentNode {
                kind: ContentKind::Name(name),
                repeat,
            })
        }
        _ => Err("expected a name or group in content model".to_string()),
    }
}

fn take_repeat(tokens: &[Tok], pos: &mut usize) -> Repeat {
    if let Some(Tok::Rep(c)) = tokens.get(*pos) {
        let repeat = match c {
            '?' => Repeat::Optional,
            '+' => Repeat::Plus,
            _ => Repeat::Star,
        };
        *pos += 1;
        repeat
    } else {
        Repeat::One
    }
}

fn collect_names(node: &ContentNode, out: &mut HashSet<String>) {
    match &node.kind {
        ContentKind::Name(name) => {
            out.insert(name.clone());
        }
        ContentKind::Seq(items) | ContentKind::Choice(items) => {
            for item in items {
                collect_names(item, out);
            }
        }
    }
}

fn collect_required(node: &ContentNode, out: &mut Vec<String>) {
    if matches!(node.repeat, Repeat::Optional | Repeat::Star) {
        return;
    }
    match &node.kind {
        ContentKind::Name(name) => {
            if !out.iter().any(|n| n == name) {
                out.push(name.clone());
            }
        }
        ContentKind::Seq(items) => {
            for item in items {
                collect_required(item, out);
            }
        }
        ContentKind::Choice(_) => {}
    }
}

fn parse_attlist(rest: &str) -> Result<(String, Vec<AttrDecl>), String> {
    let tokens = attlist_tokens(rest)?;
    let mut iter = tokens.into_iter();
    let element = iter
        .next()
        .ok_or_else(|| "ATTLIST declaration missing an element name".to_string())?;
    let tokens: Vec<String> = iter.collect();

    let mut attrs = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let name = tokens[i].clone();
        let ty = tokens
            .get(i + 1)
            .ok_or_else(|| format!("attribute '{name}' on '{element}' has no type"))?;
        let mut j = i + 2;
        if ty == "NOTATION" {
            j += 1;
        }
        let default = tokens
            .get(j)
            .ok_or_else(|| format!("attribute '{name}' on '{element}' has no default"))?;
        let required = default == "#REQUIRED";
        if default == "#FIXED" {
            tokens
                .get(j + 1)
                .ok_or_else(|| format!("attribute '{name}' on '{element}': #FIXED without value"))?;
            j += 1;
        } else if default != "#REQUIRED" && default != "#IMPLIED" && !default.starts_with('"') {
            return Err(format!(
                "attribute '{name}' on '{element}': unexpected default '{default}'"
            ));
        }
        attrs.push(AttrDecl { name, required });
        i = j + 1;
    }
    Ok((element, attrs))
}

/// Whitespace-split with quoted strings and parenthesized enumerations as
/// single tokens. Quoted tokens come back with a leading `"` marker.
fn attlist_tokens(s: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' || c == '\'' {
            chars.next();
            let mut value = String::from('"');
            loop {
                match chars.next() {
                    Some(q) if q == c => break,
                    Some(other) => value.push(other),
                    None => return Err("unterminated quote in ATTLIST".to_string()),
                }
            }
            tokens.push(value);
        } else if c == '(' {
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some(')') => {
                        value.push(')');
                        break;
                    }
                    Some(other) => value.push(other),
                    None => return Err("unterminated enumeration in ATTLIST".to_string()),
                }
            }
            tokens.push(value);
        } else {
            let mut value = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' || c == '\'' || c == '(' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            tokens.push(value);
        }
    }
    Ok(tokens)
}
