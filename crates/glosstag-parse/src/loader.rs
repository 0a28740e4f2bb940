//! File loading with validation and error containment.
//!
//! [`XmlLoader`] is the one place that turns a path into a [`Document`]:
//! it decodes the bytes, runs the tolerant reader, optionally validates
//! against a loaded grammar, and applies the continue-on-error policy.
//! Counters accumulate across calls so a corpus run can report one summary
//! at the end.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, warn};

use crate::dtd::{
    self, DiagCategory, Diagnostic, DtdGrammar, Severity, ValidationReport, ValidationStats,
    ValidationSummary,
};
use crate::xml::{self, Document};
use crate::{ParseError, encoding};

/// How the loader treats grammars and failures.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Grammar to validate against. Validation only runs when this is set
    /// and `validate_dtd` is true.
    pub dtd_path: Option<PathBuf>,
    pub validate_dtd: bool,
    /// When true (the default), unreadable, malformed, and invalid files
    /// are logged and skipped instead of aborting the run.
    pub continue_on_error: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            dtd_path: None,
            validate_dtd: true,
            continue_on_error: true,
        }
    }
}

/// Result of one load: the document (absent when the file was skipped)
/// and the validation report (absent when no grammar is configured).
#[derive(Clone, Debug)]
pub struct LoadOutcome {
    pub document: Option<Document>,
    pub report: Option<ValidationReport>,
}

pub struct XmlLoader {
    grammar: Option<DtdGrammar>,
    continue_on_error: bool,
    stats: ValidationStats,
}

impl XmlLoader {
    /// Build a loader, loading the grammar up front if one is configured.
    pub fn new(options: &ParseOptions) -> Result<Self, ParseError> {
        let grammar = match &options.dtd_path {
            Some(path) if options.validate_dtd => Some(DtdGrammar::load(path)?),
            _ => None,
        };
        Ok(XmlLoader {
            grammar,
            continue_on_error: options.continue_on_error,
            stats: ValidationStats::default(),
        })
    }

    /// Load one file. Markup defects are recovered from: the best-effort
    /// tree is returned and the defects land in the validation report.
    /// Only a parse that yields no root element is a parse failure.
    pub fn load_with_report(&mut self, path: &Path) -> Result<LoadOutcome, ParseError> {
        let (text, _) = match encoding::read_text(path) {
            Ok(read) => read,
            Err(err) => {
                self.stats.record_parse_failure();
                if self.continue_on_error {
                    warn!("skipping {}: {}", path.display(), err);
                    return Ok(LoadOutcome {
                        document: None,
                        report: None,
                    });
                }
                return Err(err);
            }
        };

        let file = path.display().to_string();
        let started = Instant::now();
        let (document, defects) = xml::parse_tolerant(&text);
        let elapsed = started.elapsed();

        let report = if let Some(grammar) = &self.grammar {
            let mut diags: Vec<Diagnostic> = defects
                .iter()
                .map(|d| Diagnostic {
                    file: file.clone(),
                    line: Some(d.line),
                    column: Some(d.column),
                    category: DiagCategory::Syntax,
                    severity: Severity::Error,
                    message: d.message.clone(),
                })
                .collect();
            match &document {
                Some(doc) => diags.extend(grammar.validate(doc, &file)),
                None => diags.push(Diagnostic {
                    file: file.clone(),
                    line: None,
                    column: None,
                    category: DiagCategory::Syntax,
                    severity: Severity::Error,
                    message: "no root element found".to_string(),
                }),
            }
            let diags = dtd::suppress(diags, grammar.file_name());
            let report = ValidationReport::from_diagnostics(file.clone(), diags, elapsed);
            self.stats.record(&report);
            if report.is_valid {
                debug!("{} is valid", file);
            } else {
                warn!("{} failed validation with {} errors", file, report.errors.len());
            }
            Some(report)
        } else {
            None
        };

        if document.is_none() {
            self.stats.record_parse_failure();
            if !self.continue_on_error {
                return Err(ParseError::Malformed {
                    path: path.to_path_buf(),
                    defects: defects.len().max(1),
                });
            }
            warn!(
                "failed to parse {} ({} defects), skipping",
                path.display(),
                defects.len().max(1)
            );
            return Ok(LoadOutcome {
                document: None,
                report,
            });
        }

        if !defects.is_empty() {
            if !self.continue_on_error {
                return Err(ParseError::Malformed {
                    path: path.to_path_buf(),
                    defects: defects.len(),
                });
            }
            warn!(
                "{}: recovered from {} markup defect(s)",
                path.display(),
                defects.len()
            );
        }

        if let Some(r) = &report
            && !r.is_valid
            && !self.continue_on_error
        {
            return Err(ParseError::Invalid {
                path: path.to_path_buf(),
                errors: r.errors.len(),
            });
        }

        Ok(LoadOutcome { document, report })
    }

    /// Load one file, ignoring the validation report.
    pub fn load(&mut self, path: &Path) -> Result<Option<Document>, ParseError> {
        Ok(self.load_with_report(path)?.document)
    }

    pub fn stats(&self) -> &ValidationStats {
        &self.stats
    }

    pub fn summary(&self) -> ValidationSummary {
        self.stats.summary()
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const GRAMMAR: &str = r#"<!ELEMENT doc (item+)>
<!ELEMENT item (#PCDATA)>
<!ATTLIST item id CDATA #REQUIRED>
"#;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("fixture written");
        path
    }

    #[test]
    fn loads_without_a_grammar() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "a.xml", "<doc><item id=\"1\">x</item></doc>");

        let mut loader = XmlLoader::new(&ParseOptions::default()).expect("loader");
        let outcome = loader.load_with_report(&path).expect("load");
        assert!(outcome.document.is_some());
        assert!(outcome.report.is_none());
        assert_eq!(loader.summary().total_files, 0);
    }

    #[test]
    fn validates_when_grammar_is_configured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dtd = write(dir.path(), "doc.dtd", GRAMMAR);
        let path = write(
            dir.path(),
            "a.xml",
            "<!DOCTYPE doc SYSTEM \"doc.dtd\">\n<doc><item id=\"1\">x</item></doc>",
        );

        let mut loader = XmlLoader::new(&ParseOptions {
            dtd_path: Some(dtd),
            ..ParseOptions::default()
        })
        .expect("loader");
        let outcome = loader.load_with_report(&path).expect("load");
        assert!(outcome.document.is_some());
        let report = outcome.report.expect("report");
        assert!(report.is_valid, "{:?}", report.errors);

        let summary = loader.summary();
        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.valid_files, 1);
        assert!((summary.success_rate - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn recoverable_defects_still_yield_a_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "bad.xml", "<doc><item id=\"1\">x</doc>");

        let mut loader = XmlLoader::new(&ParseOptions::default()).expect("loader");
        let outcome = loader.load_with_report(&path).expect("recovered");
        let doc = outcome.document.expect("recovered tree");
        assert_eq!(doc.root.name, "doc");
        assert_eq!(doc.root.find("item").expect("item").attr("id"), Some("1"));
        assert_eq!(loader.stats().parsing_errors, 0);
    }

    #[test]
    fn unparseable_files_are_contained_by_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(dir.path(), "bad.xml", "this is not markup at all");

        let mut loader = XmlLoader::new(&ParseOptions::default()).expect("loader");
        let outcome = loader.load_with_report(&path).expect("contained");
        assert!(outcome.document.is_none());
        assert_eq!(loader.stats().parsing_errors, 1);
        assert_eq!(loader.summary().total_files, 0);
    }

    #[test]
    fn markup_defects_count_against_validation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dtd = write(dir.path(), "doc.dtd", GRAMMAR);
        let path = write(dir.path(), "bad.xml", "<doc><item id=\"1\">x</doc>");

        let mut loader = XmlLoader::new(&ParseOptions {
            dtd_path: Some(dtd),
            ..ParseOptions::default()
        })
        .expect("loader");
        let outcome = loader.load_with_report(&path).expect("recovered");
        assert!(outcome.document.is_some());
        let report = outcome.report.expect("report");
        assert!(!report.is_valid);

        let summary = loader.summary();
        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.invalid_files, 1);
        assert_eq!(summary.parsing_errors, 0);
        assert!(summary.validation_errors >= 1);
    }

    #[test]
    fn strict_mode_propagates_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dtd = write(dir.path(), "doc.dtd", GRAMMAR);
        let bad = write(dir.path(), "bad.xml", "<doc><item id=\"1\">x</doc>");
        let invalid = write(
            dir.path(),
            "invalid.xml",
            "<!DOCTYPE doc SYSTEM \"doc.dtd\">\n<doc><item>x</item></doc>",
        );

        let strict = ParseOptions {
            dtd_path: Some(dtd),
            validate_dtd: true,
            continue_on_error: false,
        };
        let mut loader = XmlLoader::new(&strict).expect("loader");
        assert!(matches!(
            loader.load_with_report(&bad),
            Err(ParseError::Malformed { .. })
        ));
        assert!(matches!(
            loader.load_with_report(&invalid),
            Err(ParseError::Invalid { errors: 1, .. })
        ));

        let missing = dir.path().join("nope.xml");
        assert!(matches!(
            loader.load_with_report(&missing),
            Err(ParseError::Io { .. })
        ));
    }

    #[test]
    fn missing_files_are_contained_by_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut loader = XmlLoader::new(&ParseOptions::default()).expect("loader");
        let outcome = loader
            .load_with_report(&dir.path().join("nope.xml"))
            .expect("contained");
        assert!(outcome.document.is_none());
        assert!(outcome.report.is_none());
        assert_eq!(loader.stats().parsing_errors, 1);
    }

    #[test]
    fn repeated_loads_give_identical_reports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dtd = write(dir.path(), "doc.dtd", GRAMMAR);
        let path = write(
            dir.path(),
            "a.xml",
            "<!DOCTYPE doc SYSTEM \"doc.dtd\">\n<doc><item id=\"1\">x</item></doc>",
        );

        let mut loader = XmlLoader::new(&ParseOptions {
            dtd_path: Some(dtd),
            ..ParseOptions::default()
        })
        .expect("loader");
        let first = loader.load_with_report(&path).expect("load");
        let second = loader.load_with_report(&path).expect("load");
        let (a, b) = (first.report.expect("report"), second.report.expect("report"));
        assert_eq!(a.is_valid, b.is_valid);
        assert_eq!(a.errors.len(), b.errors.len());
        assert_eq!(loader.summary().total_files, 2);

        loader.reset_stats();
        assert_eq!(loader.summary().total_files, 0);
    }
}
