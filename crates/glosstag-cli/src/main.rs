use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{Level, warn};
use tracing_subscriber::EnvFilter;

use glosstag_cli::jsonl::{self, SearchFilter};
use glosstag_db::{DEFAULT_BATCH_SIZE, GlossStore, IntegrityReport};
use glosstag_parse::{ParseOptions, ValidationSummary, XmlLoader, corpus_xml_files, parse_corpus};
use glosstag_types::{GlossEntry, Pos};

#[derive(Parser)]
#[command(name = "glosstag")]
#[command(about = "Convert and query the WordNet gloss disambiguation corpus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a corpus directory to JSONL.
    Convert {
        /// Corpus root containing merged/ or standoff/.
        #[arg(long)]
        input: PathBuf,
        /// Output JSONL file.
        #[arg(long)]
        output: PathBuf,
        /// DTD grammar used when --validate-dtd is set.
        #[arg(long)]
        dtd: Option<PathBuf>,
        /// Validate each file against the DTD while parsing.
        #[arg(long, default_value_t = false)]
        validate_dtd: bool,
        /// Abort at the first malformed or invalid file.
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },
    /// Convert a corpus directory straight into a SQLite database.
    Migrate {
        /// Corpus root containing merged/ or standoff/.
        #[arg(long)]
        input: PathBuf,
        /// SQLite database file, created if missing.
        #[arg(long)]
        db: PathBuf,
        /// DTD grammar used when --validate-dtd is set.
        #[arg(long)]
        dtd: Option<PathBuf>,
        /// Validate each file against the DTD while parsing.
        #[arg(long, default_value_t = false)]
        validate_dtd: bool,
        /// Entries per transaction.
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Drop existing tables before loading.
        #[arg(long, default_value_t = false)]
        drop_existing: bool,
        /// Run integrity checks after loading.
        #[arg(long, default_value_t = false)]
        check_integrity: bool,
        /// Abort at the first malformed or invalid file.
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },
    /// Validate corpus files against a DTD without converting.
    Validate {
        /// Corpus root containing merged/ or standoff/.
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        dtd: PathBuf,
        /// Print each diagnostic, not just per-file counts.
        #[arg(long, default_value_t = false)]
        report_errors: bool,
    },
    /// Search a converted JSONL corpus.
    Search {
        /// Converted JSONL file.
        #[arg(long)]
        jsonl: PathBuf,
        /// Exact synset id.
        #[arg(long)]
        synset_id: Option<String>,
        #[arg(long, value_enum)]
        pos: Option<PosArg>,
        /// Case-insensitive substring match against terms.
        #[arg(long)]
        term: Option<String>,
        #[arg(long, default_value_t = jsonl::DEFAULT_SEARCH_LIMIT)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        output_format: OutputFormat,
    },
    /// Print statistics for a JSONL file or a database.
    Analyze {
        #[arg(long)]
        jsonl: Option<PathBuf>,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Write the statistics as JSON to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Export a JSONL corpus to CSV.
    Export {
        /// Converted JSONL file.
        #[arg(long)]
        jsonl: PathBuf,
        /// Output CSV file.
        #[arg(long)]
        output: PathBuf,
    },
    /// Run a read-only SQL query against a migrated database.
    Query {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        sql: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum PosArg {
    Noun,
    Verb,
    Adj,
    Adv,
}

impl From<PosArg> for Pos {
    fn from(arg: PosArg) -> Self {
        match arg {
            PosArg::Noun => Pos::Noun,
            PosArg::Verb => Pos::Verb,
            PosArg::Adj => Pos::Adj,
            PosArg::Adv => Pos::Adv,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            dtd,
            validate_dtd,
            fail_fast,
        } => {
            let options = parse_options(dtd, validate_dtd, fail_fast)?;
            cmd_convert(&input, &output, &options)
        }
        Commands::Migrate {
            input,
            db,
            dtd,
            validate_dtd,
            batch_size,
            drop_existing,
            check_integrity,
            fail_fast,
        } => {
            let options = parse_options(dtd, validate_dtd, fail_fast)?;
            cmd_migrate(&input, &db, &options, batch_size, drop_existing, check_integrity)
        }
        Commands::Validate {
            input,
            dtd,
            report_errors,
        } => cmd_validate(&input, &dtd, report_errors),
        Commands::Search {
            jsonl,
            synset_id,
            pos,
            term,
            limit,
            output_format,
        } => cmd_search(&jsonl, synset_id, pos, term, limit, output_format),
        Commands::Analyze { jsonl, db, output } => {
            cmd_analyze(jsonl.as_deref(), db.as_deref(), output.as_deref())
        }
        Commands::Export { jsonl, output } => cmd_export(&jsonl, &output),
        Commands::Query { db, sql } => cmd_query(&db, &sql),
    }
}

fn parse_options(dtd: Option<PathBuf>, validate_dtd: bool, fail_fast: bool) -> Result<ParseOptions> {
    if validate_dtd && dtd.is_none() {
        bail!("--validate-dtd requires --dtd");
    }
    Ok(ParseOptions {
        dtd_path: dtd,
        validate_dtd,
        continue_on_error: !fail_fast,
    })
}

fn cmd_convert(input: &Path, output: &Path, options: &ParseOptions) -> Result<()> {
    let started = Instant::now();
    let outcome = parse_corpus(input, options)
        .with_context(|| format!("failed to parse corpus at {}", input.display()))?;

    let issues = jsonl::validate_schema(&outcome.entries);
    for issue in &issues {
        warn!("{}: {}", issue.synset_id, issue.message);
    }

    let written = jsonl::write_entries(output, &outcome.entries)?;
    print_validation_summary(&outcome.summary);
    if !issues.is_empty() {
        println!("{} consistency issue(s), see the log.", issues.len());
    }
    println!(
        "Converted {} entries to {} in {} ms.",
        written,
        output.display(),
        started.elapsed().as_millis()
    );
    Ok(())
}

fn cmd_migrate(
    input: &Path,
    db: &Path,
    options: &ParseOptions,
    batch_size: usize,
    drop_existing: bool,
    check_integrity: bool,
) -> Result<()> {
    let started = Instant::now();
    let outcome = parse_corpus(input, options)
        .with_context(|| format!("failed to parse corpus at {}", input.display()))?;

    let mut store = GlossStore::open(db)
        .with_context(|| format!("failed to open database at {}", db.display()))?;
    if drop_existing {
        store.reset()?;
    }
    let report = store.insert_entries(&outcome.entries, batch_size)?;

    print_validation_summary(&outcome.summary);
    let by_pos = pos_counts(&outcome.entries);
    println!("Migration summary");
    println!("  Entries:      {}", report.entries);
    println!("  Nouns:        {}", by_pos[0]);
    println!("  Verbs:        {}", by_pos[1]);
    println!("  Adjectives:   {}", by_pos[2]);
    println!("  Adverbs:      {}", by_pos[3]);
    println!("  Tokens:       {}", report.tokens);
    println!("  Annotations:  {}", report.annotations);
    println!("  Collocations: {}", report.collocations);
    if report.dangling_annotations > 0 || report.dangling_members > 0 {
        println!(
            "  Dropped {} dangling annotation(s) and {} dangling member(s).",
            report.dangling_annotations, report.dangling_members
        );
    }
    println!(
        "Migrated into {} in {} ms.",
        db.display(),
        started.elapsed().as_millis()
    );

    if check_integrity {
        let integrity = store.integrity_report()?;
        if integrity.issue_count() == 0 {
            println!("Integrity check passed.");
        } else {
            println!("Integrity check found {} issue(s):", integrity.issue_count());
            print_integrity(&integrity);
        }
    }
    Ok(())
}

fn cmd_validate(input: &Path, dtd: &Path, report_errors: bool) -> Result<()> {
    let options = ParseOptions {
        dtd_path: Some(dtd.to_path_buf()),
        validate_dtd: true,
        continue_on_error: true,
    };
    let mut loader = XmlLoader::new(&options)?;
    let files = corpus_xml_files(input)?;
    if files.is_empty() {
        bail!("no corpus XML files found under {}", input.display());
    }

    for path in &files {
        let outcome = loader.load_with_report(path)?;
        let Some(report) = outcome.report else {
            continue;
        };
        if report.is_valid {
            println!("{}: valid", report.file);
        } else {
            println!(
                "{}: {} error(s), {} warning(s)",
                report.file,
                report.errors.len(),
                report.warnings.len()
            );
            if report_errors {
                for diag in report.errors.iter().chain(&report.warnings) {
                    println!("  {diag}");
                }
            }
        }
    }

    let summary = loader.summary();
    println!(
        "{}/{} files valid ({:.1}%).",
        summary.valid_files, summary.total_files, summary.success_rate
    );
    if summary.invalid_files > 0 || summary.parsing_errors > 0 {
        bail!(
            "{} invalid file(s), {} parsing error(s)",
            summary.invalid_files,
            summary.parsing_errors
        );
    }
    Ok(())
}

fn cmd_search(
    path: &Path,
    synset_id: Option<String>,
    pos: Option<PosArg>,
    term: Option<String>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let filter = SearchFilter {
        synset_id,
        pos: pos.map(Pos::from),
        term,
        limit: Some(limit),
    };
    let matches = jsonl::search_file(path, &filter)?;

    match format {
        OutputFormat::Json => {
            for entry in &matches {
                println!("{}", serde_json::to_string(entry)?);
            }
        }
        OutputFormat::Table => {
            for entry in &matches {
                println!(
                    "{} [{}] {}: {}",
                    entry.synset_id,
                    entry.pos,
                    entry.terms.join("; "),
                    entry.original_text
                );
            }
            println!("{} match(es).", matches.len());
        }
    }
    Ok(())
}

fn cmd_analyze(jsonl_path: Option<&Path>, db_path: Option<&Path>, output: Option<&Path>) -> Result<()> {
    match (jsonl_path, db_path) {
        (Some(path), None) => {
            let entries = jsonl::read_entries(path)?;
            let stats = jsonl::stats(&entries);
            match output {
                Some(out) => write_json(out, &stats)?,
                None => {
                    println!("JSONL statistics for {}", path.display());
                    println!("  Synsets:     {}", stats.total_synsets);
                    for (pos, count) in &stats.synsets_by_pos {
                        println!("    {pos}:         {count}");
                    }
                    println!("  Annotations: {}", stats.total_annotations);
                    for (pos, avg) in &stats.averages_by_pos {
                        println!(
                            "  {pos}: avg {:.1} chars, {:.1} tokens per gloss",
                            avg.gloss_length, avg.token_count
                        );
                    }
                }
            }
        }
        (None, Some(path)) => {
            if !path.exists() {
                bail!("no database at {}", path.display());
            }
            let store = GlossStore::open(path)?;
            let stats = store.statistics()?;
            match output {
                Some(out) => write_json(out, &stats)?,
                None => {
                    println!("Database statistics for {}", path.display());
                    println!("  Synsets:      {}", stats.total_synsets);
                    for (pos, count) in &stats.synsets_by_pos {
                        println!("    {pos}:          {count}");
                    }
                    println!("  Terms:        {}", stats.total_terms);
                    println!("  Sense keys:   {}", stats.total_sense_keys);
                    println!("  Glosses:      {}", stats.total_glosses);
                    println!("  Tokens:       {}", stats.total_tokens);
                    println!("  Annotations:  {}", stats.total_annotations);
                    println!("  Collocations: {}", stats.total_collocations);
                    println!("  Disambiguated tokens: {}", stats.disambiguated_tokens);
                }
            }
        }
        _ => bail!("pass exactly one of --jsonl or --db"),
    }
    Ok(())
}

fn cmd_export(path: &Path, output: &Path) -> Result<()> {
    let entries = jsonl::read_entries(path)?;
    jsonl::export_csv(output, &entries)?;
    println!("Exported {} entries to {}.", entries.len(), output.display());
    Ok(())
}

fn cmd_query(db: &Path, sql: &str) -> Result<()> {
    if !db.exists() {
        bail!("no database at {}", db.display());
    }
    let store = GlossStore::open(db)?;
    let out = store.query_rows(sql)?;

    println!("{}", out.columns.join("\t"));
    for row in &out.rows {
        println!("{}", row.join("\t"));
    }
    println!("{} row(s).", out.rows.len());
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    std::fs::write(path, format!("{}\n", serde_json::to_string_pretty(value)?))?;
    println!("Wrote statistics to {}.", path.display());
    Ok(())
}

fn print_validation_summary(summary: &ValidationSummary) {
    if summary.total_files > 0 {
        println!(
            "Validation: {}/{} files valid ({:.1}%), {} validation error(s).",
            summary.valid_files, summary.total_files, summary.success_rate,
            summary.validation_errors
        );
    }
    if summary.parsing_errors > 0 {
        println!(
            "Parsing errors: {} file(s) could not be parsed.",
            summary.parsing_errors
        );
    }
}

fn print_integrity(report: &IntegrityReport) {
    let rows = [
        ("orphaned glosses", report.orphaned_glosses),
        ("orphaned tokens", report.orphaned_tokens),
        ("orphaned annotations", report.orphaned_annotations),
        ("orphaned collocations", report.orphaned_collocations),
        ("synsets without glosses", report.synsets_without_glosses),
        ("tokens without text", report.tokens_without_text),
        (
            "annotations without sense keys",
            report.annotations_without_sense_keys,
        ),
    ];
    for (label, count) in rows {
        if count > 0 {
            println!("  {count} {label}");
        }
    }
}

fn pos_counts(entries: &[GlossEntry]) -> [u64; 4] {
    let mut counts = [0u64; 4];
    for entry in entries {
        match entry.pos {
            Pos::Noun => counts[0] += 1,
            Pos::Verb => counts[1] += 1,
            Pos::Adj => counts[2] += 1,
            Pos::Adv => counts[3] += 1,
        }
    }
    counts
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
