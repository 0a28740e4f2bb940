//! SQLite storage for parsed gloss corpus entries.
//!
//! [`GlossStore`] owns one connection and maps [`GlossEntry`] graphs onto a
//! normalized relational schema: synsets with their terms and sense keys,
//! one gloss row per entry, and token/annotation/collocation rows hanging
//! off it. Inserts run in batched transactions; reads cover direct lookup,
//! filtered search, corpus statistics, referential integrity checks and a
//! read-only SQL passthrough.
//!
//! Annotations and collocation members reference tokens by the ids the
//! parser preserved from the source. A reference that resolves to no token
//! in the same entry is dropped and counted in the [`InsertReport`], never
//! attached elsewhere.
//!
//! ## Example
//!
//! ```no_run
//! use glosstag_db::{DEFAULT_BATCH_SIZE, GlossStore};
//! use glosstag_types::{GlossEntry, Pos};
//!
//! let mut store = GlossStore::open(std::path::Path::new("corpus.db"))?;
//! let entry = GlossEntry::new("n00001740", "00001740", Pos::Noun);
//! let report = store.insert_entries(&[entry], DEFAULT_BATCH_SIZE)?;
//! println!("stored {} entries", report.entries);
//! # Ok::<(), glosstag_db::StoreError>(())
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use glosstag_types::{GlossEntry, Pos, StructSpan};

/// Entries per transaction when the caller has no preference.
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("only read-only statements are allowed here")]
    ReadOnly,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS synsets (
    id     TEXT PRIMARY KEY,
    offset TEXT NOT NULL,
    pos    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS terms (
    id        INTEGER PRIMARY KEY,
    synset_id TEXT NOT NULL REFERENCES synsets(id) ON DELETE CASCADE,
    term      TEXT NOT NULL,
    position  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sense_keys (
    id        INTEGER PRIMARY KEY,
    synset_id TEXT NOT NULL REFERENCES synsets(id) ON DELETE CASCADE,
    sense_key TEXT NOT NULL,
    position  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS glosses (
    id             INTEGER PRIMARY KEY,
    synset_id      TEXT NOT NULL REFERENCES synsets(id) ON DELETE CASCADE,
    original_text  TEXT NOT NULL,
    tokenized_text TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS definitions (
    id             INTEGER PRIMARY KEY,
    gloss_id       INTEGER NOT NULL REFERENCES glosses(id) ON DELETE CASCADE,
    definition_id  TEXT NOT NULL,
    start_position INTEGER NOT NULL,
    end_position   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS examples (
    id             INTEGER PRIMARY KEY,
    gloss_id       INTEGER NOT NULL REFERENCES glosses(id) ON DELETE CASCADE,
    example_id     TEXT NOT NULL,
    start_position INTEGER NOT NULL,
    end_position   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tokens (
    id             INTEGER PRIMARY KEY,
    gloss_id       INTEGER NOT NULL REFERENCES glosses(id) ON DELETE CASCADE,
    token_id       TEXT NOT NULL,
    text           TEXT NOT NULL,
    lemma          TEXT,
    pos            TEXT,
    tag            TEXT,
    token_type     TEXT NOT NULL,
    start_position INTEGER NOT NULL,
    end_position   INTEGER NOT NULL,
    separator      TEXT NOT NULL,
    coll           TEXT
);

CREATE TABLE IF NOT EXISTS annotations (
    id                 INTEGER PRIMARY KEY,
    token_id           INTEGER NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
    annotation_id      TEXT NOT NULL,
    lemma              TEXT,
    sense_key          TEXT,
    disambiguation_tag TEXT
);

CREATE TABLE IF NOT EXISTS collocations (
    id                 INTEGER PRIMARY KEY,
    gloss_id           INTEGER NOT NULL REFERENCES glosses(id) ON DELETE CASCADE,
    collocation_id     TEXT NOT NULL,
    text               TEXT NOT NULL,
    lemma              TEXT,
    sense_key          TEXT,
    disambiguation_tag TEXT,
    glob_type          TEXT,
    is_discontiguous   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS collocation_tokens (
    id             INTEGER PRIMARY KEY,
    collocation_id INTEGER NOT NULL REFERENCES collocations(id) ON DELETE CASCADE,
    token_id       INTEGER NOT NULL REFERENCES tokens(id) ON DELETE CASCADE,
    sequence_order INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_synsets_pos        ON synsets(pos);
CREATE INDEX IF NOT EXISTS idx_terms_synset       ON terms(synset_id);
CREATE INDEX IF NOT EXISTS idx_terms_term         ON terms(term);
CREATE INDEX IF NOT EXISTS idx_sense_keys_synset  ON sense_keys(synset_id);
CREATE INDEX IF NOT EXISTS idx_sense_keys_key     ON sense_keys(sense_key);
CREATE INDEX IF NOT EXISTS idx_glosses_synset     ON glosses(synset_id);
CREATE INDEX IF NOT EXISTS idx_tokens_gloss       ON tokens(gloss_id);
CREATE INDEX IF NOT EXISTS idx_tokens_token_id    ON tokens(token_id);
CREATE INDEX IF NOT EXISTS idx_tokens_text        ON tokens(text);
CREATE INDEX IF NOT EXISTS idx_tokens_lemma       ON tokens(lemma);
CREATE INDEX IF NOT EXISTS idx_annotations_token  ON annotations(token_id);
CREATE INDEX IF NOT EXISTS idx_annotations_sense  ON annotations(sense_key);
CREATE INDEX IF NOT EXISTS idx_collocations_gloss ON collocations(gloss_id);
CREATE INDEX IF NOT EXISTS idx_collocations_sense ON collocations(sense_key);
";

const DROP_ALL: &str = "
DROP TABLE IF EXISTS collocation_tokens;
DROP TABLE IF EXISTS collocations;
DROP TABLE IF EXISTS annotations;
DROP TABLE IF EXISTS tokens;
DROP TABLE IF EXISTS examples;
DROP TABLE IF EXISTS definitions;
DROP TABLE IF EXISTS glosses;
DROP TABLE IF EXISTS sense_keys;
DROP TABLE IF EXISTS terms;
DROP TABLE IF EXISTS synsets;
";

/// Counters from one [`GlossStore::insert_entries`] run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct InsertReport {
    pub entries: u64,
    pub glosses: u64,
    pub tokens: u64,
    pub annotations: u64,
    pub collocations: u64,
    /// Annotations whose token reference resolved to nothing.
    pub dangling_annotations: u64,
    /// Collocation members whose token reference resolved to nothing.
    pub dangling_members: u64,
}

/// Denormalized synset row for query results.
#[derive(Clone, Debug, Serialize)]
pub struct SynsetSummary {
    pub synset_id: String,
    pub pos: String,
    pub offset: String,
    pub terms: Vec<String>,
    pub sense_keys: Vec<String>,
    pub original_text: Option<String>,
}

/// Search criteria; unset fields do not constrain.
#[derive(Clone, Debug, Default)]
pub struct SearchFilter {
    pub pos: Option<Pos>,
    /// Substring match against terms.
    pub term: Option<String>,
    /// Substring match against original gloss text.
    pub gloss: Option<String>,
    /// Row cap, 100 when unset.
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CollocationHit {
    pub synset_id: String,
    pub collocation_id: String,
    pub text: String,
    pub sense_key: Option<String>,
    pub is_discontiguous: bool,
}

/// Corpus-wide counts.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Statistics {
    pub total_synsets: u64,
    pub total_terms: u64,
    pub total_sense_keys: u64,
    pub total_glosses: u64,
    pub total_tokens: u64,
    pub total_annotations: u64,
    pub total_collocations: u64,
    /// Tokens carrying at least one annotation with a sense key.
    pub disambiguated_tokens: u64,
    pub synsets_by_pos: BTreeMap<String, u64>,
}

/// Referential and content checks over a populated store.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IntegrityReport {
    pub orphaned_glosses: u64,
    pub orphaned_tokens: u64,
    pub orphaned_annotations: u64,
    pub orphaned_collocations: u64,
    pub synsets_without_glosses: u64,
    pub tokens_without_text: u64,
    pub annotations_without_sense_keys: u64,
    pub total_synsets: u64,
}

impl IntegrityReport {
    /// Every finding except the plain synset count.
    pub fn issue_count(&self) -> u64 {
        self.orphaned_glosses
            + self.orphaned_tokens
            + self.orphaned_annotations
            + self.orphaned_collocations
            + self.synsets_without_glosses
            + self.tokens_without_text
            + self.annotations_without_sense_keys
    }
}

/// Result of the read-only SQL passthrough, every value rendered as text.
#[derive(Clone, Debug, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub struct GlossStore {
    conn: Connection,
}

impl GlossStore {
    /// Open (creating if needed) a database file and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(GlossStore { conn })
    }

    /// Drop and recreate every table.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(DROP_ALL)?;
        self.conn.execute_batch(SCHEMA)?;
        info!("store reset, all tables recreated");
        Ok(())
    }

    /// Insert entries in transactions of `batch_size` (minimum one per
    /// transaction). A failed batch rolls back whole.
    pub fn insert_entries(
        &mut self,
        entries: &[GlossEntry],
        batch_size: usize,
    ) -> Result<InsertReport, StoreError> {
        let mut report = InsertReport::default();
        for chunk in entries.chunks(batch_size.max(1)) {
            let tx = self.conn.transaction()?;
            for entry in chunk {
                insert_entry(&tx, entry, &mut report)?;
            }
            tx.commit()?;
            debug!("committed a batch of {} entries", chunk.len());
        }
        info!(
            "stored {} entries: {} tokens, {} annotations, {} collocations",
            report.entries, report.tokens, report.annotations, report.collocations
        );
        if report.dangling_annotations > 0 || report.dangling_members > 0 {
            debug!(
                "dropped {} dangling annotations and {} dangling collocation members",
                report.dangling_annotations, report.dangling_members
            );
        }
        Ok(report)
    }

    /// Look up one synset by id.
    pub fn synset(&self, synset_id: &str) -> Result<Option<SynsetSummary>, StoreError> {
        let core = self
            .conn
            .query_row(
                "SELECT id, pos, offset FROM synsets WHERE id = ?1",
                [synset_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match core {
            Some((id, pos, offset)) => Ok(Some(self.summary_for(id, pos, offset)?)),
            None => Ok(None),
        }
    }

    pub fn synsets_by_pos(&self, pos: Pos) -> Result<Vec<SynsetSummary>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, pos, offset FROM synsets WHERE pos = ?1 ORDER BY id")?;
        let cores = stmt
            .query_map([pos.to_char().to_string()], core_row)?
            .collect::<Result<Vec<_>, _>>()?;
        cores
            .into_iter()
            .map(|(id, pos, offset)| self.summary_for(id, pos, offset))
            .collect()
    }

    /// Synsets with a term containing `needle`.
    pub fn synsets_by_term(&self, needle: &str) -> Result<Vec<SynsetSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT s.id, s.pos, s.offset FROM synsets s
             JOIN terms t ON t.synset_id = s.id
             WHERE t.term LIKE '%' || ?1 || '%' ORDER BY s.id",
        )?;
        let cores = stmt
            .query_map([needle], core_row)?
            .collect::<Result<Vec<_>, _>>()?;
        cores
            .into_iter()
            .map(|(id, pos, offset)| self.summary_for(id, pos, offset))
            .collect()
    }

    /// Synsets whose original gloss text contains `needle`.
    pub fn glosses_containing(&self, needle: &str) -> Result<Vec<SynsetSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT s.id, s.pos, s.offset FROM synsets s
             JOIN glosses g ON g.synset_id = s.id
             WHERE g.original_text LIKE '%' || ?1 || '%' ORDER BY s.id",
        )?;
        let cores = stmt
            .query_map([needle], core_row)?
            .collect::<Result<Vec<_>, _>>()?;
        cores
            .into_iter()
            .map(|(id, pos, offset)| self.summary_for(id, pos, offset))
            .collect()
    }

    pub fn collocations_by_sense_key(
        &self,
        sense_key: &str,
    ) -> Result<Vec<CollocationHit>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT g.synset_id, c.collocation_id, c.text, c.sense_key, c.is_discontiguous
             FROM collocations c
             JOIN glosses g ON g.id = c.gloss_id
             WHERE c.sense_key = ?1 ORDER BY g.synset_id",
        )?;
        let rows = stmt.query_map([sense_key], |row| {
            Ok(CollocationHit {
                synset_id: row.get(0)?,
                collocation_id: row.get(1)?,
                text: row.get(2)?,
                sense_key: row.get(3)?,
                is_discontiguous: row.get::<_, i64>(4)? != 0,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Combined filter search over synsets.
    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<SynsetSummary>, StoreError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<String> = Vec::new();
        if let Some(pos) = filter.pos {
            clauses.push("s.pos = ?");
            args.push(pos.to_char().to_string());
        }
        if let Some(term) = &filter.term {
            clauses.push(
                "EXISTS (SELECT 1 FROM terms t WHERE t.synset_id = s.id \
                 AND t.term LIKE '%' || ? || '%')",
            );
            args.push(term.clone());
        }
        if let Some(gloss) = &filter.gloss {
            clauses.push(
                "EXISTS (SELECT 1 FROM glosses g WHERE g.synset_id = s.id \
                 AND g.original_text LIKE '%' || ? || '%')",
            );
            args.push(gloss.clone());
        }

        let mut sql = String::from("SELECT s.id, s.pos, s.offset FROM synsets s");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY s.id LIMIT {}",
            filter.limit.unwrap_or(100)
        ));

        let mut stmt = self.conn.prepare(&sql)?;
        let cores = stmt
            .query_map(params_from_iter(args.iter()), core_row)?
            .collect::<Result<Vec<_>, _>>()?;
        cores
            .into_iter()
            .map(|(id, pos, offset)| self.summary_for(id, pos, offset))
            .collect()
    }

    pub fn statistics(&self) -> Result<Statistics, StoreError> {
        let mut stats = Statistics {
            total_synsets: self.count("SELECT COUNT(*) FROM synsets")?,
            total_terms: self.count("SELECT COUNT(*) FROM terms")?,
            total_sense_keys: self.count("SELECT COUNT(*) FROM sense_keys")?,
            total_glosses: self.count("SELECT COUNT(*) FROM glosses")?,
            total_tokens: self.count("SELECT COUNT(*) FROM tokens")?,
            total_annotations: self.count("SELECT COUNT(*) FROM annotations")?,
            total_collocations: self.count("SELECT COUNT(*) FROM collocations")?,
            disambiguated_tokens: self.count(
                "SELECT COUNT(DISTINCT token_id) FROM annotations WHERE sense_key IS NOT NULL",
            )?,
            synsets_by_pos: BTreeMap::new(),
        };
        let mut stmt = self
            .conn
            .prepare("SELECT pos, COUNT(*) FROM synsets GROUP BY pos")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (pos, n) = row?;
            stats.synsets_by_pos.insert(pos, n as u64);
        }
        Ok(stats)
    }

    pub fn integrity_report(&self) -> Result<IntegrityReport, StoreError> {
        Ok(IntegrityReport {
            orphaned_glosses: self.count(
                "SELECT COUNT(*) FROM glosses g LEFT JOIN synsets s ON s.id = g.synset_id \
                 WHERE s.id IS NULL",
            )?,
            orphaned_tokens: self.count(
                "SELECT COUNT(*) FROM tokens t LEFT JOIN glosses g ON g.id = t.gloss_id \
                 WHERE g.id IS NULL",
            )?,
            orphaned_annotations: self.count(
                "SELECT COUNT(*) FROM annotations a LEFT JOIN tokens t ON t.id = a.token_id \
                 WHERE t.id IS NULL",
            )?,
            orphaned_collocations: self.count(
                "SELECT COUNT(*) FROM collocations c LEFT JOIN glosses g ON g.id = c.gloss_id \
                 WHERE g.id IS NULL",
            )?,
            synsets_without_glosses: self.count(
                "SELECT COUNT(*) FROM synsets s LEFT JOIN glosses g ON g.synset_id = s.id \
                 WHERE g.id IS NULL",
            )?,
            tokens_without_text: self.count("SELECT COUNT(*) FROM tokens WHERE text = ''")?,
            annotations_without_sense_keys: self.count(
                "SELECT COUNT(*) FROM annotations WHERE sense_key IS NULL OR sense_key = ''",
            )?,
            total_synsets: self.count("SELECT COUNT(*) FROM synsets")?,
        })
    }

    /// Run one read-only SQL statement and stringify the result grid.
    /// Anything that would write is rejected before execution.
    pub fn query_rows(&self, sql: &str) -> Result<QueryOutput, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(StoreError::ReadOnly);
        }
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let column_count = columns.len();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(column_count);
            for i in 0..column_count {
                record.push(render_value(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(QueryOutput { columns, rows: out })
    }

    fn summary_for(
        &self,
        synset_id: String,
        pos: String,
        offset: String,
    ) -> Result<SynsetSummary, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT term FROM terms WHERE synset_id = ?1 ORDER BY position")?;
        let terms = stmt
            .query_map([&synset_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT sense_key FROM sense_keys WHERE synset_id = ?1 ORDER BY position",
        )?;
        let sense_keys = stmt
            .query_map([&synset_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        let original_text = self
            .conn
            .query_row(
                "SELECT original_text FROM glosses WHERE synset_id = ?1 LIMIT 1",
                [&synset_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(SynsetSummary {
            synset_id,
            pos,
            offset,
            terms,
            sense_keys,
            original_text,
        })
    }

    fn count(&self, sql: &str) -> Result<u64, StoreError> {
        Ok(self.conn.query_row(sql, [], |row| row.get::<_, i64>(0))? as u64)
    }
}

fn core_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

fn insert_entry(
    tx: &Transaction<'_>,
    entry: &GlossEntry,
    report: &mut InsertReport,
) -> Result<(), StoreError> {
    tx.prepare_cached("INSERT INTO synsets (id, offset, pos) VALUES (?1, ?2, ?3)")?
        .execute(params![
            entry.synset_id,
            entry.offset,
            entry.pos.to_char().to_string()
        ])?;
    report.entries += 1;

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO terms (synset_id, term, position) VALUES (?1, ?2, ?3)",
        )?;
        for (position, term) in entry.terms.iter().enumerate() {
            stmt.execute(params![entry.synset_id, term, position as i64])?;
        }
    }
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO sense_keys (synset_id, sense_key, position) VALUES (?1, ?2, ?3)",
        )?;
        for (position, sense_key) in entry.sense_keys.iter().enumerate() {
            stmt.execute(params![entry.synset_id, sense_key, position as i64])?;
        }
    }

    tx.prepare_cached(
        "INSERT INTO glosses (synset_id, original_text, tokenized_text) VALUES (?1, ?2, ?3)",
    )?
    .execute(params![
        entry.synset_id,
        entry.original_text,
        entry.tokenized_text
    ])?;
    let gloss_id = tx.last_insert_rowid();
    report.glosses += 1;

    insert_spans(tx, "definitions", "definition_id", gloss_id, &entry.definitions)?;
    insert_spans(tx, "examples", "example_id", gloss_id, &entry.examples)?;

    let mut token_rows: HashMap<&str, i64> = HashMap::new();
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO tokens (gloss_id, token_id, text, lemma, pos, tag, token_type, \
             start_position, end_position, separator, coll) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for token in &entry.tokens {
            stmt.execute(params![
                gloss_id,
                token.id,
                token.text,
                token.lemma,
                token.pos,
                token.tag.map(|t| t.as_str()),
                token.kind.as_str(),
                token.start,
                token.end,
                token.separator,
                token.coll,
            ])?;
            token_rows.insert(token.id.as_str(), tx.last_insert_rowid());
            report.tokens += 1;
        }
    }

    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO annotations (token_id, annotation_id, lemma, sense_key, \
             disambiguation_tag) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for ann in &entry.annotations {
            let target = ann.token_id.as_deref().unwrap_or(&ann.id);
            match token_rows.get(target) {
                Some(&token_row) => {
                    stmt.execute(params![
                        token_row,
                        ann.id,
                        ann.lemma,
                        ann.sense_key,
                        ann.tag.map(|t| t.as_str()),
                    ])?;
                    report.annotations += 1;
                }
                None => {
                    report.dangling_annotations += 1;
                    debug!(
                        "annotation '{}' in {} references no token, dropped",
                        ann.id, entry.synset_id
                    );
                }
            }
        }
    }

    {
        let mut coll_stmt = tx.prepare_cached(
            "INSERT INTO collocations (gloss_id, collocation_id, text, lemma, sense_key, \
             disambiguation_tag, glob_type, is_discontiguous) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        let mut member_stmt = tx.prepare_cached(
            "INSERT INTO collocation_tokens (collocation_id, token_id, sequence_order) \
             VALUES (?1, ?2, ?3)",
        )?;
        for coll in &entry.collocations {
            coll_stmt.execute(params![
                gloss_id,
                coll.id,
                coll.text,
                coll.lemma,
                coll.sense_key,
                coll.tag.map(|t| t.as_str()),
                coll.glob_type,
                coll.is_discontiguous,
            ])?;
            let coll_row = tx.last_insert_rowid();
            report.collocations += 1;
            for (order, member) in coll.token_ids.iter().enumerate() {
                match token_rows.get(member.as_str()) {
                    Some(&token_row) => {
                        member_stmt.execute(params![coll_row, token_row, order as i64])?;
                    }
                    None => {
                        report.dangling_members += 1;
                        debug!(
                            "collocation '{}' member '{}' references no token, dropped",
                            coll.id, member
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

fn insert_spans(
    tx: &Transaction<'_>,
    table: &str,
    id_column: &str,
    gloss_id: i64,
    spans: &[StructSpan],
) -> Result<(), StoreError> {
    let mut stmt = tx.prepare_cached(&format!(
        "INSERT INTO {table} (gloss_id, {id_column}, start_position, end_position) \
         VALUES (?1, ?2, ?3, ?4)"
    ))?;
    for span in spans {
        stmt.execute(params![gloss_id, span.id, span.start, span.end])?;
    }
    Ok(())
}
