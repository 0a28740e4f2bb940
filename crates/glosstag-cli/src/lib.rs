pub mod jsonl;

pub use jsonl::{
    DEFAULT_SEARCH_LIMIT, JsonlError, JsonlStats, LineIssue, PosAverages, SchemaIssue,
    SearchFilter, export_csv, read_entries, search, search_file, stats, validate_file,
    validate_schema, write_entries,
};
