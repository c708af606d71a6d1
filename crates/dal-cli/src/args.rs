//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use helios_dal::compiler::Dialect;

/// Operator tool for the Helios data-access layer.
#[derive(Debug, Parser)]
#[command(name = "dal", version, about)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "DAL_LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile an indexed query for one or every dialect.
    Compile(CompileArgs),

    /// Run an indexed query against an in-memory store seeded from a file.
    Query(QueryArgs),

    /// Check a table configuration file.
    Validate(ConfigArgs),

    /// Encode or decode paging cursors.
    #[command(subcommand)]
    Cursor(CursorCommand),
}

/// Location of the table configuration file.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Table configuration file (JSON with `table` and optional `engine`).
    #[arg(short, long, env = "DAL_CONFIG")]
    pub config: PathBuf,
}

/// The indexed query to compile or run.
#[derive(Debug, Clone, Args)]
pub struct QuerySpec {
    /// Tenant the query runs as.
    #[arg(short, long, env = "DAL_TENANT")]
    pub tenant: String,

    /// Secondary index name.
    #[arg(short, long)]
    pub index: String,

    /// Value of the index partition key (JSON, or a bare string).
    #[arg(short, long)]
    pub partition: String,

    /// Condition on the index sort key, as a JSON operator map or scalar.
    #[arg(long)]
    pub sort_key: Option<String>,

    /// Additional filter, as a JSON field map.
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Comma-separated dotted field paths to return.
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Scan the sort key in descending order.
    #[arg(long)]
    pub descending: bool,

    /// Maximum number of records (page size for paginated runs).
    #[arg(short, long)]
    pub limit: Option<u32>,
}

/// Arguments of `dal compile`.
#[derive(Debug, Clone, Args)]
pub struct CompileArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub query: QuerySpec,

    /// Compile for this dialect only.
    #[arg(short, long)]
    pub dialect: Option<Dialect>,
}

/// Arguments of `dal query`.
#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub query: QuerySpec,

    /// JSON file holding an array of records to seed.
    #[arg(long)]
    pub data: PathBuf,

    /// Dialect of the in-memory store.
    #[arg(short, long, default_value = "expression")]
    pub dialect: Dialect,

    /// Paging cursor from a previous page.
    #[arg(long)]
    pub cursor: Option<String>,
}

/// `dal cursor` subcommands.
#[derive(Debug, Subcommand)]
pub enum CursorCommand {
    /// Encode a cursor for a page.
    Encode {
        /// 1-based page number.
        #[arg(long, default_value = "1")]
        page: u32,
        /// Page size.
        #[arg(long)]
        limit: u32,
    },

    /// Decode a cursor; unreadable cursors decode to the first page.
    Decode {
        /// The opaque cursor.
        cursor: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile() {
        let cli = Cli::try_parse_from([
            "dal",
            "compile",
            "--config",
            "orders.json",
            "--tenant",
            "acme",
            "--index",
            "byStatus",
            "--partition",
            "open",
            "--fields",
            "id,shipping.city",
            "--dialect",
            "selector",
        ])
        .unwrap();
        match cli.command {
            Command::Compile(args) => {
                assert_eq!(args.query.fields, vec!["id", "shipping.city"]);
                assert_eq!(args.dialect, Some(Dialect::Selector));
                assert!(!args.query.descending);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_cursor_decode() {
        let cli = Cli::try_parse_from(["dal", "cursor", "decode", "abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Cursor(CursorCommand::Decode { ref cursor }) if cursor == "abc"
        ));
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let result = Cli::try_parse_from([
            "dal", "compile", "-c", "x.json", "-t", "a", "-i", "i", "-p", "v", "-d", "sql",
        ]);
        assert!(result.is_err());
    }
}
