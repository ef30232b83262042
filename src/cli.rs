use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Scribe - schema-driven streaming generation for structured content fields
#[derive(Parser, Debug, Clone)]
#[command(name = "scribe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "SCRIBE_CONFIG", default_value = "scribe.toml")]
    pub config: PathBuf,

    /// Keep history in this directory (switches to the file backend)
    #[arg(long, env = "SCRIBE_HISTORY_DIR")]
    pub history_dir: Option<PathBuf>,

    /// Maximum history entries per field
    #[arg(long, env = "SCRIBE_HISTORY_CAPACITY")]
    pub history_capacity: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the compiled rich text schema for a set of node kinds
    Schema {
        /// Comma separated node kinds; the configured defaults when omitted
        #[arg(long, value_delimiter = ',')]
        kinds: Option<Vec<String>>,
    },
    /// Resolve a dotted field path against a collection
    Resolve {
        #[arg(long)]
        collection: String,
        /// Path starting with the collection slug, e.g. posts.articleBody.content
        path: String,
    },
    /// Print the persisted history of one field
    History {
        #[arg(long)]
        document: String,
        #[arg(long)]
        field: String,
    },
    /// Print the JSON Schema of collection files
    FieldSchema,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["scribe", "field-schema"]);
        assert_eq!(cli.config, PathBuf::from("scribe.toml"));
        assert!(cli.history_dir.is_none());
        assert!(cli.history_capacity.is_none());
        assert_eq!(cli.command, Command::FieldSchema);
    }

    #[test]
    fn test_cli_with_args() {
        let cli = Cli::parse_from([
            "scribe",
            "--config",
            "custom.toml",
            "--history-dir",
            "/tmp/history",
            "schema",
            "--kinds",
            "heading,paragraph",
        ]);
        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.history_dir, Some(PathBuf::from("/tmp/history")));
        assert_eq!(
            cli.command,
            Command::Schema {
                kinds: Some(vec!["heading".to_string(), "paragraph".to_string()])
            }
        );
    }

    #[test]
    fn test_resolve_command() {
        let cli = Cli::parse_from(["scribe", "resolve", "--collection", "posts", "posts.articleBody.content"]);
        assert_eq!(
            cli.command,
            Command::Resolve {
                collection: "posts".to_string(),
                path: "posts.articleBody.content".to_string(),
            }
        );
    }
}
