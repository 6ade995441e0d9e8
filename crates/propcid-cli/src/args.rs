use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "propcid", version, about = "Validate and content-address property data")]
pub struct Cli {
    /// Emit the run summary as JSON on stdout.
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides applied on top of the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// JSON config file (EngineConfig).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// IPFS gateway base URL for schema fetching.
    #[arg(long, global = true)]
    pub gateway: Option<String>,

    /// Local directory of `<cid>.json` schemas; takes precedence over the gateway.
    #[arg(long, global = true)]
    pub schema_dir: Option<String>,

    /// Data-group CID that marks seed files.
    #[arg(long, global = true)]
    pub seed_schema: Option<String>,

    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,

    /// Schema cache capacity.
    #[arg(long, global = true)]
    pub cache_capacity: Option<usize>,

    /// Load and validate linked local files during validation.
    #[arg(long, global = true)]
    pub resolve_local_refs: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    /// Error report CSV.
    #[arg(long, default_value = "submit_errors.csv")]
    pub errors_csv: PathBuf,

    /// Warning report CSV.
    #[arg(long, default_value = "submit_warnings.csv")]
    pub warnings_csv: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Validate every property directory under INPUT against its schemas.
    Validate {
        input: PathBuf,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Validate, canonicalize and hash every file under INPUT.
    Hash {
        input: PathBuf,

        /// ZIP archive of canonical documents and assets.
        #[arg(long, default_value = "hashed.zip")]
        output_zip: PathBuf,

        /// Result CSV (one row per hashed document).
        #[arg(long, default_value = "hash-results.csv")]
        output_csv: PathBuf,

        #[command(flatten)]
        report: ReportArgs,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_overrides_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "propcid",
            "hash",
            "in",
            "--output-zip",
            "out.zip",
            "--schema-dir",
            "schemas",
            "--max-concurrency",
            "3",
        ])
        .expect("parse");
        assert_eq!(cli.engine.schema_dir.as_deref(), Some("schemas"));
        assert_eq!(cli.engine.max_concurrency, Some(3));
        match cli.command {
            Command::Hash {
                output_zip,
                output_csv,
                ..
            } => {
                assert_eq!(output_zip, PathBuf::from("out.zip"));
                assert_eq!(output_csv, PathBuf::from("hash-results.csv"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
