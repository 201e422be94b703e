//! Command-line interface definitions.
//!
//! Arguments can be given as flags; the API key can also come from the
//! environment.

use clap::{Parser, Subcommand};

/// Command-line arguments for the context analysis pipeline.
///
/// # Examples
///
/// ```sh
/// # Analyze a batch of collected articles and index the new ones
/// ai_news_context analyze -i ./collected/articles.json -o ./reports
///
/// # Analyze without touching the persisted index
/// ai_news_context analyze -i articles.json -o ./reports --no-index
///
/// # Inspect the index
/// ai_news_context --config ./config.yaml stats
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.yaml
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,

    /// API key for the OpenAI-compatible endpoints (overrides config)
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify articles against published history and write a report
    Analyze {
        /// JSON file holding an array of articles
        #[arg(short, long)]
        input: String,

        /// Output directory for the JSON report
        #[arg(short, long)]
        output_dir: String,

        /// Do not add analyzed articles to the index
        #[arg(long)]
        no_index: bool,
    },
    /// Print index statistics as JSON
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "ai_news_context",
            "analyze",
            "--input",
            "./articles.json",
            "--output-dir",
            "./reports",
        ]);

        assert_eq!(cli.config, "config.yaml");
        match cli.command {
            Command::Analyze {
                input,
                output_dir,
                no_index,
            } => {
                assert_eq!(input, "./articles.json");
                assert_eq!(output_dir, "./reports");
                assert!(!no_index);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "ai_news_context",
            "analyze",
            "-i",
            "/tmp/a.json",
            "-o",
            "/tmp/out",
            "--no-index",
            "-c",
            "/etc/news.yaml",
        ]);

        assert_eq!(cli.config, "/etc/news.yaml");
        assert!(matches!(cli.command, Command::Analyze { no_index: true, .. }));
    }

    #[test]
    fn test_stats_subcommand() {
        let cli = Cli::parse_from(["ai_news_context", "--config", "c.yaml", "stats"]);
        assert_eq!(cli.config, "c.yaml");
        assert!(matches!(cli.command, Command::Stats));
    }
}
