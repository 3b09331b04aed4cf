use clap::{Parser, Subcommand};
use docvault::Result;
use docvault::commands::{
    add_files, delete_file, list_files, rebuild_index, search, show_config, show_status,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docvault")]
#[command(about = "Local RAG backend: ingest documents and search them semantically")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active configuration
    Config,
    /// Ingest one or more text documents into the library
    Add {
        /// Paths of the documents to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Category label applied to every ingested file
        #[arg(long)]
        category: Option<String>,
        /// Tag applied to every ingested file (repeatable)
        #[arg(long)]
        tag: Vec<String>,
    },
    /// Semantic search over the ingested library
    Search {
        /// Query text
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Minimum cosine similarity for a result
        #[arg(long, default_value_t = 0.7)]
        threshold: f32,
        /// Only return chunks from files in this category
        #[arg(long)]
        category: Option<String>,
        /// Only return chunks from files carrying this tag (repeatable)
        #[arg(long)]
        tag: Vec<String>,
    },
    /// List files in the library
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Filter by category
        #[arg(long)]
        category: Option<String>,
        /// Substring match over file name and summary
        #[arg(long)]
        search: Option<String>,
    },
    /// Delete a file and its chunks; vectors are removed logically
    Delete {
        /// File id to delete
        file_id: String,
    },
    /// Validate index/metadata consistency and rebuild the vector index
    Rebuild,
    /// Show library and index statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config => {
            show_config()?;
        }
        Commands::Add {
            paths,
            category,
            tag,
        } => {
            add_files(&paths, category, tag).await?;
        }
        Commands::Search {
            query,
            limit,
            threshold,
            category,
            tag,
        } => {
            search(query, limit, threshold, category, tag).await?;
        }
        Commands::List {
            page,
            category,
            search,
        } => {
            list_files(page, category, search).await?;
        }
        Commands::Delete { file_id } => {
            delete_file(file_id).await?;
        }
        Commands::Rebuild => {
            rebuild_index().await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["docvault", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn add_command_with_paths() {
        let cli = Cli::try_parse_from(["docvault", "add", "notes.md", "--category", "Notes"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Add {
                paths, category, ..
            } = parsed.command
            {
                assert_eq!(paths, vec![PathBuf::from("notes.md")]);
                assert_eq!(category, Some("Notes".to_string()));
            }
        }
    }

    #[test]
    fn add_command_requires_paths() {
        let cli = Cli::try_parse_from(["docvault", "add"]);
        assert!(cli.is_err());
    }

    #[test]
    fn search_command_defaults() {
        let cli = Cli::try_parse_from(["docvault", "search", "ownership rules"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                query,
                limit,
                threshold,
                ..
            } = parsed.command
            {
                assert_eq!(query, "ownership rules");
                assert_eq!(limit, 10);
                assert!((threshold - 0.7).abs() < f32::EPSILON);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["docvault", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["docvault", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
