mod commands;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use vaccination_engine::Gender;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "vaccination")]
#[command(about = "Rebuild and inspect children's vaccination buckets")]
struct Cli {
    #[command(flatten)]
    database: DatabaseArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct DatabaseArgs {
    /// Connection URL; DB_HOST, DB_PORT, DB_NAME, DB_USER and DB_PASSWORD are used when absent
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "DB_MAX_CONNECTIONS", global = true)]
    max_connections: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations
    Migrate {
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Rebuild due and late doses for one child or for everyone
    Rebuild {
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        child: Option<Uuid>,

        #[arg(long)]
        all: bool,

        /// Children rebuilt in parallel with --all; 0 uses one per CPU
        #[arg(long, env = "REBUILD_CONCURRENCY", default_value_t = 1)]
        concurrency: usize,
    },

    /// Report (vaccine, dose) pairs defined by more than one calendar entry
    Validate {
        /// Read the calendar from a JSON file instead of the database
        #[arg(long)]
        calendar: Option<PathBuf>,
    },

    /// Print the buckets a child would get, without touching the database
    Preview {
        #[arg(long)]
        calendar: PathBuf,

        #[arg(long)]
        birth_date: NaiveDate,

        #[arg(long, value_enum, ignore_case = true)]
        gender: GenderArg,

        /// Evaluate at this date instead of now
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "verbatim")]
enum GenderArg {
    M,
    F,
}

impl From<GenderArg> for Gender {
    fn from(value: GenderArg) -> Self {
        match value {
            GenderArg::M => Gender::Male,
            GenderArg::F => Gender::Female,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    commands::run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebuild_requires_a_target() {
        assert!(Cli::try_parse_from(["vaccination", "rebuild"]).is_err());
        assert!(Cli::try_parse_from([
            "vaccination",
            "rebuild",
            "--all",
            "--child",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
        ])
        .is_err());
    }

    #[test]
    fn test_rebuild_all_with_concurrency() {
        let cli = Cli::try_parse_from(["vaccination", "rebuild", "--all", "--concurrency", "8"])
            .unwrap();
        match cli.command {
            Command::Rebuild {
                child,
                all,
                concurrency,
            } => {
                assert!(all);
                assert_eq!(child, None);
                assert_eq!(concurrency, 8);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_preview_arguments() {
        let cli = Cli::try_parse_from([
            "vaccination",
            "preview",
            "--calendar",
            "calendar.json",
            "--birth-date",
            "2024-01-01",
            "--gender",
            "F",
        ])
        .unwrap();
        match cli.command {
            Command::Preview {
                birth_date, gender, as_of, ..
            } => {
                assert_eq!(birth_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
                assert_eq!(Gender::from(gender), Gender::Female);
                assert_eq!(as_of, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
