mod commands;
mod customer;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::run::JobKind;

#[derive(Parser)]
#[command(
    name = "chunkflow",
    version,
    about = "Chunk-oriented batch job runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch job
    Run {
        /// Path to settings YAML file
        settings: PathBuf,
        /// Which demo job to run
        #[arg(long, value_enum, default_value = "import")]
        job: JobKind,
        /// Extra launch parameters as key=value (repeatable)
        #[arg(long = "param", value_parser = commands::run::parse_key_val)]
        params: Vec<(String, String)>,
        /// Reuse the exact parameter set instead of stamping a fresh run.id
        #[arg(long)]
        no_increment: bool,
    },
    /// Page through recorded job executions
    Executions {
        /// Path to settings YAML file
        settings: PathBuf,
        /// Filter by job name
        #[arg(long)]
        job: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long, default_value_t = 10)]
        size: u64,
    },
    /// Show one execution in full detail
    Show {
        /// Path to settings YAML file
        settings: PathBuf,
        /// Execution id
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            settings,
            job,
            params,
            no_increment,
        } => commands::run::execute(&settings, job, params, no_increment).await,
        Commands::Executions {
            settings,
            job,
            page,
            size,
        } => commands::executions::execute(&settings, job.as_deref(), page, size),
        Commands::Show { settings, id } => commands::show::execute(&settings, id),
    }
}
