use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ritual-cli", version, about = "Ritual completion engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ritual definitions
    Ritual {
        #[command(subcommand)]
        action: commands::ritual::RitualAction,
    },
    /// Record a ritual completion
    Complete(commands::complete::CompleteArgs),
    /// Streak and completion statistics for a user
    Stats {
        /// User identifier
        user_id: String,
    },
    /// Earned badges and progress towards the rest
    Badges {
        /// User identifier
        user_id: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();
    commands::init_tracing();

    let result = match cli.command {
        Commands::Ritual { action } => commands::ritual::run(action),
        Commands::Complete(args) => commands::complete::run(args),
        Commands::Stats { user_id } => commands::stats::run(&user_id),
        Commands::Badges { user_id } => commands::badges::run(&user_id),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
