use clap::Subcommand;
use ritual_core::{Config, Database, Ritual};

#[derive(Subcommand)]
pub enum RitualAction {
    /// Register a ritual
    Add {
        /// Ritual identifier
        id: String,
        /// Display name
        name: String,
        /// Category used by category badges
        #[arg(long, default_value = "general")]
        category: String,
        /// Free-form description
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List registered rituals
    List,
}

pub fn run(action: RitualAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open_at(&config.database_path()?, config.busy_timeout())?;

    match action {
        RitualAction::Add {
            id,
            name,
            category,
            description,
        } => {
            ritual_core::ritual::validate_identifier("ritual_id", &id)?;
            let mut ritual = Ritual::new(id, name, category);
            ritual.description = description;
            db.create_ritual(&ritual)?;
            println!("{}", serde_json::to_string_pretty(&ritual)?);
        }
        RitualAction::List => {
            let rituals = db.list_rituals()?;
            println!("{}", serde_json::to_string_pretty(&rituals)?);
        }
    }
    Ok(())
}
