use chrono::{DateTime, Utc};
use clap::Args;

#[derive(Args)]
pub struct CompleteArgs {
    /// User identifier
    pub user_id: String,
    /// Ritual identifier
    pub ritual_id: String,
    /// Completion instant (RFC 3339); defaults to now
    #[arg(long)]
    pub at: Option<String>,
}

pub fn run(args: CompleteArgs) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::open_service()?;

    let result = match args.at.as_deref() {
        Some(at) => {
            let now = DateTime::parse_from_rfc3339(at)
                .map_err(|e| format!("invalid --at '{at}': {e}"))?
                .with_timezone(&Utc);
            service.complete_ritual(&args.user_id, &args.ritual_id, now)?
        }
        None => service.complete_ritual_now(&args.user_id, &args.ritual_id)?,
    };

    if !result.accepted {
        tracing::info!(user_id = %args.user_id, ritual_id = %args.ritual_id, "already completed today");
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
