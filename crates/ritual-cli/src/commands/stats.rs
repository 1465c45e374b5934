pub fn run(user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::open_service()?;
    let stats = service.get_user_stats(user_id)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
