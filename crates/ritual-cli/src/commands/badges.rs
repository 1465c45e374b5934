pub fn run(user_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::open_service()?;
    let badges = service.get_user_badges(user_id)?;
    println!("{}", serde_json::to_string_pretty(&badges)?);
    Ok(())
}
