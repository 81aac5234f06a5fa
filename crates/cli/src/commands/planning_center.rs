//! Planning Center lookup command (admin only).

use prayerline_client::services::PlanningCenter;

use super::{CommandError, Context};

#[allow(clippy::print_stdout)]
pub async fn lookup(ctx: &Context, email: &str) -> Result<(), CommandError> {
    ctx.admin().await?;
    let result = PlanningCenter::new(ctx.backend.clone()).lookup(email).await?;

    if result.people.is_empty() {
        println!("No Planning Center records for {email}");
        return Ok(());
    }
    for person in &result.people {
        println!(
            "{}  {}  {}",
            person.id,
            person.name,
            person.email.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
