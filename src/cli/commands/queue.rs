//! Transform queue commands.

use console::style;

use crate::config::Settings;

/// List transform queue entries with the given status.
pub async fn cmd_queue_list(settings: &Settings, status: &str, limit: usize) -> anyhow::Result<()> {
    let ctx = settings.create_db_context()?;
    let entries = ctx.transform_queue().list_by_status(status, limit).await?;

    if entries.is_empty() {
        println!("{} No queue entries with status '{}'", style("!").yellow(), status);
        return Ok(());
    }

    println!("{}", style(format!("{:<10} {:<20} {:<6} QUEUED", "RESOURCE", "ISBN", "STATUS")).bold());
    for entry in &entries {
        println!(
            "{:<10} {:<20} {:<6} {}",
            entry.resource_id, entry.isbn, entry.status, entry.queued_at
        );
    }
    println!("\n{} entries", entries.len());
    Ok(())
}
