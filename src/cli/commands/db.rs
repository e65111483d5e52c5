//! Database management commands.

use console::style;

use crate::config::Settings;
use crate::reconcile::QUEUE_STATUS_PENDING;
use crate::repository::util::redact_url_password;

/// Run database migrations.
pub async fn cmd_migrate(settings: &Settings) -> anyhow::Result<()> {
    println!("{} Database migration", style("→").cyan());
    println!(
        "  Database: {}",
        redact_url_password(&settings.database_url())
    );

    let ctx = settings.create_db_context()?;
    ctx.migrate().await?;

    println!("{} Schema is up to date.", style("✓").green());
    Ok(())
}

/// Show tables and doc-id coverage.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    if !settings.database_exists() {
        println!(
            "{} No database at {}. Run 'docsync init' first.",
            style("!").yellow(),
            settings.database_path().display()
        );
        return Ok(());
    }

    let ctx = settings
        .create_db_context_validated()
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!(
        "{} {}",
        style("Database").bold(),
        redact_url_password(ctx.database_url())
    );
    let tables = ctx.list_tables().await?;
    println!("  Tables: {}", tables.join(", "));

    let ranges = ctx.doc_ids().all_ranges().await?;
    let rows: i64 = ranges.values().map(|r| r.span()).sum();
    println!(
        "  Resources with doc ids: {} (spanning {} ids)",
        ranges.len(),
        rows
    );

    let pending = ctx
        .transform_queue()
        .count_by_status(QUEUE_STATUS_PENDING)
        .await?;
    println!("  Pending transforms: {}", pending);

    Ok(())
}
