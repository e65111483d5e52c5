//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::repository::util::redact_url_password;

/// Initialize the data directory, database and search index.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let ctx = settings.create_db_context()?;
    ctx.migrate().await?;
    println!(
        "  {} Database ready: {}",
        style("✓").green(),
        redact_url_password(&settings.database_url())
    );

    let index = settings.open_index()?;
    println!(
        "  {} Search index ready: {}",
        style("✓").green(),
        index.path().display()
    );

    println!(
        "{} Initialized docsync in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  Source content:   {}", settings.xml_root.display());
    println!("  Rendered content: {}", settings.html_root.display());

    Ok(())
}
