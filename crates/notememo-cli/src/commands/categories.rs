use notememo_core::db::{note_counts, CategoryRepository, SqliteCategoryRepository};

use crate::cli::CategoryCommands;
use crate::commands::common::{category_items, format_category_lines, resolve_category, Session};
use crate::error::CliError;

pub async fn run_categories(
    command: Option<CategoryCommands>,
    session: &Session,
) -> Result<(), CliError> {
    let repo = SqliteCategoryRepository::new(&session.db);

    match command.unwrap_or(CategoryCommands::List { json: false }) {
        CategoryCommands::List { json } => {
            let categories = session.sync.load_categories().await?;
            let items = category_items(&categories, &note_counts(&session.db)?);
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                for line in format_category_lines(&items) {
                    println!("{line}");
                }
            }
            return Ok(());
        }
        CategoryCommands::Add { name, description } => {
            session.warn_if_unavailable();
            let category = repo.create(&name, description)?;
            println!("{}", category.name);
        }
        CategoryCommands::Rename {
            name,
            new_name,
            description,
        } => {
            let category = resolve_category(&name, &repo)?;
            let description = description.or(category.description);
            session.warn_if_unavailable();
            let renamed = repo.rename(&category.id, &new_name, description)?;
            println!("{}", renamed.name);
        }
        CategoryCommands::Delete { name } => {
            let category = resolve_category(&name, &repo)?;
            session.warn_if_unavailable();
            let removed = repo.delete(&category.id)?;
            println!("{}", removed.name);
        }
    }

    session.sync_after_change().await;
    Ok(())
}
