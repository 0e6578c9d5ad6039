use std::path::Path;

use notememo_core::export::render_notes_export;

use crate::cli::ExportFormat;
use crate::commands::common::Session;
use crate::error::CliError;

pub fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    session: &Session,
) -> Result<(), CliError> {
    let notes = session.sync.cached_notes()?;
    let rendered = render_notes_export(&notes, format.into())?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}
