use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use diary_core::service::Diary;

pub(crate) fn cmd_export(diary: &Diary, output: Option<&Path>) -> Result<()> {
    let bytes = diary.export_csv()?;

    if let Some(path) = output {
        std::fs::write(path, &bytes)
            .with_context(|| format!("Failed to write export: {}", path.display()))?;
        eprintln!(
            "Exported {} records to {}",
            diary.records().len(),
            path.display()
        );
    } else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&bytes)?;
        stdout.flush()?;
    }

    Ok(())
}

pub(crate) fn cmd_import(diary: &mut Diary, path: &Path, json: bool) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let summary = diary.import_csv(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if summary.rows_parsed == 0 {
        eprintln!("No rows found in CSV file.");
    } else {
        println!("Import complete.\n");
        println!("  Rows parsed:  {}", summary.rows_parsed);
        println!("  New records:  {}", summary.inserted);
        println!("  Overwritten:  {}", summary.updated);
        println!("  Skipped:      {}", summary.skipped);
    }

    Ok(())
}
