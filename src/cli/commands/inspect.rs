//! Single-file inspection commands.

use crate::app::App;
use crate::core::parser::{self, FileKind};
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// Probe a file and print its technical metadata as JSON.
pub async fn probe(app: &App, file: &Path) -> Result<()> {
    if !file.is_file() {
        return Err(crate::Error::PathNotFound(file.display().to_string()));
    }

    let report = app.ffprobe.probe(file).await?;
    if let Some(err) = &report.soft_error {
        eprintln!("{} {}", "[WARN]".yellow(), err);
    }
    for warning in &report.metadata.warnings {
        eprintln!("{} {}", "[WARN]".yellow(), warning);
    }

    println!("{}", serde_json::to_string_pretty(&report.metadata)?);
    Ok(())
}

/// Show how the filename heuristics read a path.
pub fn parse(file: &Path) -> Result<()> {
    if parser::classify_file(file) == FileKind::Ignored {
        println!("{} not a video file, or a sample/extra", "Ignored:".yellow());
        return Ok(());
    }

    if parser::looks_like_series_episode(file) {
        let info = parser::parse_series_episode(file);
        println!("{} episode", "Kind:".bold());
        println!("{} {}", "Series:".bold(), info.title);
        if info.is_parsed() {
            println!(
                "{} S{:02}E{:02}",
                "Episode:".bold(),
                info.season,
                info.episode
            );
        } else {
            println!("{} {}", "Episode:".bold(), "unrecognised, would be skipped".red());
        }
    } else {
        let info = parser::parse_movie(file);
        println!("{} movie", "Kind:".bold());
        println!("{} {}", "Title:".bold(), info.title);
        match info.year {
            Some(year) => println!("{} {}", "Year:".bold(), year),
            None => println!("{} -", "Year:".bold()),
        }
    }

    Ok(())
}
