//! Listing commands for libraries and scheduled tasks.

use crate::app::App;
use crate::models::task::TaskStatus;
use crate::store::{EpisodeRepository, LibraryRepository, MovieRepository, TaskRepository};
use crate::Result;
use chrono::{DateTime, Local, Utc};
use colored::Colorize;

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// List scheduled tasks with their run state.
pub async fn list_tasks(app: &App) -> Result<()> {
    println!("{}", "⏱ Scheduled tasks".bold().cyan());
    println!();

    let tasks = app.store.list_tasks().await?;
    if tasks.is_empty() {
        println!("No tasks registered.");
        return Ok(());
    }

    println!(
        "{:<18} {:<9} {:<9} {:<8} {:<17} {}",
        "Name".bold(),
        "Type".bold(),
        "Status".bold(),
        "Every".bold(),
        "Last run".bold(),
        "Next run".bold()
    );
    println!("{}", "-".repeat(80));

    for task in tasks {
        let status = match task.status {
            _ if !task.enabled => "disabled".dimmed(),
            TaskStatus::Idle => "idle".green(),
            TaskStatus::Running => "running".cyan(),
            TaskStatus::Failed => "failed".red(),
        };
        println!(
            "{:<18} {:<9} {:<9} {:<8} {:<17} {}",
            task.name,
            task.task_type,
            status,
            task.interval,
            format_time(task.last_run),
            format_time(task.next_run)
        );
    }

    Ok(())
}

/// List libraries with their roots and item counts.
pub async fn list_libraries(app: &App) -> Result<()> {
    println!("{}", "📚 Libraries".bold().cyan());
    println!();

    let libraries = app.store.list_libraries().await?;
    if libraries.is_empty() {
        println!("No libraries configured.");
        return Ok(());
    }

    for library in libraries {
        let movies = app.store.list_movies(library.id).await?.len();
        let episodes = app.store.list_episodes(library.id).await?.len();

        println!(
            "{} ({}, auto-scan: {})",
            library.name.bold(),
            library.kind,
            if library.auto_scan { "on" } else { "off" }
        );
        for path in &library.paths {
            let marker = if path.enabled { "•".green() } else { "•".dimmed() };
            println!("  {} {}", marker, path.path.display());
        }
        println!(
            "  {} movies, {} episodes, last scanned {}",
            movies,
            episodes,
            format_time(library.last_scanned)
        );
        println!();
    }

    Ok(())
}
