//! Scheduler commands.

use crate::app::App;
use crate::core::scheduler::{LoadSummary, Scheduler};
use crate::models::task::TaskStatus;
use crate::store::Persist;
use crate::{Error, Result, ResultExt};
use colored::Colorize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Time given to running tasks after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Run the scheduler until Ctrl-C.
pub async fn run(app: &App) -> Result<()> {
    let mut scheduler = load(app).await?;
    if scheduler.task_names().is_empty() {
        println!("No tasks to run.");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    scheduler.start(&cancel);
    println!(
        "{} Scheduler running. Press Ctrl-C to stop.",
        "⏱".cyan()
    );

    tokio::signal::ctrl_c().await?;
    println!();
    println!("Stopping...");
    scheduler.shutdown(SHUTDOWN_GRACE).await;
    // Aborted tasks may have left changes unwritten
    app.store.flush().await.context("save store")?;
    Ok(())
}

/// Run one task now and report its final status.
pub async fn trigger(app: &App, name: &str) -> Result<()> {
    let scheduler = load(app).await?;

    println!("{} {}", "▶ Running task".bold().cyan(), name);
    match scheduler.trigger(name).await? {
        TaskStatus::Failed => Err(Error::other(format!("Task '{}' failed, see log", name))),
        status => {
            println!("{} Task '{}' is {}", "✅".green(), name, status);
            Ok(())
        }
    }
}

async fn load(app: &App) -> Result<Scheduler> {
    let mut scheduler = app.scheduler();
    let summary = scheduler.load_tasks().await?;
    print_summary(&summary);
    Ok(scheduler)
}

fn print_summary(summary: &LoadSummary) {
    for name in &summary.scheduled {
        println!("{} {}", "[OK]".green(), name.bold());
    }
    for name in &summary.disabled {
        println!("{} {}: disabled", "[--]".dimmed(), name.bold());
    }
    for name in &summary.unknown_type {
        println!(
            "{} {}: no executor for its task type",
            "[WARN]".yellow(),
            name.bold()
        );
    }
    for (name, error) in &summary.invalid {
        println!("{} {}: {}", "[FAIL]".red(), name.bold(), error);
    }
    println!();
}
