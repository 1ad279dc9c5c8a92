//! Task commands. Tasks are addressed by the id shown in `finsight task list`.

use crate::args::{IdArgs, ListArgs, TaskAddArgs, TaskEditArgs};
use crate::commands::{read_session, write_session, Out};
use crate::error::{ErrorType, IntoResult};
use crate::model::Task;
use crate::render::{self, OutputFormat, TaskRow};
use crate::session::DueEdit;
use crate::{Config, Result};
use anyhow::{anyhow, Context};
use chrono::Utc;

pub async fn task_add(config: Config, user: Option<&str>, args: TaskAddArgs) -> Result<Out<Task>> {
    let session = write_session(&config, user).await?;
    let task = session.add_task(&args.text, args.due).await?;
    Ok(Out::new(
        format!("Added task '{}' ({})", task.text(), task.id()),
        task,
    ))
}

/// Changes a task's text and due date. `--clear-due` removes the due date.
pub async fn task_edit(
    config: Config,
    user: Option<&str>,
    args: TaskEditArgs,
) -> Result<Out<Task>> {
    let due = match (args.due, args.clear_due) {
        (Some(date), _) => DueEdit::Set(date),
        (None, true) => DueEdit::Clear,
        (None, false) => DueEdit::Keep,
    };
    let session = write_session(&config, user).await?;
    let task = session
        .edit_task(&args.id, args.text.as_deref(), due)
        .await?;
    Ok(Out::new(format!("Updated task '{}'", task.text()), task))
}

pub async fn task_toggle(config: Config, user: Option<&str>, args: IdArgs) -> Result<Out<Task>> {
    let session = write_session(&config, user).await?;
    let task = session.toggle_task(&args.id).await?;
    let state = if task.done() { "done" } else { "not done" };
    Ok(Out::new(format!("Marked '{}' {state}", task.text()), task))
}

pub async fn task_delete(config: Config, user: Option<&str>, args: IdArgs) -> Result<Out<Task>> {
    let session = write_session(&config, user).await?;
    let task = session.delete_task(&args.id).await?;
    Ok(Out::new(format!("Deleted task '{}'", task.text()), task))
}

pub async fn task_clear(config: Config, user: Option<&str>) -> Result<Out<usize>> {
    let session = write_session(&config, user).await?;
    let count = session.clear_tasks().await?;
    Ok(Out::new(format!("Deleted {count} tasks"), count))
}

/// Lists the tasks with their overdue state as of now.
pub async fn task_list(
    config: Config,
    user: Option<&str>,
    args: ListArgs,
) -> Result<Out<Vec<TaskRow>>> {
    let session = read_session(&config, user).await?;
    let now = Utc::now();
    let rows: Vec<TaskRow> = session
        .record()
        .tasks()
        .iter()
        .map(|t| TaskRow::new(t, now))
        .collect();
    let view = match args.format {
        OutputFormat::Text => render::tasks_text(&rows),
        OutputFormat::Json => serde_json::to_string_pretty(&rows)
            .context("Unable to serialize the tasks")
            .pub_result(ErrorType::Validation)?,
        OutputFormat::Csv => {
            return Err(anyhow!("CSV output is only available for transactions"))
                .pub_result(ErrorType::Validation)
        }
    };
    Ok(Out::new("", rows).with_view(view))
}
