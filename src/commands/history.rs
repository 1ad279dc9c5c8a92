use crate::args::HistoryArgs;
use crate::commands::{read_session, write_session, Out};
use crate::render;
use crate::{Config, Result};

/// Shows the newest history entries, or erases the history with `--clear`.
pub async fn history(
    config: Config,
    user: Option<&str>,
    args: HistoryArgs,
) -> Result<Out<Vec<String>>> {
    if args.clear {
        let session = write_session(&config, user).await?;
        let count = session.clear_history().await?;
        return Ok(format!("Cleared {count} history entries").into());
    }
    let session = read_session(&config, user).await?;
    let limit = args.limit.unwrap_or_else(|| config.history_display());
    let lines: Vec<String> = session
        .record()
        .history()
        .iter()
        .take(limit)
        .map(ToString::to_string)
        .collect();
    let view = render::history_text(&lines);
    Ok(Out::new("", lines).with_view(view))
}
