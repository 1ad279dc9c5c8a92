use crate::args::SummaryArgs;
use crate::commands::{read_session, Out};
use crate::error::{ErrorType, IntoResult};
use crate::render::{self, Dashboard, OutputFormat};
use crate::{Config, Result};
use anyhow::anyhow;
use chrono::Utc;

/// Renders the dashboard for the current user as text or JSON.
pub async fn summary(
    config: Config,
    user: Option<&str>,
    args: SummaryArgs,
) -> Result<Out<Dashboard>> {
    let session = read_session(&config, user).await?;
    let dashboard = render::dashboard(
        session.username(),
        &session.record(),
        Utc::now(),
        config.history_display(),
    );
    let view = match args.format {
        OutputFormat::Text => dashboard.to_text(config.currency()),
        OutputFormat::Json => dashboard.to_json().pub_result(ErrorType::Validation)?,
        OutputFormat::Csv => {
            return Err(anyhow!(
                "The summary is available as text or json. Try 'finsight txn list --format csv'"
            ))
            .pub_result(ErrorType::Validation)
        }
    };
    Ok(Out::new("", dashboard).with_view(view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{TxnAddArgs, UserArgs};
    use crate::commands::{register, txn_add};
    use crate::model::TxnType;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_summary() {
        let env = TestEnv::new().await;
        let config = env.config();
        register(config.clone(), UserArgs::new("arun")).await.unwrap();
        let args = TxnAddArgs {
            kind: TxnType::Expense,
            amount: "40".to_string(),
            category: Some("food".to_string()),
            date: None,
            note: None,
        };
        txn_add(config.clone(), Some("arun"), args).await.unwrap();

        let out = summary(config.clone(), Some("arun"), SummaryArgs::default())
            .await
            .unwrap();
        let dashboard = out.structure().unwrap();
        assert_eq!(dashboard.revision, 2);
        assert!(dashboard.finance.negative);
        let view = out.view().unwrap();
        assert!(view.contains("Welcome, arun"));
        assert!(view.contains("Expense by Category"));
        assert!(view.contains("₹-40.00"));

        let args = SummaryArgs {
            format: OutputFormat::Json,
        };
        let out = summary(config, Some("arun"), args).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(out.view().unwrap()).unwrap();
        assert_eq!(json["username"], "arun");
    }

    #[tokio::test]
    async fn test_unknown_user_shows_empty_dashboard() {
        let env = TestEnv::new().await;
        let out = summary(env.config(), Some("nobody"), SummaryArgs::default())
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().revision, 0);
    }
}
