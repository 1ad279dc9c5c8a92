//! The `settings` command.

use crate::args::SettingsArgs;
use crate::commands::Out;
use crate::config::{SettingsSummary, SettingsUpdate};
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use std::fmt::Write;

/// Applies any settings given in `args`, then shows the effective settings. The token is never
/// shown, only whether one is available.
pub async fn settings(mut config: Config, args: SettingsArgs) -> Result<Out<SettingsSummary>> {
    let update = SettingsUpdate {
        backend: args.backend,
        owner: args.owner,
        repo: args.repo,
        branch: args.branch,
        data_dir: args.data_dir,
        proxy_url: args.proxy_url,
        backup_copies: args.backup_copies,
        history_display: args.history_display,
        currency: args.currency,
        request_timeout_secs: args.request_timeout_secs,
    };
    let mut changed = false;
    if let Some(token) = &args.token {
        config.save_token(token).await.pub_result(ErrorType::Storage)?;
        changed = true;
    }
    if !update.is_empty() {
        config.update(&update).await.pub_result(ErrorType::Config)?;
        changed = true;
    }

    let summary = config.summary().await.pub_result(ErrorType::Storage)?;
    let message = if changed {
        "Saved the settings"
    } else {
        ""
    };
    let view = summary_text(&summary);
    Ok(Out::new(message, summary).with_view(view))
}

fn summary_text(s: &SettingsSummary) -> String {
    let mut out = String::new();
    let rows = [
        ("home", s.home.display().to_string()),
        ("backend", s.backend.to_string()),
        ("owner", s.owner.clone()),
        ("repo", s.repo.clone()),
        ("branch", s.branch.clone()),
        ("data_dir", s.data_dir.clone()),
        ("proxy_url", s.proxy_url.clone().unwrap_or_default()),
        ("token", if s.token_set { "set" } else { "not set" }.to_string()),
        ("backup_copies", s.backup_copies.to_string()),
        ("history_display", s.history_display.to_string()),
        ("currency", s.currency.clone()),
        ("request_timeout_secs", s.request_timeout_secs.to_string()),
    ];
    for (name, value) in rows {
        let _ = writeln!(out, "{name:<21}{value}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Backend;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_settings_update_and_show() {
        let env = TestEnv::new().await;
        let args = SettingsArgs {
            backend: Some(Backend::Github),
            owner: Some("someone".to_string()),
            token: Some("ghp_secret".to_string()),
            ..SettingsArgs::default()
        };
        let out = settings(env.config(), args).await.unwrap();
        assert_eq!(out.message(), "Saved the settings");
        let summary = out.structure().unwrap();
        assert_eq!(summary.backend, Backend::Github);
        assert_eq!(summary.owner, "someone");
        assert!(summary.token_set);
        let view = out.view().unwrap();
        assert!(view
            .lines()
            .any(|l| l.split_whitespace().eq(["token", "set"])));
        assert!(!view.contains("ghp_secret"));

        let reloaded = Config::load(env.config().root()).await.unwrap();
        assert_eq!(reloaded.owner(), "someone");
        assert_eq!(reloaded.token().await.unwrap().as_deref(), Some("ghp_secret"));
    }

    #[tokio::test]
    async fn test_show_only() {
        let env = TestEnv::new().await;
        let out = settings(env.config(), SettingsArgs::default())
            .await
            .unwrap();
        assert!(out.message().is_empty());
        assert_eq!(out.structure().unwrap().currency, "₹");
    }
}
