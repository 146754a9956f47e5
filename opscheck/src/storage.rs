//! Cloud-storage provider setup for `opscheck storage`.

use std::time::Instant;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::record::ResultRecord;
use crate::io::config::StorageProvider;
use crate::io::http::{HttpMethod, HttpProbe};

const ENV_TEMPLATE: &str = include_str!("templates/storage.env.j2");

/// OAuth redirect target registered with each provider.
pub fn callback_url(base_url: &str, provider_id: &str) -> String {
    format!(
        "{}/api/cloud-storage/{provider_id}/callback",
        base_url.trim_end_matches('/')
    )
}

pub fn status_path(provider_id: &str) -> String {
    format!("/api/cloud-storage/providers/{provider_id}/status")
}

/// One record per provider.
///
/// `env` resolves variable names; an unset or blank value fails the
/// provider. With a probe, the server must also report the provider.
#[instrument(skip_all, fields(providers = providers.len(), probed = http.is_some()))]
pub fn provider_status(
    providers: &[StorageProvider],
    env: impl Fn(&str) -> Option<String>,
    http: Option<&HttpProbe>,
) -> Vec<ResultRecord> {
    providers
        .iter()
        .map(|provider| {
            let started = Instant::now();
            check_provider(provider, &env, http).with_duration(started.elapsed())
        })
        .collect()
}

fn check_provider(
    provider: &StorageProvider,
    env: &impl Fn(&str) -> Option<String>,
    http: Option<&HttpProbe>,
) -> ResultRecord {
    let name = provider.display_name.as_str();
    let missing: Vec<&str> = provider
        .env
        .iter()
        .map(String::as_str)
        .filter(|var| env(*var).is_none_or(|value| value.trim().is_empty()))
        .collect();
    if !missing.is_empty() {
        return ResultRecord::fail(name).with_detail(format!("missing {}", missing.join(", ")));
    }
    let Some(probe) = http else {
        return ResultRecord::pass(name).with_detail("credentials set (server not probed)");
    };

    let path = status_path(&provider.id);
    match probe.request(HttpMethod::Get, &path, None) {
        Ok(response) if response.status == 200 => {
            ResultRecord::pass(name).with_detail("credentials set, server ready")
        }
        Ok(response) if response.status == 404 => {
            ResultRecord::warn(name).with_detail("not registered on server")
        }
        Ok(response) => {
            ResultRecord::fail(name).with_detail(format!("GET {path} -> {}", response.status))
        }
        Err(err) => {
            debug!(provider = %provider.id, err = %format!("{err:#}"), "status probe failed");
            ResultRecord::fail(name).with_detail(format!("{err:#}"))
        }
    }
}

#[derive(Serialize)]
struct ProviderView<'a> {
    display_name: &'a str,
    env: &'a [String],
    callback_url: String,
}

/// `.env` snippet listing every provider's variables and callback URL.
pub fn render_env_template(providers: &[StorageProvider], base_url: &str) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("storage.env", ENV_TEMPLATE)
        .context("load storage env template")?;
    let views: Vec<ProviderView<'_>> = providers
        .iter()
        .map(|provider| ProviderView {
            display_name: &provider.display_name,
            env: &provider.env,
            callback_url: callback_url(base_url, &provider.id),
        })
        .collect();
    let rendered = env
        .get_template("storage.env")
        .context("load storage env template")?
        .render(context! {
            base_url => base_url.trim_end_matches('/'),
            providers => views,
        })
        .context("render storage env template")?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::CheckStatus;
    use crate::io::config::StorageConfig;
    use mockito::Server;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    fn providers() -> Vec<StorageProvider> {
        StorageConfig::default().providers
    }

    #[test]
    fn missing_env_fails_provider() {
        let records = provider_status(
            &providers()[..2],
            lookup(&[
                ("GOOGLE_CLIENT_ID", "id"),
                ("GOOGLE_CLIENT_SECRET", "secret"),
                ("DROPBOX_APP_KEY", " "),
            ]),
            None,
        );
        assert_eq!(records[0].status, CheckStatus::Pass);
        assert_eq!(records[1].status, CheckStatus::Fail);
        assert_eq!(
            records[1].detail.as_deref(),
            Some("missing DROPBOX_APP_KEY, DROPBOX_APP_SECRET")
        );
    }

    #[test]
    fn server_status_decides_outcome() {
        let mut server = Server::new();
        let ready = server
            .mock("GET", "/api/cloud-storage/providers/google_drive/status")
            .with_status(200)
            .create();
        let unknown = server
            .mock("GET", "/api/cloud-storage/providers/dropbox/status")
            .with_status(404)
            .create();
        let probe = HttpProbe::new(&server.url(), Duration::from_secs(5)).expect("probe");
        let env = lookup(&[
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("DROPBOX_APP_KEY", "key"),
            ("DROPBOX_APP_SECRET", "secret"),
        ]);

        let records = provider_status(&providers()[..2], env, Some(&probe));
        ready.assert();
        unknown.assert();
        assert_eq!(records[0].status, CheckStatus::Pass);
        assert_eq!(records[1].status, CheckStatus::Warn);
        assert_eq!(records[1].detail.as_deref(), Some("not registered on server"));
    }

    #[test]
    fn env_template_lists_vars_and_callbacks() {
        let rendered =
            render_env_template(&providers(), "https://rur2.example.com/").expect("render");
        assert!(rendered.contains("# Google Drive"));
        assert!(rendered.contains("GOOGLE_CLIENT_ID="));
        assert!(rendered.contains("BOX_CLIENT_SECRET="));
        assert!(
            rendered.contains("https://rur2.example.com/api/cloud-storage/onedrive/callback")
        );
    }
}
