//! Blocking HTTP probes against the application server.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// User agent sent with every probe.
pub const USER_AGENT: &str = "opscheck";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// Status and body of a probe response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP client bound to the server's base URL.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    base_url: String,
}

impl HttpProbe {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send a request and return whatever status the server answered with.
    ///
    /// Only transport failures (refused connection, timeout) are errors.
    pub fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ProbeResponse> {
        self.send(method, path, &[], body)
    }

    /// `query` pairs are percent-encoded onto the URL.
    #[instrument(skip(self, body), fields(url = %self.url(path)))]
    fn send(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<ProbeResponse> {
        let url = self.url(path);
        let builder = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };
        let builder = if query.is_empty() {
            builder
        } else {
            builder.query(query)
        };
        let builder = match body {
            Some(body) => builder.json(body),
            None => builder,
        };
        let response = builder
            .send()
            .with_context(|| format!("{method} {url}"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .with_context(|| format!("read body of {method} {url}"))?;
        debug!(status, "probe response");
        Ok(ProbeResponse { status, body })
    }

    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(HttpMethod::Get, path, None)?;
        decode(path, response)
    }

    pub fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self.send(HttpMethod::Get, path, query, None)?;
        decode(path, response)
    }

    pub fn post_json<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T> {
        let response = self.request(HttpMethod::Post, path, Some(body))?;
        decode(path, response)
    }
}

fn decode<T: DeserializeOwned>(path: &str, response: ProbeResponse) -> Result<T> {
    if !(200..300).contains(&response.status) {
        bail!(
            "{path} answered {}: {}",
            response.status,
            response.body.trim()
        );
    }
    serde_json::from_str(&response.body).with_context(|| format!("parse json from {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[test]
    fn joins_paths_onto_base_url() {
        let probe = HttpProbe::new("http://localhost:5000/", Duration::from_secs(1)).expect("probe");
        assert_eq!(probe.url("/api/health"), "http://localhost:5000/api/health");
        assert_eq!(probe.url("api/health"), "http://localhost:5000/api/health");
    }

    #[test]
    fn request_reports_non_success_status_without_error() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/api/licenses")
            .with_status(401)
            .with_body("unauthorized")
            .create();

        let probe = HttpProbe::new(&server.url(), Duration::from_secs(5)).expect("probe");
        let response = probe
            .request(HttpMethod::Get, "/api/licenses", None)
            .expect("request");
        mock.assert();
        assert_eq!(response.status, 401);
        assert_eq!(response.body, "unauthorized");
    }

    #[test]
    fn get_json_rejects_error_status() {
        let mut server = Server::new();
        let _mock = server
            .mock("GET", "/api/onboarding/status")
            .with_status(500)
            .with_body("boom")
            .create();

        let probe = HttpProbe::new(&server.url(), Duration::from_secs(5)).expect("probe");
        let err = probe
            .get_json::<serde_json::Value>("/api/onboarding/status")
            .expect_err("500");
        assert!(err.to_string().contains("answered 500"));
    }

    #[test]
    fn connection_refused_is_error() {
        let probe = HttpProbe::new("http://127.0.0.1:9", Duration::from_secs(1)).expect("probe");
        assert!(probe.request(HttpMethod::Get, "/", None).is_err());
    }
}
