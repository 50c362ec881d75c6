//! Fetch raw page markup over HTTP.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use pagegraph_shared::{CaptureConfig, PipelineError, Result};

/// Build the HTTP client used for captures.
pub fn client(config: &CaptureConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| PipelineError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET `url` and return its body. Non-2xx responses are errors.
#[instrument(skip(config))]
pub async fn fetch_page(url: &str, config: &CaptureConfig) -> Result<String> {
    let client = client(config)?;
    fetch_with(&client, url).await
}

/// [`fetch_page`] with a caller-supplied client.
pub async fn fetch_with(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| PipelineError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PipelineError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| PipelineError::Network(format!("{url}: {e}")))?;
    debug!(%url, bytes = body.len(), "page captured");
    Ok(body)
}
