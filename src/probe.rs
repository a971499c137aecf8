// HTTP check of a deployed sample

use anyhow::{bail, Context, Result};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::exec::{CommandRunner, CommandSpec};

/// Delay between probe attempts
pub const PROBE_INTERVAL: Duration = Duration::from_secs(5);

pub fn identity_token_command() -> CommandSpec {
    CommandSpec::new("gcloud").args(["auth", "print-identity-token"])
}

/// Identity token for calling services that do not allow unauthenticated access
pub async fn identity_token(runner: &dyn CommandRunner) -> Result<String> {
    let cmd = identity_token_command();
    let output = runner
        .run(&cmd)
        .await?
        .check(&cmd)
        .context("Failed to get an identity token. Is gcloud authenticated?")?;
    Ok(output.stdout.trim().to_string())
}

/// Join the service URL and the request path without doubling slashes
pub fn probe_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Options for probing a service
pub struct ProbeOptions<'a> {
    pub url: &'a str,
    pub token: Option<&'a str>,
    pub timeout: Duration,
    pub interval: Duration,
}

/// Request `url` until it answers with a 2xx status or `timeout` runs out.
///
/// Returns the status code of the successful response.
pub async fn wait_until_ready(http_client: &Client, options: ProbeOptions<'_>) -> Result<u16> {
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let mut request = http_client.get(options.url);
        if let Some(token) = options.token {
            request = request.bearer_auth(token);
        }

        let last_error = match request.send().await {
            Ok(response) if response.status().is_success() => {
                let status = response.status().as_u16();
                info!(
                    "✓ {} answered {} after {} attempt(s)",
                    options.url, status, attempt
                );
                return Ok(status);
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                debug!("Probe attempt {} got {}: {}", attempt, status, body.trim());
                format!("HTTP {}", status)
            }
            Err(e) => {
                debug!("Probe attempt {} failed: {}", attempt, e);
                e.to_string()
            }
        };

        if start.elapsed() + options.interval > options.timeout {
            bail!(
                "{} not ready after {:?} ({} attempts): {}",
                options.url,
                start.elapsed(),
                attempt,
                last_error
            );
        }

        if attempt == 1 {
            warn!("{} not ready yet ({}), retrying", options.url, last_error);
        }
        tokio::time::sleep(options.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::RecordingRunner;
    use crate::exec::CommandOutput;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response per connection, in order
    async fn serve(responses: Vec<&'static str>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap();
                requests.push(String::from_utf8_lossy(&buf[..n]).into_owned());
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            requests
        });
        (format!("http://{}", addr), handle)
    }

    const OK: &str = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
    const UNAVAILABLE: &str =
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    #[test]
    fn test_probe_url() {
        assert_eq!(probe_url("https://a.run.app", "/"), "https://a.run.app/");
        assert_eq!(probe_url("https://a.run.app/", "/healthz"), "https://a.run.app/healthz");
        assert_eq!(probe_url("https://a.run.app", "api/v1"), "https://a.run.app/api/v1");
    }

    #[tokio::test]
    async fn test_retries_until_success_with_token() {
        let (base, server) = serve(vec![UNAVAILABLE, OK]).await;
        let url = probe_url(&base, "/healthz");

        let status = wait_until_ready(
            &Client::new(),
            ProbeOptions {
                url: &url,
                token: Some("secret-token"),
                timeout: Duration::from_secs(10),
                interval: Duration::from_millis(10),
            },
        )
        .await
        .unwrap();

        assert_eq!(status, 200);
        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].starts_with("GET /healthz "));
        assert!(requests[1]
            .to_lowercase()
            .contains("authorization: bearer secret-token"));
    }

    #[tokio::test]
    async fn test_gives_up_after_timeout() {
        let (base, _server) = serve(vec![UNAVAILABLE, UNAVAILABLE, UNAVAILABLE]).await;

        let err = wait_until_ready(
            &Client::new(),
            ProbeOptions {
                url: &base,
                token: None,
                timeout: Duration::from_millis(50),
                interval: Duration::from_millis(30),
            },
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("503"), "{}", err);
    }

    #[tokio::test]
    async fn test_identity_token() {
        let runner = RecordingRunner::new()
            .respond("print-identity-token", CommandOutput::ok("eyJhbGciOi.token\n"));
        assert_eq!(identity_token(&runner).await.unwrap(), "eyJhbGciOi.token");

        let runner = RecordingRunner::new().respond(
            "print-identity-token",
            CommandOutput::failed(1, "You do not currently have an active account"),
        );
        let err = identity_token(&runner).await.unwrap_err();
        assert!(format!("{:#}", err).contains("active account"));
    }
}
