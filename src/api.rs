//! Gemini API request dispatcher.
//!
//! One dispatch is one complete request/response cycle against the
//! generative-language API. Retired "pro" model names are corrected
//! before the first attempt, and a 404 triggers exactly one retry
//! against the stable fallback model. Everything else surfaces once.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Model retried when a requested model is rejected with a 404.
pub const STABLE_FALLBACK_MODEL: &str = "gemini-2.5-flash";

/// Replacement for outdated "pro" model names.
pub const CURRENT_PRO_MODEL: &str = "gemini-2.5-pro";

/// Returned when a success body carries no text. Absence of content is
/// deliberately not an error here, so callers cannot tell a contentless
/// reply from a real one; kept as documented behavior.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "(no response)";

/// Dispatch failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Gemini API request failed with status {status}: {body}")]
    Http { status: u16, body: String },
    /// Transport failure. The request URL is stripped before wrapping:
    /// it carries the API key as a query parameter, and these messages
    /// reach stderr and the TUI status bar.
    #[error("Failed to reach the Gemini API: {0}")]
    Network(reqwest::Error),
    #[error("Failed to parse Gemini API response: {0}")]
    Parse(#[from] serde_json::Error),
}

fn network_error(e: reqwest::Error) -> DispatchError {
    DispatchError::Network(e.without_url())
}

/// Client for the Gemini generateContent endpoint.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a new client with the resolved API key.
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, API_BASE_URL.to_string())
    }

    /// Client pointed at an explicit endpoint. Everything the dispatcher
    /// needs arrives through here; nothing is read from the environment.
    fn with_base_url(api_key: String, base_url: String) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url,
            api_key,
        }
    }

    /// Send one prompt and return the reply text.
    ///
    /// The requested model name is corrected first (see
    /// [`correct_model_name`]); a 404 on a non-fallback model is retried
    /// once against [`STABLE_FALLBACK_MODEL`]. The attempt counter makes
    /// the bound explicit: no path issues more than two requests.
    pub async fn dispatch(&self, model: &str, prompt: &str) -> Result<String, DispatchError> {
        let mut model = correct_model_name(model);
        let mut attempts = 0u8;

        loop {
            attempts += 1;
            debug!("Dispatching to model {} (attempt {})", model, attempts);

            match self.attempt(&model, prompt).await {
                Err(DispatchError::Http { status, .. })
                    if attempts == 1 && fallback_model_for(status, &model).is_some() =>
                {
                    warn!(
                        "Model {} not found (status {}): retrying with {}",
                        model, status, STABLE_FALLBACK_MODEL
                    );
                    model = STABLE_FALLBACK_MODEL.to_string();
                }
                result => return result,
            }
        }
    }

    /// Issue a single request against one model, no retry policy.
    async fn attempt(&self, model: &str, prompt: &str) -> Result<String, DispatchError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Http { status, body });
        }

        let body = response.text().await.map_err(network_error)?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;

        Ok(extract_text(&parsed).unwrap_or_else(|| EMPTY_RESPONSE_PLACEHOLDER.to_string()))
    }
}

/// Correct retired "pro" model names before the first attempt.
///
/// A lower-cased name that is not the stable fallback and mentions "pro"
/// without "2.5" is rewritten to the current pro model.
pub fn correct_model_name(requested: &str) -> String {
    let lower = requested.to_lowercase();
    if lower != STABLE_FALLBACK_MODEL && lower.contains("pro") && !lower.contains("2.5") {
        CURRENT_PRO_MODEL.to_string()
    } else {
        requested.to_string()
    }
}

/// The one retry in the system: a 404 on anything other than the stable
/// fallback model retries against the fallback. A 404 on the fallback
/// itself, or any other status, gets no retry.
pub fn fallback_model_for(status: u16, attempted: &str) -> Option<&'static str> {
    if status == 404 && attempted != STABLE_FALLBACK_MODEL {
        Some(STABLE_FALLBACK_MODEL)
    } else {
        None
    }
}

/// Descend candidates[0] -> content -> parts[0] -> text.
fn extract_text(response: &GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .and_then(|c| c.parts.first())
        .and_then(|p| p.text.clone())
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;

    const STUB_REPLY_BODY: &str =
        r#"{"candidates":[{"content":{"parts":[{"text":"stub reply"}],"role":"model"}}]}"#;

    /// One-connection-per-response HTTP stub. Records the request path of
    /// each connection, answers with the next canned response, and closes.
    fn spawn_stub(responses: Vec<(u16, &'static str)>) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                tx.send(read_request_path(&mut stream)).unwrap();
                let reason = if status == 200 { "OK" } else { "Not Found" };
                let response = format!(
                    "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).unwrap();
            }
        });

        (base_url, rx)
    }

    /// Read one full request (headers plus content-length body) and
    /// return its path.
    fn read_request_path(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&data[..pos]).to_string();
                let content_length = headers
                    .lines()
                    .find_map(|line| {
                        line.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .and_then(|v| v.trim().parse::<usize>().ok())
                    })
                    .unwrap_or(0);
                if data.len() >= pos + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data)
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn test_dispatch_retries_404_once_and_returns_retry_result() {
        let (base_url, requests) =
            spawn_stub(vec![(404, r#"{"error":"unknown model"}"#), (200, STUB_REPLY_BODY)]);
        let client = GeminiClient::with_base_url("test-key".to_string(), base_url);

        let reply = client.dispatch("gemini-1.5-flash", "hi").await.unwrap();
        assert_eq!(reply, "stub reply");

        let paths: Vec<String> = requests.try_iter().collect();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].starts_with("/gemini-1.5-flash:generateContent"));
        assert!(paths[1].starts_with("/gemini-2.5-flash:generateContent"));
    }

    #[tokio::test]
    async fn test_dispatch_404_on_fallback_model_is_terminal() {
        let (base_url, requests) = spawn_stub(vec![(404, r#"{"error":"unknown model"}"#)]);
        let client = GeminiClient::with_base_url("test-key".to_string(), base_url);

        let err = client
            .dispatch(STABLE_FALLBACK_MODEL, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Http { status: 404, .. }));
        assert_eq!(requests.try_iter().count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_corrects_model_in_outbound_request() {
        let (base_url, requests) = spawn_stub(vec![(200, STUB_REPLY_BODY)]);
        let client = GeminiClient::with_base_url("test-key".to_string(), base_url);

        let reply = client.dispatch("gemini-pro", "hi").await.unwrap();
        assert_eq!(reply, "stub reply");

        let paths: Vec<String> = requests.try_iter().collect();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].starts_with("/gemini-2.5-pro:generateContent"));
    }

    #[tokio::test]
    async fn test_network_error_message_omits_key() {
        // Bind then drop to get a port nothing is listening on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = GeminiClient::with_base_url(
            "very-secret-key".to_string(),
            format!("http://127.0.0.1:{}", port),
        );

        let err = client
            .dispatch(STABLE_FALLBACK_MODEL, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Network(_)));
        assert!(!err.to_string().contains("very-secret-key"));
    }

    #[test]
    fn test_outdated_pro_name_is_corrected() {
        assert_eq!(correct_model_name("gemini-pro"), CURRENT_PRO_MODEL);
        assert_eq!(correct_model_name("gemini-1.5-pro"), CURRENT_PRO_MODEL);
        assert_eq!(correct_model_name("GEMINI-PRO"), CURRENT_PRO_MODEL);
    }

    #[test]
    fn test_current_names_pass_through() {
        assert_eq!(correct_model_name("gemini-2.5-pro"), "gemini-2.5-pro");
        assert_eq!(correct_model_name("gemini-2.5-flash"), "gemini-2.5-flash");
        assert_eq!(correct_model_name("gemini-1.5-flash"), "gemini-1.5-flash");
    }

    #[test]
    fn test_404_on_other_model_falls_back() {
        assert_eq!(
            fallback_model_for(404, "gemini-1.5-flash"),
            Some(STABLE_FALLBACK_MODEL)
        );
        assert_eq!(
            fallback_model_for(404, CURRENT_PRO_MODEL),
            Some(STABLE_FALLBACK_MODEL)
        );
    }

    #[test]
    fn test_404_on_fallback_model_is_terminal() {
        assert_eq!(fallback_model_for(404, STABLE_FALLBACK_MODEL), None);
    }

    #[test]
    fn test_non_404_is_never_retried() {
        assert_eq!(fallback_model_for(500, "gemini-1.5-flash"), None);
        assert_eq!(fallback_model_for(429, "gemini-pro"), None);
        assert_eq!(fallback_model_for(401, STABLE_FALLBACK_MODEL), None);
    }

    #[test]
    fn test_extract_text_happy_path() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "hello there"}], "role": "model"}}
            ]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        assert_eq!(extract_text(&parsed), Some("hello there".to_string()));
    }

    #[test]
    fn test_extract_text_missing_links_yield_none() {
        for body in [
            r#"{}"#,
            r#"{"candidates": []}"#,
            r#"{"candidates": [{}]}"#,
            r#"{"candidates": [{"content": {"parts": []}}]}"#,
            r#"{"candidates": [{"content": {"parts": [{}]}}]}"#,
        ] {
            let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
            assert_eq!(extract_text(&parsed), None, "body: {}", body);
        }
    }

    #[test]
    fn test_malformed_body_is_a_parse_error() {
        let err = serde_json::from_str::<GenerateContentResponse>("not json").unwrap_err();
        let err: DispatchError = err.into();
        assert!(matches!(err, DispatchError::Parse(_)));
    }
}
