//! HTTP bridge backend.
//!
//! Forwards each request to an external llama-server-compatible
//! completion service. The classic `/completion` endpoint is tried
//! first; on any failure the OpenAI-style `/v1/completions` shape is
//! retried once before giving up. The service owns the model, so
//! `load_model` is a no-op. The response text is re-chunked into
//! fixed-size pieces to mimic streaming toward the client.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{BackendError, Result};
use crate::{Backend, InferRequest, InferResult};

const FALLBACK_ENDPOINT: &str = "/v1/completions";

/// JSON keys tried, in order, when extracting the completion text.
const TEXT_KEYS: [&str; 4] = ["content", "response", "completion", "text"];

#[derive(Debug, Clone)]
pub struct LlamaHttpOptions {
    pub base_url: String,
    /// Primary endpoint path (llama.cpp classic)
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Size of the pieces the response text is re-chunked into
    pub chunk_bytes: usize,
}

impl Default for LlamaHttpOptions {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            endpoint: "/completion".to_string(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(600),
            chunk_bytes: 4096,
        }
    }
}

/// Request body for the classic llama.cpp completion endpoint.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    stream: bool,
}

/// OpenAI-style request body used for the fallback endpoint.
#[derive(Debug, Serialize)]
struct OpenAiCompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    stream: bool,
}

pub struct LlamaHttpBackend {
    opts: LlamaHttpOptions,
    client: Option<reqwest::blocking::Client>,
}

impl LlamaHttpBackend {
    pub fn new(opts: LlamaHttpOptions) -> Self {
        Self { opts, client: None }
    }

    pub fn options(&self) -> &LlamaHttpOptions {
        &self.opts
    }

    fn call(
        &self,
        client: &reqwest::blocking::Client,
        path: &str,
        body: &impl Serialize,
    ) -> Result<(String, u32)> {
        let url = join_url(&self.opts.base_url, path);
        let resp = client.post(&url).json(body).send()?;
        let status = resp.status();
        let body_text = resp.text()?;

        if !status.is_success() {
            return Err(BackendError::Service {
                status: status.as_u16(),
                body: truncate(&body_text, 200),
            });
        }

        let value: Value =
            serde_json::from_str(&body_text).map_err(|_| BackendError::UnexpectedSchema)?;
        let text = extract_text(&value).ok_or(BackendError::UnexpectedSchema)?;
        let tokens = extract_tokens(&value);
        Ok((text, tokens))
    }
}

impl Backend for LlamaHttpBackend {
    fn init(&mut self) -> Result<()> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(self.opts.connect_timeout)
            .timeout(self.opts.request_timeout)
            .build()
            .map_err(|e| BackendError::Setup(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    fn load_model(&mut self, _path: Option<&Path>, _context_size: u32, _threads: u32) -> Result<()> {
        // The completion service already owns the model.
        Ok(())
    }

    fn infer_stream(
        &mut self,
        req: &InferRequest,
        on_chunk: &mut dyn FnMut(&str),
    ) -> Result<InferResult> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| BackendError::Setup("backend not initialized".to_string()))?;
        let start = Instant::now();

        let primary_body = CompletionRequest {
            prompt: &req.prompt,
            n_predict: req.max_tokens,
            stream: false,
        };
        let (text, tokens) = match self.call(client, &self.opts.endpoint, &primary_body) {
            Ok(out) => out,
            Err(primary) => {
                debug!(error = %primary, "primary endpoint failed, trying fallback");
                let fallback_body = OpenAiCompletionRequest {
                    model: "",
                    prompt: &req.prompt,
                    max_tokens: req.max_tokens,
                    stream: false,
                };
                match self.call(client, FALLBACK_ENDPOINT, &fallback_body) {
                    Ok(out) => out,
                    Err(fallback) => {
                        return Err(BackendError::FallbackExhausted {
                            primary: primary.to_string(),
                            fallback: fallback.to_string(),
                        })
                    }
                }
            }
        };

        for piece in chunk_text(&text, self.opts.chunk_bytes) {
            on_chunk(piece);
        }

        Ok(InferResult {
            tokens,
            elapsed_us: start.elapsed().as_micros() as u64,
            text,
        })
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Pull the completion text out of whichever schema the service used.
fn extract_text(value: &Value) -> Option<String> {
    for key in TEXT_KEYS {
        if let Some(s) = value.get(key).and_then(Value::as_str) {
            return Some(s.to_string());
        }
    }
    // OpenAI-style: choices[0].text
    value
        .get("choices")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

/// Token count when the service reports one, else 0.
fn extract_tokens(value: &Value) -> u32 {
    value
        .get("tokens_predicted")
        .and_then(Value::as_u64)
        .or_else(|| {
            value
                .pointer("/usage/completion_tokens")
                .and_then(Value::as_u64)
        })
        .unwrap_or(0) as u32
}

/// Split text into pieces of at most `chunk_bytes`, never inside a
/// UTF-8 sequence.
fn chunk_text(text: &str, chunk_bytes: usize) -> Vec<&str> {
    let chunk_bytes = chunk_bytes.max(4);
    let mut out = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + chunk_bytes).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        out.push(&text[start..end]);
        start = end;
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://127.0.0.1:8080", "/completion"),
            "http://127.0.0.1:8080/completion"
        );
        assert_eq!(
            join_url("http://127.0.0.1:8080/", "/completion"),
            "http://127.0.0.1:8080/completion"
        );
        assert_eq!(join_url("http://h", "v1/x"), "http://h/v1/x");
    }

    #[test]
    fn test_extract_text_key_order() {
        // llama.cpp classic
        assert_eq!(
            extract_text(&json!({"content": "a"})).as_deref(),
            Some("a")
        );
        // "content" wins over later keys
        assert_eq!(
            extract_text(&json!({"text": "b", "content": "a"})).as_deref(),
            Some("a")
        );
        assert_eq!(
            extract_text(&json!({"response": "r"})).as_deref(),
            Some("r")
        );
        // OpenAI-style nesting
        assert_eq!(
            extract_text(&json!({"choices": [{"text": "c"}]})).as_deref(),
            Some("c")
        );
        assert_eq!(extract_text(&json!({"unrelated": 1})), None);
    }

    #[test]
    fn test_extract_tokens() {
        assert_eq!(extract_tokens(&json!({"tokens_predicted": 17})), 17);
        assert_eq!(
            extract_tokens(&json!({"usage": {"completion_tokens": 9}})),
            9
        );
        assert_eq!(extract_tokens(&json!({})), 0);
    }

    #[test]
    fn test_chunk_text_exact_and_remainder() {
        let text = "abcdefgh";
        assert_eq!(chunk_text(text, 4), vec!["abcd", "efgh"]);
        assert_eq!(chunk_text("abcdefghi", 4), vec!["abcd", "efgh", "i"]);
        assert!(chunk_text("", 4).is_empty());
    }

    #[test]
    fn test_chunk_text_respects_utf8_boundaries() {
        let text = "aé".repeat(10); // 'é' is 2 bytes
        let pieces = chunk_text(&text, 4);
        assert_eq!(pieces.concat(), text);
        assert!(pieces.iter().all(|p| p.len() <= 4));
    }
}
