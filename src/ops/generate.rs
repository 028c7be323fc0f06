use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Retries attempted after a transient failure (3 tries total).
const MAX_RETRIES: u32 = 2;
/// Linear backoff unit: attempt N sleeps N seconds before retrying.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);
/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Minimum spacing enforced between generation requests.
pub const THROTTLE_INTERVAL: Duration = Duration::from_millis(2000);

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    prompt: &'a str,
    drawing_data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_api_key: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefineRequest<'a> {
    prompt: &'a str,
    image_data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_api_key: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConvertRequest<'a> {
    image_data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    image_data: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ============================================================================
// ERRORS
// ============================================================================

/// Failure modes of a generation request, in the order the UI cares about
/// them: quota problems open the API-key dialog, everything else lands in
/// the error banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// Rate limit or exhausted quota; the user may supply their own key.
    Quota(String),
    /// The service answered with an error payload.
    Api(String),
    /// The request never completed (connect, timeout, transport).
    Network(String),
    /// The service answered but the payload was unusable.
    Decode(String),
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateError::Quota(msg) => write!(f, "Quota exceeded: {}", msg),
            GenerateError::Api(msg) => write!(f, "Generation failed: {}", msg),
            GenerateError::Network(msg) => write!(f, "Network error: {}", msg),
            GenerateError::Decode(msg) => write!(f, "Bad response: {}", msg),
        }
    }
}

impl std::error::Error for GenerateError {}

impl GenerateError {
    /// Quota failures prompt for a personal API key instead of showing the
    /// generic error banner.
    pub fn needs_api_key(&self) -> bool {
        matches!(self, GenerateError::Quota(_))
    }
}

/// Failures worth retrying: transport blips and server-side congestion.
pub fn is_transient(message: &str) -> bool {
    const TRANSIENT_MARKERS: &[&str] = &[
        "timeout",
        "network",
        "econnreset",
        "rate limit",
        "503",
        "500",
        "overloaded",
        "connection",
    ];
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Map an HTTP status and error text onto a [`GenerateError`].  429 and
/// quota-flavored messages become [`GenerateError::Quota`].
pub fn classify_failure(status: u16, message: &str) -> GenerateError {
    let lower = message.to_lowercase();
    if status == 429 || lower.contains("quota") || lower.contains("rate limit") {
        return GenerateError::Quota(message.to_string());
    }
    GenerateError::Api(message.to_string())
}

// ============================================================================
// CLIENT
// ============================================================================

/// Blocking HTTP client for the render service.  Cheap to clone; worker
/// threads take a clone per job.
#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl GenerationClient {
    pub fn new(base_url: &str) -> Result<Self, String> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Render a sketch.  `drawing_data` is the base64 upload produced by
    /// `io::compress_for_upload`; the returned bytes are the decoded image.
    pub fn generate(
        &self,
        prompt: &str,
        drawing_data: &str,
        api_key: Option<&str>,
    ) -> Result<Vec<u8>, GenerateError> {
        let body = GenerateRequest {
            prompt,
            drawing_data,
            custom_api_key: api_key,
        };
        self.post_with_retry("generate", &body, MAX_RETRIES)
    }

    /// Re-render a previous output with an adjusted prompt.
    pub fn refine(
        &self,
        prompt: &str,
        image_data: &str,
        api_key: Option<&str>,
    ) -> Result<Vec<u8>, GenerateError> {
        let body = RefineRequest {
            prompt,
            image_data,
            custom_api_key: api_key,
        };
        // Refinement is never retried; the user re-triggers it explicitly.
        self.post_with_retry("refine", &body, 0)
    }

    /// Turn an imported photo into a line-drawing doodle.
    pub fn convert_to_doodle(
        &self,
        image_data: &str,
        api_key: Option<&str>,
    ) -> Result<Vec<u8>, GenerateError> {
        let body = ConvertRequest {
            image_data,
            custom_api_key: api_key,
        };
        self.post_with_retry("convert-to-doodle", &body, MAX_RETRIES)
    }

    fn post_with_retry<T: Serialize>(
        &self,
        endpoint: &str,
        body: &T,
        max_retries: u32,
    ) -> Result<Vec<u8>, GenerateError> {
        let url = format!("{}/api/{}", self.base_url, endpoint);
        let mut attempt = 0;
        loop {
            match self.post_once(&url, body) {
                Ok(bytes) => return Ok(bytes),
                Err(err) => {
                    let retryable = match &err {
                        GenerateError::Network(msg) | GenerateError::Api(msg) => is_transient(msg),
                        GenerateError::Quota(_) | GenerateError::Decode(_) => false,
                    };
                    if !retryable || attempt >= max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    crate::log_warn!(
                        "generate: attempt {} against {} failed ({}), retrying",
                        attempt,
                        endpoint,
                        err
                    );
                    std::thread::sleep(RETRY_BACKOFF * attempt);
                }
            }
        }
    }

    fn post_once<T: Serialize>(&self, url: &str, body: &T) -> Result<Vec<u8>, GenerateError> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .map_err(|e| GenerateError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let parsed: ApiResponse = response
            .json()
            .map_err(|e| GenerateError::Decode(e.to_string()))?;

        if !parsed.success || status >= 400 {
            let message = parsed
                .error
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(classify_failure(status, &message));
        }
        let Some(image_data) = parsed.image_data else {
            return Err(GenerateError::Decode(
                "response missing image data".to_string(),
            ));
        };
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD
            .decode(image_data.trim())
            .map_err(|e| GenerateError::Decode(format!("invalid base64 image: {}", e)))
    }
}

// ============================================================================
// THROTTLE
// ============================================================================

/// Spaces generation requests at least [`THROTTLE_INTERVAL`] apart.  The
/// first auto-triggered request after an import bypasses the interval once.
pub struct RequestThrottle {
    last: Option<Instant>,
    bypass_once: bool,
}

impl Default for RequestThrottle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestThrottle {
    pub fn new() -> Self {
        Self {
            last: None,
            bypass_once: false,
        }
    }

    /// Arm a one-shot bypass so the next admission skips the interval check.
    pub fn arm_bypass(&mut self) {
        self.bypass_once = true;
    }

    /// Decide whether a request may go out at `now`.  Admitted requests
    /// reset the interval; rejected ones leave it untouched.
    pub fn admit(&mut self, now: Instant) -> bool {
        if self.bypass_once {
            self.bypass_once = false;
            self.last = Some(now);
            return true;
        }
        match self.last {
            Some(prev) if now.duration_since(prev) < THROTTLE_INTERVAL => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
