pub mod middleware;

use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
    #[serde(default)]
    pub details: Vec<FirebaseErrorDetail>,
}

/// One entry of the `details` array. FCM reports its own error code
/// (`UNREGISTERED`, `INVALID_ARGUMENT`, ...) through the `FcmError` detail.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseErrorDetail {
    #[serde(rename = "@type")]
    pub type_url: Option<String>,
    pub error_code: Option<String>,
}

impl FirebaseErrorResponse {
    /// The most specific error code available: the FCM detail code, then the
    /// RPC status.
    pub fn error_code(&self) -> Option<&str> {
        self.error
            .details
            .iter()
            .find_map(|d| d.error_code.as_deref())
            .or(self.error.status.as_deref())
    }

    pub fn display_message(&self) -> String {
        match self.error_code() {
            Some(code) => format!("{}: {} (code: {})", code, self.error.message, self.error.code),
            None => format!("{} (code: {})", self.error.message, self.error.code),
        }
    }
}

pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<FirebaseErrorResponse>(&text) {
        Ok(error_resp) => error_resp.display_message(),
        Err(_) if text.is_empty() => format!("{}: {}", default_msg, status),
        Err(_) => format!("{} {}: {}", default_msg, status, text),
    }
}

/// Short, stable identifier for a device token, safe to put in logs.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

/// rustls 0.23 needs a process-level crypto provider when more than one
/// backend is linked in. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
