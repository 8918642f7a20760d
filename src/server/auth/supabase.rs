use anyhow::{anyhow, Context, Result};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;

/// Provider for which the authorize prompt forces the account chooser
/// instead of a full re-login
const ACCOUNT_CHOOSER_PROVIDER: &str = "google";

/// User object nested in the token exchange response
#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub user_metadata: Option<serde_json::Value>,
}

/// Decoded response from the Supabase PKCE token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: SupabaseUser,
}

/// Thin client for the Supabase GoTrue auth API
///
/// Supabase is an opaque external authority here: this client only builds the
/// authorize redirect and swaps an authorization code + PKCE verifier for
/// tokens. Token contents are never inspected locally.
pub struct SupabaseClient {
    base_url: String,
    anon_key: String,
    http_client: HttpClient,
}

impl SupabaseClient {
    pub fn new(base_url: String, anon_key: String) -> Result<Self> {
        let http_client = HttpClient::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for Supabase auth API")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            http_client,
        })
    }

    /// Build the provider-facing authorize URL for the PKCE flow
    ///
    /// `redirect_to` is where the provider sends the user back after consent
    /// (our /auth/callback, possibly carrying native-flow parameters).
    ///
    /// The prompt value is normalized per provider: Google renders a usable
    /// account chooser, everything else gets a forced fresh login.
    pub fn authorize_url(&self, provider: &str, redirect_to: &str, code_challenge: &str) -> String {
        let prompt = if provider == ACCOUNT_CHOOSER_PROVIDER {
            "select_account"
        } else {
            "login"
        };

        format!(
            "{}/auth/v1/authorize?provider={}&redirect_to={}&code_challenge={}&code_challenge_method=S256&flow_type=pkce&prompt={}",
            self.base_url,
            urlencoding::encode(provider),
            urlencoding::encode(redirect_to),
            urlencoding::encode(code_challenge),
            prompt
        )
    }

    /// Exchange an authorization code + PKCE verifier for tokens
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenExchangeResponse> {
        let token_url = format!("{}/auth/v1/token?grant_type=pkce", self.base_url);

        let response = self
            .http_client
            .post(&token_url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({
                "auth_code": code,
                "code_verifier": code_verifier,
            }))
            .send()
            .await
            .context("Failed to reach token endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Code exchange failed with status {}: {}",
                status,
                error_text
            ));
        }

        let token_response: TokenExchangeResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        Ok(token_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SupabaseClient {
        SupabaseClient::new(
            "https://project.supabase.co/".to_string(),
            "anon-key".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_authorize_url_shape() {
        let url = client().authorize_url(
            "google",
            "https://app.example.com/auth/callback",
            "challenge123",
        );

        assert!(url.starts_with("https://project.supabase.co/auth/v1/authorize?"));
        assert!(url.contains("provider=google"));
        assert!(url.contains("redirect_to=https%3A%2F%2Fapp.example.com%2Fauth%2Fcallback"));
        assert!(url.contains("code_challenge=challenge123"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("flow_type=pkce"));
    }

    #[test]
    fn test_prompt_per_provider() {
        let c = client();
        assert!(c
            .authorize_url("google", "http://localhost/cb", "c")
            .ends_with("prompt=select_account"));
        assert!(c
            .authorize_url("github", "http://localhost/cb", "c")
            .ends_with("prompt=login"));
        assert!(c
            .authorize_url("kakao", "http://localhost/cb", "c")
            .ends_with("prompt=login"));
    }

    #[test]
    fn test_redirect_with_query_params_is_encoded() {
        let url = client().authorize_url(
            "google",
            "http://localhost:3000/auth/callback?source=app&v=dmVyaWZpZXI",
            "c",
        );
        // The embedded callback query must not terminate the outer query string
        assert!(url.contains(
            "redirect_to=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback%3Fsource%3Dapp%26v%3DdmVyaWZpZXI"
        ));
    }
}
