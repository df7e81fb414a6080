use anyhow::{bail, Context};
use axum::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{IdentityProvider, ProviderProfile};
use crate::config::OAuthClient;
use crate::store::Provider;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

pub struct GoogleProvider {
    config: OAuthClient,
    http: Client,
}

impl GoogleProvider {
    pub fn new(config: OAuthClient) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = reqwest::Url::parse(AUTHORIZE_URL).expect("valid google auth url");
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid email profile")
            .append_pair("state", state);
        url.to_string()
    }

    async fn exchange_profile(&self, code: &str) -> anyhow::Result<ProviderProfile> {
        let params = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let token_resp = self
            .http
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .context("google token request failed")?;
        if !token_resp.status().is_success() {
            bail!("google token endpoint returned {}", token_resp.status());
        }
        let token: TokenResponse = token_resp
            .json()
            .await
            .context("failed to parse google token response")?;

        let user_resp = self
            .http
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("google userinfo request failed")?;
        if !user_resp.status().is_success() {
            bail!("google userinfo returned {}", user_resp.status());
        }
        let info: GoogleUserInfo = user_resp
            .json()
            .await
            .context("failed to parse google userinfo")?;

        let email = info.email.context("google profile carries no email")?;
        Ok(ProviderProfile {
            provider: Provider::Google,
            subject: info.sub,
            email,
            name: info.name,
        })
    }
}
