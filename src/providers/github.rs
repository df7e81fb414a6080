use anyhow::{bail, Context};
use axum::async_trait;
use reqwest::header;
use reqwest::Client;
use serde::Deserialize;

use super::{IdentityProvider, ProviderProfile};
use crate::config::OAuthClient;
use crate::store::Provider;

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";

// The GitHub API rejects requests without a User-Agent.
const USER_AGENT: &str = "keygate";

pub struct GithubProvider {
    config: OAuthClient,
    http: Client,
}

impl GithubProvider {
    pub fn new(config: OAuthClient) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    /// The `/user` endpoint only exposes a public email; accounts that keep
    /// it private need a second call to `/user/emails`.
    async fn fetch_primary_email(&self, access_token: &str) -> anyhow::Result<Option<String>> {
        let resp = self
            .http
            .get(EMAILS_URL)
            .bearer_auth(access_token)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .context("github emails request failed")?;
        if !resp.status().is_success() {
            bail!("github emails endpoint returned {}", resp.status());
        }
        let emails: Vec<GithubEmail> = resp
            .json()
            .await
            .context("failed to parse github emails response")?;
        let chosen = emails
            .iter()
            .find(|e| e.primary && e.verified)
            .or_else(|| emails.iter().find(|e| e.verified))
            .map(|e| e.email.clone());
        Ok(chosen)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = reqwest::Url::parse(AUTHORIZE_URL).expect("valid github auth url");
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", "user:email")
            .append_pair("state", state);
        url.to_string()
    }

    async fn exchange_profile(&self, code: &str) -> anyhow::Result<ProviderProfile> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        // Without the Accept header GitHub answers in urlencoded form.
        let token_resp = self
            .http
            .post(TOKEN_URL)
            .header(header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .context("github token request failed")?;
        if !token_resp.status().is_success() {
            bail!("github token endpoint returned {}", token_resp.status());
        }
        let token: TokenResponse = token_resp
            .json()
            .await
            .context("failed to parse github token response")?;

        let user_resp = self
            .http
            .get(USER_URL)
            .bearer_auth(&token.access_token)
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .context("github user request failed")?;
        if !user_resp.status().is_success() {
            bail!("github user endpoint returned {}", user_resp.status());
        }
        let user: GithubUser = user_resp
            .json()
            .await
            .context("failed to parse github user response")?;

        let email = match user.email {
            Some(email) => email,
            None => self
                .fetch_primary_email(&token.access_token)
                .await?
                .context("github profile carries no verified email")?,
        };
        let name = user.name.or(Some(user.login));
        Ok(ProviderProfile {
            provider: Provider::Github,
            subject: user.id.to_string(),
            email,
            name,
        })
    }
}
