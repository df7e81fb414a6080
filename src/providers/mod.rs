use axum::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::OAuthConfig;
use crate::store::Provider;

pub mod github;
pub mod google;

/// What a provider asserts about the user after a successful code exchange.
/// This is the entire surface the rest of the crate sees; provider tokens
/// and raw API responses stay inside the implementations.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub provider: Provider,
    /// Provider-scoped stable identifier for the account.
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is redirected to for the provider's consent screen.
    /// `state` is echoed back on the callback for CSRF checking.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange the callback code for the provider's view of the user.
    async fn exchange_profile(&self, code: &str) -> anyhow::Result<ProviderProfile>;
}

/// The providers this deployment is configured for. A provider without
/// client credentials in the environment simply is not registered.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    inner: HashMap<Provider, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn from_config(cfg: &OAuthConfig) -> Self {
        let mut inner: HashMap<Provider, Arc<dyn IdentityProvider>> = HashMap::new();
        if let Some(google) = &cfg.google {
            inner.insert(
                Provider::Google,
                Arc::new(google::GoogleProvider::new(google.clone())),
            );
        }
        if let Some(github) = &cfg.github {
            inner.insert(
                Provider::Github,
                Arc::new(github::GithubProvider::new(github.clone())),
            );
        }
        Self { inner }
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn IdentityProvider>> {
        self.inner.get(&provider).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthClient;

    fn client(prefix: &str) -> OAuthClient {
        OAuthClient {
            client_id: format!("{prefix}-id"),
            client_secret: format!("{prefix}-secret"),
            redirect_uri: format!("http://127.0.0.1:8080/api/v1/auth/{prefix}/callback"),
        }
    }

    #[test]
    fn registry_only_holds_configured_providers() {
        let cfg = OAuthConfig {
            google: Some(client("google")),
            github: None,
        };
        let registry = ProviderRegistry::from_config(&cfg);
        assert!(registry.get(Provider::Google).is_some());
        assert!(registry.get(Provider::Github).is_none());
    }

    #[test]
    fn authorize_urls_carry_state_and_client_id() {
        let cfg = OAuthConfig {
            google: Some(client("google")),
            github: Some(client("github")),
        };
        let registry = ProviderRegistry::from_config(&cfg);

        for provider in [Provider::Google, Provider::Github] {
            let identity_provider = registry.get(provider).expect("configured");
            let url = identity_provider.authorize_url("csrf-123");
            assert!(url.starts_with("https://"), "{url}");
            assert!(url.contains("state=csrf-123"), "{url}");
            assert!(url.contains("client_id="), "{url}");
            assert!(url.contains("redirect_uri="), "{url}");
        }
    }
}
