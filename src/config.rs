use serde::Deserialize;
use time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Secret for access tokens. Refresh tokens use their own secret so a
    /// leak of one kind never validates the other.
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

impl JwtConfig {
    pub fn refresh_ttl(&self) -> Duration {
        Duration::minutes(self.refresh_ttl_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// Client credentials for one OAuth provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthConfig {
    pub google: Option<OAuthClient>,
    pub github: Option<OAuthClient>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Base URL of the frontend; reset links point below it and CORS trusts
    /// this origin.
    pub frontend_url: String,
    pub cookie_secure: bool,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub oauth: OAuthConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            access_secret: std::env::var("JWT_SECRET")?,
            refresh_secret: std::env::var("JWT_REFRESH_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "keygate".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "keygate-users".into()),
            access_ttl_minutes: env_i64("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: env_i64("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        let mail = MailConfig {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".into()),
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(587),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            from: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| "Keygate <no-reply@keygate.local>".into()),
        };
        let oauth = OAuthConfig {
            google: oauth_client("GOOGLE", "google"),
            github: oauth_client("GITHUB", "github"),
        };
        Ok(Self {
            database_url,
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
            cookie_secure: std::env::var("COOKIE_SECURE")
                .map(|v| v == "true")
                .unwrap_or(false),
            jwt,
            mail,
            oauth,
        })
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

/// A provider is only configured when both halves of its credentials are
/// present; the redirect URI defaults to the local callback route.
fn oauth_client(prefix: &str, path: &str) -> Option<OAuthClient> {
    let client_id = std::env::var(format!("{prefix}_CLIENT_ID")).ok()?;
    let client_secret = std::env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;
    let redirect_uri = std::env::var(format!("{prefix}_REDIRECT_URI")).unwrap_or_else(|_| {
        format!("http://127.0.0.1:8080/api/v1/auth/{path}/callback")
    });
    Some(OAuthClient {
        client_id,
        client_secret,
        redirect_uri,
    })
}
