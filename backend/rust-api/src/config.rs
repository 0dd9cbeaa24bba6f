use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub listen_addr: String,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub smtp: Option<SmtpConfig>,
}

/// SMTP settings for the password-reset notification collaborator.
/// When absent, reset emails are logged instead of sent.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_name: String,
    pub from_email: String,
    pub use_tls: bool,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let listen_addr = settings
            .get_string("server.listen_addr")
            .or_else(|_| env::var("LISTEN_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "school_mgmt".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let smtp = Self::load_smtp(&settings);

        Ok(Config {
            listen_addr,
            mongo_uri,
            mongo_database,
            jwt_secret,
            smtp,
        })
    }

    fn load_smtp(settings: &config::Config) -> Option<SmtpConfig> {
        let server = settings
            .get_string("smtp.server")
            .or_else(|_| env::var("SMTP_SERVER"))
            .ok()?;

        let port = settings
            .get_int("smtp.port")
            .ok()
            .and_then(|p| u16::try_from(p).ok())
            .or_else(|| env::var("SMTP_PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(587);

        let username = settings
            .get_string("smtp.username")
            .or_else(|_| env::var("SMTP_USERNAME"))
            .unwrap_or_default();

        let password = settings
            .get_string("smtp.password")
            .or_else(|_| env::var("SMTP_PASSWORD"))
            .unwrap_or_default();

        let from_name = settings
            .get_string("smtp.from_name")
            .or_else(|_| env::var("SMTP_FROM_NAME"))
            .unwrap_or_else(|_| "School Management".to_string());

        let from_email = settings
            .get_string("smtp.from_email")
            .or_else(|_| env::var("SMTP_FROM_EMAIL"))
            .unwrap_or_else(|_| "noreply@school.local".to_string());

        let use_tls = settings
            .get_bool("smtp.use_tls")
            .ok()
            .or_else(|| env::var("SMTP_USE_TLS").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(true);

        Some(SmtpConfig {
            server,
            port,
            username,
            password,
            from_name,
            from_email,
            use_tls,
        })
    }
}
