use std::env;

/// Application configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub gemini_api_key: String,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub access_token_expire_days: i64,
    pub refresh_token_expire_days: i64,
    pub rate_limit: usize,
    pub time_window_seconds: u64,
    pub cors_origins: Vec<String>,
    pub port: u16,
}

const DEFAULT_ACCESS_TOKEN_EXPIRE_DAYS: i64 = 1;
const DEFAULT_REFRESH_TOKEN_EXPIRE_DAYS: i64 = 2;
const DEFAULT_RATE_LIMIT: usize = 15;
const DEFAULT_TIME_WINDOW_SECONDS: u64 = 60;
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
const DEFAULT_PORT: u16 = 8000;

impl Settings {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self, String> {
        let required =
            |key: &str| get(key).ok_or_else(|| format!("{} must be set", key));

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            gemini_api_key: required("GEMINI_API_KEY")?,
            qdrant_url: required("QDRANT_URL")?,
            qdrant_api_key: get("QDRANT_API_KEY"),
            access_token_expire_days: parse_or(
                get("ACCESS_TOKEN_EXPIRE"),
                DEFAULT_ACCESS_TOKEN_EXPIRE_DAYS,
            ),
            refresh_token_expire_days: parse_or(
                get("REFRESH_TOKEN_EXPIRE"),
                DEFAULT_REFRESH_TOKEN_EXPIRE_DAYS,
            ),
            rate_limit: parse_or(get("RATE_LIMIT"), DEFAULT_RATE_LIMIT),
            time_window_seconds: parse_or(
                get("TIME_WINDOW_SECONDS"),
                DEFAULT_TIME_WINDOW_SECONDS,
            ),
            cors_origins: parse_origins(get("CORS_ORIGINS")),
            port: parse_or(get("PORT"), DEFAULT_PORT),
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_origins(value: Option<String>) -> Vec<String> {
    let raw = match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => return vec![DEFAULT_CORS_ORIGIN.to_string()],
    };
    raw.split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}
