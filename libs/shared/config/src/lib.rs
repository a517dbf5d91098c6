use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub recommendation_api_url: String,
    pub recommendation_api_key: String,
    pub recommendation_model: String,
    pub recommendation_timeout_secs: u64,
    pub location_timeout_ms: u64,
    pub default_max_distance_km: f64,
    pub slot_window_days: i64,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            recommendation_api_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            recommendation_api_key: String::new(),
            recommendation_model: "gemini-1.5-flash".to_string(),
            recommendation_timeout_secs: 30,
            location_timeout_ms: 5_000,
            default_max_distance_km: 50.0,
            slot_window_days: 7,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: string_var("SUPABASE_URL", defaults.supabase_url),
            supabase_anon_key: string_var("SUPABASE_ANON_PUBLIC_KEY", defaults.supabase_anon_key),
            supabase_jwt_secret: string_var("SUPABASE_JWT_SECRET", defaults.supabase_jwt_secret),
            recommendation_api_url: string_var("RECOMMENDATION_API_URL", defaults.recommendation_api_url),
            recommendation_api_key: string_var("RECOMMENDATION_API_KEY", defaults.recommendation_api_key),
            recommendation_model: string_var("RECOMMENDATION_MODEL", defaults.recommendation_model),
            recommendation_timeout_secs: parsed_var("RECOMMENDATION_TIMEOUT_SECS", defaults.recommendation_timeout_secs),
            location_timeout_ms: parsed_var("LOCATION_TIMEOUT_MS", defaults.location_timeout_ms),
            default_max_distance_km: parsed_var("DEFAULT_MAX_DISTANCE_KM", defaults.default_max_distance_km),
            slot_window_days: parsed_var("SLOT_WINDOW_DAYS", defaults.slot_window_days),
            port: parsed_var("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Supabase not fully configured - falling back to in-memory stores");
        }
        if !config.is_recommendation_configured() {
            warn!("Recommendation service not configured - chat replies will fail");
        }

        config
    }

    /// True when the Supabase store can be used.
    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_recommendation_configured(&self) -> bool {
        !self.recommendation_api_url.is_empty()
            && !self.recommendation_api_key.is_empty()
            && !self.recommendation_model.is_empty()
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }

    pub fn recommendation_timeout(&self) -> Duration {
        Duration::from_secs(self.recommendation_timeout_secs)
    }
}

fn string_var(key: &str, default: String) -> String {
    env::var(key).unwrap_or_else(|_| {
        if default.is_empty() {
            warn!("{} not set, using empty value", key);
        } else {
            warn!("{} not set, using default", key);
        }
        default
    })
}

fn parsed_var<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
