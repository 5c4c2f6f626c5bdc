use std::env;

use log::warn;

// Client configuration
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:4010";
pub const DEFAULT_TOKEN_FILE: &str = "./.ms-session";

// Reconnect policy
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

// Embedded mock backend
pub const DEFAULT_MOCK_BIND: &str = "127.0.0.1:4010";
pub const DEFAULT_MOCK_WS_BIND: &str = "127.0.0.1:4011";
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub ws_url: String,
    pub token_file: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub mock: bool,
    pub mock_bind: String,
    pub mock_ws_bind: String,
    pub tick_interval_ms: u64,
    pub reconnect_base_ms: u64,
    pub max_reconnect_attempts: u32,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        let mock = env::var("MS_MOCK")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let mock_bind = env::var("MS_MOCK_BIND").unwrap_or_else(|_| DEFAULT_MOCK_BIND.to_string());
        let mock_ws_bind =
            env::var("MS_MOCK_WS_BIND").unwrap_or_else(|_| DEFAULT_MOCK_WS_BIND.to_string());

        let api_base_url = env::var("MS_API_BASE_URL").unwrap_or_else(|_| {
            if mock {
                format!("http://{}", mock_bind)
            } else {
                DEFAULT_API_BASE_URL.to_string()
            }
        });
        let ws_url = env::var("MS_WS_URL").unwrap_or_else(|_| {
            if mock {
                format!("ws://{}", mock_ws_bind)
            } else {
                derive_ws_url(&api_base_url)
            }
        });

        Self {
            api_base_url,
            ws_url,
            token_file: env::var("MS_TOKEN_FILE").unwrap_or_else(|_| DEFAULT_TOKEN_FILE.to_string()),
            email: env::var("MS_EMAIL").ok(),
            password: env::var("MS_PASSWORD").ok(),
            mock,
            mock_bind,
            mock_ws_bind,
            tick_interval_ms: parse_env_u64("MS_TICK_INTERVAL_MS", DEFAULT_TICK_INTERVAL_MS),
            reconnect_base_ms: parse_env_u64("MS_RECONNECT_BASE_MS", DEFAULT_RECONNECT_BASE_MS),
            max_reconnect_attempts: parse_env_u64(
                "MS_MAX_RECONNECT_ATTEMPTS",
                DEFAULT_MAX_RECONNECT_ATTEMPTS as u64,
            ) as u32,
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(format!("Invalid API base URL: {}", self.api_base_url));
        }

        if !self.ws_url.starts_with("ws://") && !self.ws_url.starts_with("wss://") {
            return Err(format!("Invalid realtime URL: {}", self.ws_url));
        }

        if self.reconnect_base_ms == 0 || self.reconnect_base_ms > RECONNECT_MAX_DELAY_MS {
            return Err(format!(
                "Reconnect base delay must be between 1 and {} ms",
                RECONNECT_MAX_DELAY_MS
            ));
        }

        if self.tick_interval_ms == 0 {
            return Err("Tick interval must be greater than 0".to_string());
        }

        if self.email.is_some() != self.password.is_some() {
            return Err("MS_EMAIL and MS_PASSWORD must be set together".to_string());
        }

        Ok(())
    }

    pub fn log_config(&self) {
        println!("Sync Configuration:");
        println!("  API Base URL: {}", self.api_base_url);
        println!("  Realtime URL: {}", self.ws_url);
        println!("  Token File: {}", self.token_file);
        println!("  Mock Backend: {}", self.mock);
        if self.mock {
            println!("  Mock API Bind: {}", self.mock_bind);
            println!("  Mock WS Bind: {}", self.mock_ws_bind);
        }
        println!("  Log Level: {}", self.log_level);
        match &self.email {
            Some(email) => println!("  Login: {}", email),
            None => {
                warn!("No login credentials configured");
                println!("  Login: (none)");
            }
        }
    }
}

/// Derives the realtime endpoint from the REST base URL; the platform serves
/// both from the same host.
pub fn derive_ws_url(api_base_url: &str) -> String {
    if let Some(rest) = api_base_url.strip_prefix("https://") {
        format!("wss://{}", rest.trim_end_matches('/'))
    } else if let Some(rest) = api_base_url.strip_prefix("http://") {
        format!("ws://{}", rest.trim_end_matches('/'))
    } else {
        api_base_url.to_string()
    }
}

fn parse_env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring non-numeric {}: {}", key, raw);
            default
        }),
        Err(_) => default,
    }
}
