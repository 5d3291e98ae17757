use std::{env, fmt, fs, net::SocketAddr, path::Path, time::Duration};

use crate::{errors::Error, Result};

const DEFAULT_PERSONA: &str = "\
You are an all-knowing, sharp-witted, dark-humored philosopher, master of dark psychology, \
and the undisputed god of finance, crypto, and algorithmic trading.
Your goal is to educate, entertain, and provoke thought while providing precise, actionable \
trading advice. Your responses should blend wit, humor, sarcasm, and philosophical insights, \
ensuring users are both entertained and educated.";

/// Typed configuration for the gateway.
///
/// Secrets (`telegram_bot_token`, `cohere_api_key`) are redacted from `Debug`.
#[derive(Clone)]
pub struct Config {
    // Server
    pub bind_address: SocketAddr,
    pub cors_allowed_origins: Vec<String>,
    pub log_json: bool,

    // Identity provider
    pub telegram_bot_token: String,
    pub telegram_auth_max_age: Option<Duration>,

    // Upstream model
    pub cohere_api_key: String,
    pub cohere_base_url: String,
    pub cohere_model: Option<String>,
    pub persona_prompt: String,
    pub temperature: f64,
    pub upstream_timeout: Duration,

    // Quota
    pub default_user_tokens: u64,
    pub refund_on_upstream_error: bool,

    // Session retention
    pub session_idle_ttl: Option<Duration>,
    pub session_max_count: Option<usize>,
    pub session_sweep_interval: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;
        let cohere_api_key = env_str("COHERE_API_KEY")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("COHERE_API_KEY environment variable is required".to_string())
            })?;

        let bind_raw = env_str("CHATGATE_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let bind_address = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("CHATGATE_BIND '{bind_raw}' is invalid: {e}")))?;

        let temperature = env_f64("CHAT_TEMPERATURE").unwrap_or(0.7);
        if !(0.0..=5.0).contains(&temperature) {
            return Err(Error::Config(format!(
                "CHAT_TEMPERATURE must be within 0.0..=5.0, got {temperature}"
            )));
        }

        Ok(Self {
            bind_address,
            cors_allowed_origins: parse_csv(env_str("CORS_ALLOWED_ORIGINS")),
            log_json: env_bool("LOG_JSON").unwrap_or(false),
            telegram_bot_token,
            telegram_auth_max_age: env_u64("TELEGRAM_AUTH_MAX_AGE_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            cohere_api_key,
            cohere_base_url: env_str("COHERE_BASE_URL")
                .and_then(non_empty)
                .unwrap_or_else(|| "https://api.cohere.com".to_string()),
            cohere_model: env_str("COHERE_MODEL").and_then(non_empty),
            persona_prompt: env_str("PERSONA_PROMPT")
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
            temperature,
            upstream_timeout: Duration::from_secs(
                env_u64("UPSTREAM_TIMEOUT_SECS").unwrap_or(60).max(1),
            ),
            default_user_tokens: env_u64("DEFAULT_USER_TOKENS").unwrap_or(10),
            refund_on_upstream_error: env_bool("REFUND_ON_UPSTREAM_ERROR").unwrap_or(false),
            session_idle_ttl: env_u64("SESSION_IDLE_TTL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            session_max_count: env_usize("SESSION_MAX_COUNT").filter(|n| *n > 0),
            session_sweep_interval: Duration::from_secs(
                env_u64("SESSION_SWEEP_INTERVAL_SECS").unwrap_or(60).max(1),
            ),
        })
    }

    /// Defaults for everything but the secrets. Used by tests and embedders.
    pub fn with_secrets(telegram_bot_token: &str, cohere_api_key: &str) -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            cors_allowed_origins: Vec::new(),
            log_json: false,
            telegram_bot_token: telegram_bot_token.to_string(),
            telegram_auth_max_age: None,
            cohere_api_key: cohere_api_key.to_string(),
            cohere_base_url: "https://api.cohere.com".to_string(),
            cohere_model: None,
            persona_prompt: DEFAULT_PERSONA.to_string(),
            temperature: 0.7,
            upstream_timeout: Duration::from_secs(60),
            default_user_tokens: 10,
            refund_on_upstream_error: false,
            session_idle_ttl: None,
            session_max_count: None,
            session_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("log_json", &self.log_json)
            .field("telegram_bot_token", &"<redacted>")
            .field("telegram_auth_max_age", &self.telegram_auth_max_age)
            .field("cohere_api_key", &"<redacted>")
            .field("cohere_base_url", &self.cohere_base_url)
            .field("cohere_model", &self.cohere_model)
            .field("temperature", &self.temperature)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("default_user_tokens", &self.default_user_tokens)
            .field("refund_on_upstream_error", &self.refund_on_upstream_error)
            .field("session_idle_ttl", &self.session_idle_ttl)
            .field("session_max_count", &self.session_max_count)
            .field("session_sweep_interval", &self.session_sweep_interval)
            .finish_non_exhaustive()
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_str(key).and_then(|s| s.trim().parse::<f64>().ok())
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\n\nTELEGRAM_BOT_TOKEN=\"abc:def\"\nexport COHERE_MODEL='command-r'\nBROKEN\n =x\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "abc:def".to_string()),
                ("COHERE_MODEL".to_string(), "command-r".to_string()),
            ]
        );
    }

    #[test]
    fn csv_and_bool_helpers() {
        assert_eq!(
            parse_csv(Some(" http://a.test, ,http://b.test ".to_string())),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert!(parse_csv(None).is_empty());
        assert!(parse_bool("Yes"));
        assert!(parse_bool(" on "));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let cfg = Config::with_secrets("123:bot-secret", "cohere-secret");
        let shown = format!("{cfg:?}");
        assert!(!shown.contains("bot-secret"));
        assert!(!shown.contains("cohere-secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn defaults_match_baseline_behavior() {
        let cfg = Config::with_secrets("t", "k");
        assert_eq!(cfg.default_user_tokens, 10);
        assert_eq!(cfg.temperature, 0.7);
        assert!(!cfg.refund_on_upstream_error);
        assert!(cfg.session_idle_ttl.is_none());
        assert!(cfg.session_max_count.is_none());
    }
}
