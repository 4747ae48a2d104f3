use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::jobs::RetryPolicy;

const DEFAULT_DB_URL: &str = "sqlite://interview.sqlite3";
const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";

/// Credentials and models for the OpenAI-compatible provider.
#[derive(Clone, Debug)]
pub struct AiConfig {
    pub base_url: Url,
    pub api_key: String,
    pub analysis_model: String,
    pub wiki_model: String,
    pub transcribe_model: String,
    pub speech_model: String,
    pub speech_voice: String,
    pub language: String,
    pub timeout: Duration,
    /// Token prices seeded into the price book when missing.
    pub prices: Vec<ModelPrice>,
}

/// Micro-USD per million tokens for one model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelPrice {
    pub model: String,
    pub input_micro_usd_per_million: u64,
    pub output_micro_usd_per_million: u64,
}

impl ModelPrice {
    fn new(model: &str, input: u64, output: u64) -> Self {
        Self {
            model: model.to_owned(),
            input_micro_usd_per_million: input,
            output_micro_usd_per_million: output,
        }
    }
}

fn default_prices() -> Vec<ModelPrice> {
    vec![
        ModelPrice::new("gpt-4o", 2_500_000, 10_000_000),
        ModelPrice::new("gpt-4o-mini", 150_000, 600_000),
    ]
}

/// Remote workflow runner used instead of plain completions when configured.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub base_url: Url,
    pub analysis_key: Option<String>,
    pub wiki_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct JobSettings {
    pub workers: usize,
    pub retry: RetryPolicy,
    /// How many completed idempotency keys are remembered for deduplication.
    pub completed_keys: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryPolicy::default(),
            completed_keys: 10_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub db_url: String,
    /// `None` when no API key is set; AI-backed steps then fail as disabled.
    pub ai: Option<AiConfig>,
    pub workflow: Option<WorkflowConfig>,
    pub ai_timeout: Duration,
    pub audio_root: PathBuf,
    pub prompt_dir: Option<PathBuf>,
    pub prompt_pool_size: usize,
    pub wiki_variants: usize,
    pub jobs: JobSettings,
}

impl ServiceConfig {
    /// Read configuration from `INTERVIEW_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`, applying defaults for unset keys.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_owned());

        let timeout = Duration::from_secs(parse_or(&get, "INTERVIEW_AI_TIMEOUT_SECS", 120_u64)?);

        let ai = match get("INTERVIEW_AI_API_KEY") {
            Some(api_key) => Some(AiConfig {
                base_url: parse_url(
                    "INTERVIEW_AI_BASE_URL",
                    &text("INTERVIEW_AI_BASE_URL", DEFAULT_AI_BASE_URL),
                )?,
                api_key,
                analysis_model: text("INTERVIEW_ANALYSIS_MODEL", "gpt-4o"),
                wiki_model: text("INTERVIEW_WIKI_MODEL", "gpt-4o-mini"),
                transcribe_model: text("INTERVIEW_TRANSCRIBE_MODEL", "whisper-1"),
                speech_model: text("INTERVIEW_SPEECH_MODEL", "tts-1-hd"),
                speech_voice: text("INTERVIEW_SPEECH_VOICE", "fable"),
                language: text("INTERVIEW_LANGUAGE", "de"),
                timeout,
                prices: match get("INTERVIEW_AI_PRICES") {
                    Some(raw) => parse_prices(&raw)?,
                    None => default_prices(),
                },
            }),
            None => None,
        };

        let workflow = match get("INTERVIEW_WORKFLOW_URL") {
            Some(raw) => Some(WorkflowConfig {
                base_url: parse_url("INTERVIEW_WORKFLOW_URL", &raw)?,
                analysis_key: get("INTERVIEW_WORKFLOW_ANALYSIS_KEY"),
                wiki_key: get("INTERVIEW_WORKFLOW_WIKI_KEY"),
            }),
            None => None,
        };

        let defaults = JobSettings::default();
        let retry = RetryPolicy::new(
            parse_or(&get, "INTERVIEW_JOB_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            Duration::from_millis(parse_or(&get, "INTERVIEW_JOB_BASE_DELAY_MS", 500_u64)?),
            Duration::from_millis(parse_or(&get, "INTERVIEW_JOB_MAX_DELAY_MS", 30_000_u64)?),
        );
        let workers = parse_or(&get, "INTERVIEW_JOB_WORKERS", defaults.workers)?;
        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INTERVIEW_JOB_WORKERS",
                value: "0".into(),
            });
        }

        Ok(Self {
            db_url: text("INTERVIEW_DB_URL", DEFAULT_DB_URL),
            ai,
            workflow,
            ai_timeout: timeout,
            audio_root: PathBuf::from(text("INTERVIEW_AUDIO_ROOT", "./audio")),
            prompt_dir: get("INTERVIEW_PROMPT_DIR").map(PathBuf::from),
            prompt_pool_size: parse_or(&get, "INTERVIEW_PROMPT_POOL_SIZE", 4_usize)?,
            wiki_variants: parse_or(&get, "INTERVIEW_WIKI_VARIANTS", 2_usize)?,
            jobs: JobSettings {
                workers,
                retry,
                completed_keys: parse_or(
                    &get,
                    "INTERVIEW_JOB_COMPLETED_KEYS",
                    defaults.completed_keys,
                )?,
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

/// Parses `model=input/output` pairs separated by commas.
fn parse_prices(raw: &str) -> Result<Vec<ModelPrice>, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: "INTERVIEW_AI_PRICES",
        value: raw.to_owned(),
    };
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (model, prices) = pair.split_once('=').ok_or_else(invalid)?;
            let (input, output) = prices.split_once('/').ok_or_else(invalid)?;
            let model = model.trim();
            if model.is_empty() {
                return Err(invalid());
            }
            Ok(ModelPrice {
                model: model.to_owned(),
                input_micro_usd_per_million: input.trim().parse().map_err(|_| invalid())?,
                output_micro_usd_per_million: output.trim().parse().map_err(|_| invalid())?,
            })
        })
        .collect()
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { key, source })
}
