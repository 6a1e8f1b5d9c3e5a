use anyhow::{Result, anyhow};
use std::env;
use std::path::PathBuf;

use crate::cli::Args;

const DEFAULT_MODEL: &str = "qwen-long";
const DEFAULT_MODEL_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert in the field of deep learning research.";
const DEFAULT_MODEL_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FILES_DIR: &str = "files";
const DEFAULT_TRANSCRIPT_DIR: &str = "logs";
const DEFAULT_ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
const DEFAULT_PROXY_HTTP: &str = "http://127.0.0.1:1087";
const DEFAULT_PROXY_ALL: &str = "http://127.0.0.1:1086";
const DEFAULT_PROXY_NO_PROXY: &str = "localhost, 127.0.0.1, ::1";
const DEFAULT_USE_PROXY: bool = false;
const DEFAULT_WEB_ADDR: &str = "127.0.0.1:7860";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub enabled: bool,
    pub http_proxy: String,
    pub all_proxy: String,
    pub no_proxy: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_USE_PROXY,
            http_proxy: DEFAULT_PROXY_HTTP.to_string(),
            all_proxy: DEFAULT_PROXY_ALL.to_string(),
            no_proxy: DEFAULT_PROXY_NO_PROXY.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub access_key: String,
    pub model: String,
    pub model_base_url: String,
    pub system_prompt: String,
    pub model_connect_timeout_secs: u64,
    pub files_dir: PathBuf,
    pub transcript_dir: PathBuf,
    pub arxiv_api_url: String,
    pub proxy: ProxySettings,
    pub web_addr: String,
}

impl Config {
    /// Reads the environment, then applies command-line overrides.
    /// A missing access key is fatal.
    pub fn load(args: &Args) -> Result<Self> {
        Self::from_env().with_args(args)
    }

    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        let model_connect_timeout_secs =
            parse_connect_timeout_secs(get_var("MODEL_CONNECT_TIMEOUT_SECS").as_deref());
        let proxy = ProxySettings {
            enabled: parse_bool(get_var("USE_PROXY").as_deref(), DEFAULT_USE_PROXY),
            http_proxy: get_var("PROXY_HTTP").unwrap_or_else(|| DEFAULT_PROXY_HTTP.to_string()),
            all_proxy: get_var("PROXY_ALL").unwrap_or_else(|| DEFAULT_PROXY_ALL.to_string()),
            no_proxy: get_var("PROXY_NO_PROXY")
                .unwrap_or_else(|| DEFAULT_PROXY_NO_PROXY.to_string()),
        };

        Self {
            access_key: String::new(),
            model: get_var("MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            model_base_url: get_var("MODEL_BASE_URL")
                .unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.to_string()),
            system_prompt: get_var("SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model_connect_timeout_secs,
            files_dir: parse_dir(get_var("FILES_DIR").as_deref(), DEFAULT_FILES_DIR),
            transcript_dir: parse_dir(get_var("TRANSCRIPT_DIR").as_deref(), DEFAULT_TRANSCRIPT_DIR),
            arxiv_api_url: get_var("ARXIV_API_URL")
                .unwrap_or_else(|| DEFAULT_ARXIV_API_URL.to_string()),
            proxy,
            web_addr: get_var("WEB_ADDR").unwrap_or_else(|| DEFAULT_WEB_ADDR.to_string()),
        }
    }

    fn with_args(mut self, args: &Args) -> Result<Self> {
        let access_key = args
            .access_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                anyhow!("Missing access key. Pass --access-key or set DASHSCOPE_API_KEY.")
            })?;
        self.access_key = access_key.to_string();

        if args.use_proxy {
            self.proxy.enabled = true;
        }
        if let Some(addr) = &args.web_addr {
            self.web_addr = addr.clone();
        }
        Ok(self)
    }
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_connect_timeout_secs(raw: Option<&str>) -> u64 {
    parse_positive_u64(raw, DEFAULT_MODEL_CONNECT_TIMEOUT_SECS)
}

fn parse_bool(raw: Option<&str>, default: bool) -> bool {
    match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn parse_dir(raw: Option<&str>, default: &str) -> PathBuf {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}
