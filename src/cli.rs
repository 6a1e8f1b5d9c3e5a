use clap::Parser;

/// Chat with an LLM about research papers.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Access key for the model provider (DashScope API key)
    #[arg(short = 'a', long, alias = "accessKey", env = "DASHSCOPE_API_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Route arXiv traffic through the configured proxy
    #[arg(short = 'p', long, alias = "useProxy")]
    pub use_proxy: bool,

    /// Serve the web chat UI instead of the interactive prompt
    #[arg(long)]
    pub web: bool,

    /// Address the web UI listens on (overrides WEB_ADDR)
    #[arg(long)]
    pub web_addr: Option<String>,
}
