pub mod chat;
pub mod cli;
pub mod command;
pub mod config;
pub mod conversation;
pub mod error;
pub mod logging;
pub mod model;
pub mod providers;
pub mod repl;
pub mod resolver;
pub mod session;
pub mod transcript;
pub mod web;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::Args;
use config::Config;
use repl::run_repl;
use session::Session;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let args = Args::parse();
    let cfg = Config::load(&args)?;
    info!(
        model = %cfg.model,
        model_base_url = %cfg.model_base_url,
        files_dir = %cfg.files_dir.display(),
        transcript_dir = %cfg.transcript_dir.display(),
        use_proxy = cfg.proxy.enabled,
        web = args.web,
        "loaded runtime configuration"
    );

    let session = Session::from_config(&cfg)?;
    if args.web {
        web::serve(session, &cfg.web_addr).await
    } else {
        run_repl(session).await
    }
}
