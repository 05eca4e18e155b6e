use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use deep_research_scraper::config::{site_config, AppConfig, ConfigManager, FileConfigManager};
use deep_research_scraper::{BackendKind, InstructionRegistry, ResearchOrchestrator, ResearchRequest, ResearchSite};

#[derive(Parser)]
#[command(name = "deep-research")]
#[command(about = "Scrape long-form answers from chat-style research sites")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "research.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one query and print the answer
    Research {
        /// Query text
        #[arg(short, long)]
        query: String,

        /// stealth, devtools or agent (default: from config)
        #[arg(short, long)]
        backend: Option<BackendKind>,

        /// gemini or perplexity (default: from config)
        #[arg(short, long)]
        site: Option<ResearchSite>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Whole attempts before giving up
        #[arg(long)]
        max_retries: Option<u32>,

        /// Two-factor code for this run
        #[arg(long)]
        two_factor_code: Option<String>,

        /// Print the result with metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// List supported site/backend pairs and their wait budgets
    Sites,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let manager = FileConfigManager::new(cli.config);

    match cli.command {
        Commands::Research {
            query,
            backend,
            site,
            headed,
            max_retries,
            two_factor_code,
            json,
        } => {
            let mut app_config = manager.load_config().await?;
            apply_overrides(&mut app_config, site, backend, headed, max_retries, two_factor_code);
            manager.validate_config(&app_config)?;

            let request = ResearchRequest::new(query, app_config.research.site, app_config.research.backend);
            let config = app_config.into_scraper_config()?;
            let orchestrator = ResearchOrchestrator::new(config)?;

            let result = orchestrator.research(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.text);
            }
            info!(
                "Done in {:?} ({} attempt(s))",
                result.elapsed, result.attempts
            );
        }
        Commands::Sites => print_sites(),
        Commands::InitConfig { force } => {
            if manager.path().exists() && !force {
                bail!(
                    "{} already exists, pass --force to overwrite",
                    manager.path().display()
                );
            }
            manager
                .create_default_config()
                .await
                .with_context(|| format!("writing {}", manager.path().display()))?;
            println!("Wrote {}", manager.path().display());
        }
    }

    Ok(())
}

fn apply_overrides(
    config: &mut AppConfig,
    site: Option<ResearchSite>,
    backend: Option<BackendKind>,
    headed: bool,
    max_retries: Option<u32>,
    two_factor_code: Option<String>,
) {
    if let Some(site) = site {
        config.research.site = site;
    }
    if let Some(backend) = backend {
        config.research.backend = backend;
    }
    if headed {
        config.browser.headless = false;
    }
    if let Some(max_retries) = max_retries {
        config.research.max_retries = max_retries;
    }
    if two_factor_code.is_some() {
        config.credentials.two_factor_code = two_factor_code;
    }
}

fn print_sites() {
    let registry = InstructionRegistry::builtin();
    println!(
        "{:<12} {:<10} {:<6} {:>10} {:>10} {:>10}",
        "SITE", "BACKEND", "AUTH", "RESPONSE", "AUTH STEP", "PRE/POST"
    );
    for (site, backend) in registry.pairs() {
        let Ok(set) = registry.lookup(site, backend) else {
            continue;
        };
        let waits = set.waits;
        println!(
            "{:<12} {:<10} {:<6} {:>10} {:>10} {:>10}",
            site.as_str(),
            backend.as_str(),
            if site_config(site).requires_auth { "yes" } else { "no" },
            format!("{:?}", waits.response),
            format!("{:?}", waits.auth_step),
            format!("{:?}/{:?}", waits.pre_input, waits.post_input),
        );
    }
}
