//! Warden CLI
//!
//! Operator tooling for the Warden policy engine:
//! - `ask`: run one query through the full pipeline with a profile file
//! - `explain`: dry run showing classification, guardrail and prompt
//! - `normalize`: apply the query normalizer
//! - `check-config`: show resolved guardrail identifiers and fallbacks

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warden_core::{grammar, PolicyEngine, Segment, UserProfile};
use warden_runtime::{
    AskRequest, Caller, MemoryProfileStore, ProviderRegistry, QueryService, RuntimeConfig,
};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Audience-aware guardrail and prompt policy for AI queries", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a query for the user described by a profile file
    Ask {
        /// Profile file (YAML or JSON)
        #[arg(short, long)]
        profile: PathBuf,

        /// The query
        #[arg(short, long)]
        query: String,

        /// Conversation id to tag the response and audit record with.
        /// History is not kept between runs, so no earlier turns are replayed.
        #[arg(long)]
        conversation: Option<String>,

        /// Runtime config file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override `inference.provider`
        #[arg(long)]
        provider: Option<String>,

        /// Caller User-Agent, used for device detection
        #[arg(long)]
        user_agent: Option<String>,

        #[arg(short, long, value_enum, default_value = "json")]
        output: OutputFormat,
    },

    /// Show what would be sent to inference, without calling it
    Explain {
        #[arg(short, long)]
        profile: PathBuf,

        #[arg(short, long)]
        query: String,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        user_agent: Option<String>,

        #[arg(short, long, value_enum, default_value = "json")]
        output: OutputFormat,
    },

    /// Normalize a query
    Normalize {
        query: String,
    },

    /// Show resolved guardrail identifiers and registered providers
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

/// Config file if given, otherwise defaults, with environment overrides applied.
fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let Some(path) = path else {
        return RuntimeConfig::from_env().context("Invalid environment configuration");
    };

    let mut config = RuntimeConfig::load(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    Ok(config)
}

fn load_profile(path: &Path) -> Result<UserProfile> {
    UserProfile::from_file(path)
        .with_context(|| format!("Failed to load profile {}", path.display()))
}

#[derive(Serialize)]
struct Explanation<'a> {
    plan: &'a warden_core::PolicyPlan,
    rendered_prompt: String,
}

#[derive(Serialize)]
struct SegmentStatus {
    segment: &'static str,
    guardrail_id: String,
    fallback: bool,
}

fn segment_report(config: &RuntimeConfig) -> Result<Vec<SegmentStatus>> {
    let catalog = config
        .guardrails
        .catalog()
        .context("Guardrail catalog is unusable")?;

    Ok(Segment::ALL
        .iter()
        .map(|segment| match catalog.resolve(*segment) {
            Some(id) => SegmentStatus {
                segment: segment.config_key(),
                guardrail_id: id.to_string(),
                fallback: false,
            },
            None => SegmentStatus {
                segment: segment.config_key(),
                guardrail_id: catalog.default_id().to_string(),
                fallback: true,
            },
        })
        .collect())
}

async fn ask(
    profile: &Path,
    query: String,
    conversation: Option<String>,
    config: Option<&Path>,
    provider: Option<String>,
    user_agent: Option<String>,
    output: OutputFormat,
) -> Result<()> {
    let config = load_config(config)?;
    let profile = load_profile(profile)?;

    let provider_type = provider.unwrap_or_else(|| config.inference.provider.clone());
    let provider = ProviderRegistry::with_defaults()
        .create(&provider_type, &config.inference.provider_config())
        .with_context(|| format!("Failed to create provider '{}'", provider_type))?;

    let profiles = MemoryProfileStore::new();
    profiles
        .insert(&profile)
        .context("Failed to load profile into store")?;

    let service = QueryService::builder()
        .config(config)
        .provider(provider)
        .profiles(Arc::new(profiles))
        .build()
        .context("Failed to build query service")?;

    let mut caller = Caller::new(profile.user_id.clone());
    if let Some(user_agent) = user_agent {
        caller = caller.with_user_agent(user_agent);
    }

    let mut request = AskRequest::new(query);
    if let Some(conversation) = conversation {
        request = request.with_conversation(conversation);
    }

    match service.ask(&caller, request).await {
        Ok(response) => {
            println!("{}", render(&response, output)?);
            Ok(())
        }
        Err(e) => {
            tracing::debug!(error = %e, "Request failed");
            bail!("{} ({})", e.public_message(), e.status_code())
        }
    }
}

fn explain(
    profile: &Path,
    query: &str,
    config: Option<&Path>,
    user_agent: Option<&str>,
    output: OutputFormat,
) -> Result<()> {
    let config = load_config(config)?;
    let profile = load_profile(profile)?;

    let catalog = config
        .guardrails
        .catalog()
        .context("Guardrail catalog is unusable")?;
    let engine = PolicyEngine::new(catalog).with_window(config.history.window());

    let plan = engine.plan_with_user_agent(&profile, query, &[], chrono::Utc::now(), user_agent);
    let explanation = Explanation {
        rendered_prompt: plan.prompt.render(),
        plan: &plan,
    };

    println!("{}", render(&explanation, output)?);
    Ok(())
}

fn check_config(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let report = segment_report(&config)?;

    println!("Guardrail version: {}", config.guardrails.version);
    for status in &report {
        if status.fallback {
            println!(
                "  {:<20} {} (fallback to default)",
                status.segment, status.guardrail_id
            );
        } else {
            println!("  {:<20} {}", status.segment, status.guardrail_id);
        }
    }

    let fallbacks = report.iter().filter(|s| s.fallback).count();
    if fallbacks > 0 {
        tracing::warn!(
            anomaly = "guardrail_misconfigured",
            segments = fallbacks,
            "Segments without their own guardrail will use the default"
        );
    }

    let registry = ProviderRegistry::with_defaults();
    println!("Providers:");
    for (name, description) in registry.describe() {
        let marker = if name == config.inference.provider {
            "*"
        } else {
            " "
        };
        println!("  {} {:<10} {}", marker, name, description);
    }

    if let Err(e) = registry.validate(
        &config.inference.provider,
        &config.inference.provider_config(),
    ) {
        println!("Provider '{}' not ready: {}", config.inference.provider, e);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Ask {
            profile,
            query,
            conversation,
            config,
            provider,
            user_agent,
            output,
        } => {
            ask(
                &profile,
                query,
                conversation,
                config.as_deref(),
                provider,
                user_agent,
                output,
            )
            .await
        }
        Commands::Explain {
            profile,
            query,
            config,
            user_agent,
            output,
        } => explain(
            &profile,
            &query,
            config.as_deref(),
            user_agent.as_deref(),
            output,
        ),
        Commands::Normalize { query } => {
            println!("{}", grammar::normalize(&query));
            Ok(())
        }
        Commands::CheckConfig { config } => check_config(config.as_deref()),
    }
}
