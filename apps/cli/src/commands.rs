//! CLI command definitions, routing, and tracing setup.

use std::str::FromStr;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use briefdesk_core::{CancelToken, Pipeline, ProgressObserver, annotate_content, compute_disclaimers};
use briefdesk_llm::{GenerativeProvider, HttpGenerativeClient};
use briefdesk_shared::{
    ComplianceFlag, EditionId, GenerationMode, init_config, load_config,
};
use briefdesk_sources::SourceSet;
use briefdesk_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Briefdesk — research-to-review newsletter editions.
#[derive(Parser)]
#[command(
    name = "briefdesk",
    version,
    about = "Generate, compliance-check, and approve newsletter editions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Actor recorded in the audit log for operator actions.
    #[arg(long, default_value = "operator", global = true)]
    pub actor: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a new edition (retrieval, verification, drafting, compliance).
    Run {
        /// Editorial brief steering this edition (switches to guided mode).
        #[arg(short, long)]
        brief: Option<String>,
    },

    /// Show pipeline status for an edition.
    Status {
        /// Edition ID.
        edition: String,
    },

    /// List all editions, newest first.
    List,

    /// Show an edition: sections, flags, and disclaimers.
    Show {
        /// Edition ID.
        edition: String,

        /// Emit annotated HTML instead of the plain review view.
        #[arg(long)]
        html: bool,
    },

    /// Resolve a compliance flag.
    Resolve {
        /// Flag ID.
        flag: String,

        /// Resolution note explaining the decision.
        #[arg(short, long)]
        note: String,
    },

    /// Approve a reviewed edition.
    Approve {
        /// Edition ID.
        edition: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "briefdesk=info",
        1 => "briefdesk=debug",
        _ => "briefdesk=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let actor = cli.actor;
    match cli.command {
        Command::Run { brief } => cmd_run(brief.as_deref(), &actor).await,
        Command::Status { edition } => cmd_status(&edition).await,
        Command::List => cmd_list().await,
        Command::Show { edition, html } => cmd_show(&edition, html).await,
        Command::Resolve { flag, note } => cmd_resolve(&flag, &note, &actor).await,
        Command::Approve { edition } => cmd_approve(&edition, &actor).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

async fn open_storage() -> Result<Storage> {
    let config = load_config()?;
    let db_path = config.db_path()?;
    Ok(Storage::open(&db_path).await?)
}

fn parse_edition_id(raw: &str) -> Result<EditionId> {
    EditionId::from_str(raw).map_err(|e| eyre!("invalid edition ID '{raw}': {e}"))
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(brief: Option<&str>, actor: &str) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open(&config.db_path()?).await?;
    let sources = SourceSet::from_config(&config);

    let client = config
        .credential(&config.generative.api_key_env)
        .map(|key| {
            HttpGenerativeClient::new(
                &config.generative.api_base_url,
                key,
                &config.generative.model,
            )
        });
    if client.is_none() {
        warn!(
            env = %config.generative.api_key_env,
            "generative credential not set; drafting and compliance pass 2 will be skipped"
        );
    }
    let provider = client.as_ref().map(|c| c as &dyn GenerativeProvider);

    let mode = if brief.is_some() {
        GenerationMode::Guided
    } else {
        GenerationMode::Auto
    };
    let edition = storage.try_start_edition(mode, brief).await?;

    info!(edition_id = %edition.id, mode = mode.as_str(), "edition started");

    // Ctrl-C aborts at the next stage boundary.
    let cancel = CancelToken::new();
    let ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested, stopping at next stage boundary");
            ctrlc.cancel();
        }
    });

    let reporter = CliProgress::new();
    let pipeline = Pipeline::new(&storage, &sources, provider)
        .with_observer(&reporter)
        .with_cancel_token(cancel)
        .with_actor(actor);

    let result = pipeline.run(&edition).await;
    reporter.finish();
    result?;

    let summary = storage
        .edition_summary(&edition.id)
        .await?
        .ok_or_else(|| eyre!("edition {} vanished after run", edition.id))?;

    println!();
    println!("  Edition ready for review.");
    println!("  ID:       {}", edition.id);
    println!("  Status:   {}", summary.status.as_str());
    println!("  Articles: {}", summary.article_count);
    let blocking = storage.count_unresolved_blocking(&edition.id).await?;
    if blocking > 0 {
        println!("  Blocking: {blocking} unresolved flag(s) — resolve before approval");
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressObserver for CliProgress {
    fn stage_started(&self, stage: &str, progress: u8) {
        self.spinner.set_message(format!("[{progress:>3}%] {stage}"));
    }
}

// ---------------------------------------------------------------------------
// status / list
// ---------------------------------------------------------------------------

async fn cmd_status(edition: &str) -> Result<()> {
    let id = parse_edition_id(edition)?;
    let storage = open_storage().await?;

    let summary = storage
        .edition_summary(&id)
        .await?
        .ok_or_else(|| eyre!("edition {id} not found"))?;

    println!("  Status:   {}", summary.status.as_str());
    println!("  Stage:    {}", summary.pipeline_stage);
    println!("  Progress: {}%", summary.pipeline_progress);
    println!("  Articles: {}", summary.article_count);
    Ok(())
}

async fn cmd_list() -> Result<()> {
    let storage = open_storage().await?;
    let editions = storage.list_editions().await?;

    if editions.is_empty() {
        println!("No editions yet. Start one with `briefdesk run`.");
        return Ok(());
    }

    for edition in editions {
        println!(
            "{}  {:<10}  {:<10}  {}",
            edition.id,
            edition.status.as_str(),
            edition.generation_mode.as_str(),
            edition.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

async fn cmd_show(edition: &str, html: bool) -> Result<()> {
    let id = parse_edition_id(edition)?;
    let storage = open_storage().await?;

    let edition = storage
        .get_edition(&id)
        .await?
        .ok_or_else(|| eyre!("edition {id} not found"))?;
    let sections = storage.sections_for_edition(&id).await?;
    let flags = storage.flags_for_edition(&id).await?;
    let categories = storage.live_article_categories(&id).await?;
    let disclaimers = compute_disclaimers(&flags, &categories);

    if html {
        print_html(&sections, &flags, &disclaimers);
        return Ok(());
    }

    println!("Edition {} — {}", edition.id, edition.status.as_str());
    if let Some(brief) = &edition.editorial_brief {
        println!("Editorial brief: {brief}");
    }
    println!();

    for section in &sections {
        println!("== {} ({} words)", section.section_name, section.word_count);
        println!("{}", section.content);

        let section_flags: Vec<&ComplianceFlag> = flags
            .iter()
            .filter(|f| f.section_draft_id == section.id)
            .collect();
        for flag in section_flags {
            let state = if flag.is_resolved { "resolved" } else { "OPEN" };
            println!(
                "  [{}] {} ({}, pass {}, {state}) — \"{}\"",
                flag.id,
                flag.severity.as_str(),
                flag.flag_type,
                flag.pass_number,
                flag.matched_text,
            );
            println!("      {} — {}", flag.rule_reference, flag.recommended_action);
        }
        println!();
    }

    println!("-- Disclaimers");
    for disclaimer in &disclaimers {
        println!("  [{}] {}", disclaimer.name, disclaimer.text);
    }
    println!();

    let blocking = storage.count_unresolved_blocking(&id).await?;
    if briefdesk_core::can_approve(&storage, &id).await? {
        println!("Ready to approve: `briefdesk approve {id}`");
    } else {
        println!(
            "Not approvable: status '{}', {blocking} unresolved blocking flag(s)",
            edition.status.as_str()
        );
    }
    Ok(())
}

/// Render the annotated review document: each section's content with
/// flag spans wrapped, followed by the disclaimer blocks.
fn print_html(
    sections: &[briefdesk_shared::SectionDraft],
    flags: &[ComplianceFlag],
    disclaimers: &[briefdesk_core::Disclaimer],
) {
    for section in sections {
        let section_flags: Vec<ComplianceFlag> = flags
            .iter()
            .filter(|f| f.section_draft_id == section.id)
            .cloned()
            .collect();
        let annotated = annotate_content(&section.content, &section_flags);
        println!("<section data-name=\"{}\">", section.section_name);
        println!("{annotated}");
        println!("</section>");
    }
    for disclaimer in disclaimers {
        println!(
            "<aside class=\"disclaimer disclaimer--{}\">{}</aside>",
            disclaimer.name.to_lowercase(),
            disclaimer.text
        );
    }
}

// ---------------------------------------------------------------------------
// resolve / approve
// ---------------------------------------------------------------------------

async fn cmd_resolve(flag_id: &str, note: &str, actor: &str) -> Result<()> {
    let storage = open_storage().await?;

    let flag = storage.resolve_flag(flag_id, actor, note).await?;
    if let Some(edition_id) = storage.edition_for_flag(flag_id).await? {
        let details = serde_json::json!({
            "flag_id": flag_id,
            "flag_type": flag.flag_type,
            "severity": flag.severity.as_str(),
        })
        .to_string();
        storage
            .append_audit(&edition_id, actor, "flag_resolved", Some(&details))
            .await?;

        let blocking = storage.count_unresolved_blocking(&edition_id).await?;
        println!("Flag {flag_id} resolved.");
        if blocking == 0 {
            println!("No blocking flags remain for edition {edition_id}.");
        } else {
            println!("{blocking} blocking flag(s) remain for edition {edition_id}.");
        }
    } else {
        println!("Flag {flag_id} resolved.");
    }
    Ok(())
}

async fn cmd_approve(edition: &str, actor: &str) -> Result<()> {
    let id = parse_edition_id(edition)?;
    let storage = open_storage().await?;

    let approved = storage.approve_edition(&id, actor).await?;
    storage
        .append_audit(&id, actor, "edition_approved", None)
        .await?;

    println!(
        "Edition {} approved by {} at {}.",
        approved.id,
        approved.approved_by.as_deref().unwrap_or(actor),
        approved
            .approved_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Created config at {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let rendered = toml::to_string_pretty(&config)?;
    println!("{rendered}");
    Ok(())
}
