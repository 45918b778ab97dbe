use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use traductor::config::{ClientConfig, ConfigOverrides};
use traductor::health::BackendStatus;
use traductor::interchange::{self, InterchangeError};
use traductor::preview::render_preview;
use traductor::settings::{SettingsError, SettingsUpdate};
use traductor::state_machine::{user_message, StatusMessage};
use traductor::translate::glossary::{count_glossary_lines, parse_glossary};
use traductor::translate::{EmptyInputPolicy, TranslationMode};
use traductor::{init_tracing, AppContext, StartupError};

#[derive(Parser, Debug)]
#[command(name = "traductor", version, about = "Spanish/Danish translation client")]
struct Cli {
    /// Directory holding the local settings store
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Keep settings in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Which inputs count as empty: trimmed | zero-length
    #[arg(long, global = true, value_name = "POLICY")]
    empty_input: Option<EmptyInputPolicy>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate text (argument, --file, or stdin)
    Translate {
        text: Option<String>,
        /// Treat input as an HTML e-mail body
        #[arg(long)]
        html: bool,
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Also export the result into DIR
        #[arg(long, value_name = "DIR")]
        save: Option<PathBuf>,
        /// Write the result to PATH instead of stdout
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Backend health, cache and uptime
    Status {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    Glossary {
        #[command(subcommand)]
        action: GlossaryAction,
    },
    /// Sanitised HTML preview (--file or stdin)
    Preview {
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    /// e.g. `set direction da-es`, `set maxNewTokens 300`
    Set { field: String, value: String },
    Reset,
}

#[derive(Subcommand, Debug)]
enum GlossaryAction {
    Show,
    Import { path: PathBuf },
    Export {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    Clear,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] traductor::config::ConfigError),
    #[error(transparent)]
    Interchange(#[from] InterchangeError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("reading stdin: {0}")]
    Stdin(#[source] std::io::Error),
    #[error("{0}")]
    Translation(String),
    #[error("backend offline at {0}")]
    Offline(String),
}

fn read_input(file: Option<&Path>) -> Result<String, CliError> {
    match file {
        Some(path) => Ok(interchange::import_text(path)?),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(CliError::Stdin)?;
            Ok(buf)
        }
    }
}

async fn translate_command(
    ctx: &AppContext,
    input: String,
    mode: TranslationMode,
    save: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<(), CliError> {
    let translation = ctx.translate(&input, mode);
    tokio::pin!(translation);
    let outcome = loop {
        tokio::select! {
            outcome = &mut translation => break outcome,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, cancelling translation");
                ctx.cancel_translation();
            }
        }
    };

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            let message = match ctx.state_machine.current().message {
                Some(StatusMessage::Error(message)) => message,
                _ => user_message(&err),
            };
            return Err(CliError::Translation(message));
        }
    };

    match out {
        Some(path) => {
            let dir = path.parent().unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("translation.txt");
            interchange::write_export(dir, name, &result.output)?;
        }
        None => println!("{}", result.output),
    }
    if let Some(dir) = save {
        let path = interchange::export_translation(&dir, result.direction, mode, &result.output)?;
        eprintln!("Saved {}", path.display());
    }
    if let Some(StatusMessage::Success(message)) = ctx.state_machine.current().message {
        eprintln!("{message}");
    }
    Ok(())
}

fn print_latencies(ctx: &AppContext) {
    for line in ctx.metrics.report_lines() {
        println!("  {line}");
    }
}

async fn status_command(ctx: &AppContext, watch: bool) -> Result<(), CliError> {
    let last_latency = || ctx.state_machine.current().last_latency_ms;
    if !watch {
        let snapshot = ctx.health.refresh_now().await;
        println!("{}", snapshot.summary_line(last_latency()));
        print_latencies(ctx);
        if snapshot.status() == BackendStatus::Offline {
            return Err(CliError::Offline(ctx.settings.snapshot().backend_url));
        }
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let mut snapshots = ctx.health.subscribe();
    let poller = ctx.start_health_poller(shutdown.clone());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = snapshots.borrow_and_update().summary_line(last_latency());
                println!("{line}");
                print_latencies(ctx);
            }
        }
    }
    shutdown.cancel();
    let _ = poller.await;
    Ok(())
}

fn config_command(ctx: &AppContext, action: ConfigAction) -> Result<(), CliError> {
    let settings = match action {
        ConfigAction::Show => ctx.settings.snapshot(),
        ConfigAction::Set { field, value } => {
            ctx.settings.update(SettingsUpdate::parse(&field, &value)?)
        }
        ConfigAction::Reset => ctx.settings.reset(),
    };
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn glossary_command(ctx: &AppContext, action: GlossaryAction) -> Result<(), CliError> {
    match action {
        GlossaryAction::Show => {
            let text = ctx.settings.snapshot().glossary_text;
            print!("{text}");
            let terms = parse_glossary(&text).map_or(0, |g| g.len());
            eprintln!("{} lines, {} terms", count_glossary_lines(&text), terms);
        }
        GlossaryAction::Import { path } => {
            let text = interchange::import_text(&path)?;
            let lines = count_glossary_lines(&text);
            ctx.settings.update(SettingsUpdate::GlossaryText(text));
            eprintln!("Imported {lines} lines from {}", path.display());
        }
        GlossaryAction::Export { dir } => {
            let settings = ctx.settings.snapshot();
            let path = interchange::export_glossary(&dir, settings.direction, &settings.glossary_text)?;
            eprintln!("Saved {}", path.display());
        }
        GlossaryAction::Clear => {
            ctx.settings.update(SettingsUpdate::GlossaryText(String::new()));
            eprintln!("Glossary cleared");
        }
    }
    Ok(())
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), CliError> {
    if let Command::Preview { file } = &cli.command {
        println!("{}", render_preview(&read_input(file.as_deref())?));
        return Ok(());
    }

    let ctx = AppContext::from_config(&config)?;
    match cli.command {
        Command::Translate {
            text,
            html,
            file,
            save,
            out,
        } => {
            let input = match text {
                Some(text) => text,
                None => read_input(file.as_deref())?,
            };
            let mode = if html {
                TranslationMode::Html
            } else {
                TranslationMode::Text
            };
            translate_command(&ctx, input, mode, save, out).await
        }
        Command::Status { watch } => status_command(&ctx, watch).await,
        Command::Config { action } => config_command(&ctx, action),
        Command::Glossary { action } => glossary_command(&ctx, action),
        Command::Preview { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match ClientConfig::from_env() {
        Ok(config) => config.with_overrides(ConfigOverrides {
            data_dir: cli.data_dir.clone(),
            ephemeral: cli.ephemeral,
            empty_input: cli.empty_input,
            log_json: cli.log_json,
        }),
        Err(e) => {
            eprintln!("{}", CliError::from(e));
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_json);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
