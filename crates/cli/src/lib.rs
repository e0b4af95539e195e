pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use hostline_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use hostline_core::domain::decision::HumanAction;
use hostline_core::domain::operational::StaffAction;
use tracing_subscriber::EnvFilter;

use commands::decisions::HumanActionInput;
use commands::operations::ReplySource;
use commands::seed::SeedMode;

#[derive(Debug, Parser)]
#[command(
    name = "hostline",
    about = "Hostline commitment and decision engine CLI",
    long_about = "Track host promises in guest conversations, follow up on operational tasks, and \
                  decide whether reply drafts may be sent automatically.",
    after_help = "Examples:\n  hostline doctor --json\n  hostline process-sent --input message.json\n  \
                  hostline notifications --property DEMO-01\n  hostline oc mark-done oc-123 --actor staff-kim"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load demo automation statistics and policy rules")]
    Seed {
        #[arg(long, help = "Only check that the demo data is present", conflicts_with = "clean")]
        verify: bool,
        #[arg(long, help = "Remove the demo data")]
        clean: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model client readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Extract and store commitments from a sent host message (JSON input)")]
    ProcessSent {
        #[arg(long, default_value = "-", help = "Path to the message JSON, or - for stdin")]
        input: PathBuf,
    },
    #[command(about = "Show commitments, risk signals and tasks for a conversation")]
    Commitments { conversation_id: String },
    #[command(about = "Expire every active commitment of a closed conversation")]
    ExpireConversation { conversation_id: String },
    #[command(about = "Acknowledge a risk signal")]
    ResolveRisk {
        risk_signal_id: String,
        #[arg(long)]
        actor: String,
    },
    #[command(about = "Apply a guest reply to the conversation's operational commitments")]
    GuestMessage {
        conversation_id: String,
        text: String,
    },
    #[command(about = "Apply a host follow-up to the conversation's operational commitments")]
    HostFollowup {
        conversation_id: String,
        text: String,
    },
    #[command(about = "List the staff board of active operational commitments")]
    Notifications {
        #[arg(long, help = "Reference date (YYYY-MM-DD), defaults to today in UTC")]
        today: Option<NaiveDate>,
        #[arg(long = "property")]
        property_code: Option<String>,
    },
    #[command(
        about = "Apply a staff action (mark-done, confirm-resolve, reject-resolve, \
                 confirm-candidate, reject-candidate) to an operational commitment"
    )]
    Oc {
        #[arg(value_parser = parse_staff_action)]
        action: StaffAction,
        oc_id: String,
        #[arg(long)]
        actor: String,
    },
    #[command(about = "Evaluate a reply draft evidence package (JSON input)")]
    EvaluateDraft {
        #[arg(long, default_value = "-", help = "Path to the evidence package JSON, or - for stdin")]
        input: PathBuf,
    },
    #[command(about = "Record the human verdict on an evaluated draft")]
    HumanAction {
        decision_log_id: String,
        #[arg(value_parser = parse_human_action)]
        action: HumanAction,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        edited_content: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
    #[command(about = "Mark an evaluated draft as sent")]
    MarkSent {
        decision_log_id: String,
        #[arg(long)]
        final_content: String,
    },
    #[command(about = "List every decision log recorded for a draft")]
    DecisionHistory { draft_id: String },
}

fn parse_staff_action(value: &str) -> Result<StaffAction, String> {
    StaffAction::parse(value).ok_or_else(|| format!("unknown staff action `{value}`"))
}

fn parse_human_action(value: &str) -> Result<HumanAction, String> {
    HumanAction::parse(value).ok_or_else(|| format!("unknown human action `{value}`"))
}

/// Logs go to stderr so stdout stays a single JSON document. `RUST_LOG` overrides the configured
/// level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // a second initialization (tests, embedding) keeps the first subscriber
    let _ = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config.logging);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { verify, clean } => {
            let mode = match (verify, clean) {
                (_, true) => SeedMode::Clean,
                (true, false) => SeedMode::VerifyOnly,
                (false, false) => SeedMode::Load,
            };
            commands::seed::run(mode)
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::ProcessSent { input } => commands::commitments::process_sent(&input),
        Command::Commitments { conversation_id } => commands::commitments::show(&conversation_id),
        Command::ExpireConversation { conversation_id } => {
            commands::commitments::expire_conversation(&conversation_id)
        }
        Command::ResolveRisk { risk_signal_id, actor } => {
            commands::commitments::resolve_risk(&risk_signal_id, &actor)
        }
        Command::GuestMessage { conversation_id, text } => {
            commands::operations::reply(ReplySource::Guest, &conversation_id, &text)
        }
        Command::HostFollowup { conversation_id, text } => {
            commands::operations::reply(ReplySource::Host, &conversation_id, &text)
        }
        Command::Notifications { today, property_code } => {
            commands::operations::notifications(today, property_code)
        }
        Command::Oc { action, oc_id, actor } => {
            commands::operations::staff_action(action, &oc_id, &actor)
        }
        Command::EvaluateDraft { input } => commands::decisions::evaluate_draft(&input),
        Command::HumanAction { decision_log_id, action, actor, edited_content, comment } => {
            commands::decisions::human_action(HumanActionInput {
                decision_log_id,
                action,
                actor,
                edited_content,
                comment,
            })
        }
        Command::MarkSent { decision_log_id, final_content } => {
            commands::decisions::mark_sent(&decision_log_id, &final_content)
        }
        Command::DecisionHistory { draft_id } => commands::decisions::history(&draft_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use hostline_core::domain::operational::StaffAction;

    use super::{Cli, Command};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn oc_action_accepts_kebab_case() {
        let cli = Cli::try_parse_from(["hostline", "oc", "confirm-resolve", "oc-1", "--actor", "kim"])
            .expect("parse");
        match cli.command {
            Command::Oc { action, oc_id, actor } => {
                assert_eq!(action, StaffAction::ConfirmSuggestedResolve);
                assert_eq!(oc_id, "oc-1");
                assert_eq!(actor, "kim");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_human_action_is_rejected() {
        let parsed = Cli::try_parse_from([
            "hostline",
            "human-action",
            "log-1",
            "shrugged",
            "--actor",
            "kim",
        ]);
        assert!(parsed.is_err());
    }
}
