pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use outlay_core::config::{ConfigOverrides, LoadOptions, LogFormat};

use commands::decide::DecideArgs;
use commands::expenses::ExpensesArgs;
use commands::inbox::InboxArgs;
use commands::rules::RulesCommand;
use commands::state::StateArgs;
use commands::submit::SubmitArgs;
use commands::users::UsersCommand;
use commands::verify::VerifyArgs;

#[derive(Debug, Parser)]
#[command(
    name = "outlay",
    about = "Outlay expense approval CLI",
    long_about = "Operate the Outlay approval workflow: migrations, demo data, rule configuration, \
                  expense submission, approver decisions, user administration and ledger \
                  verification.",
    after_help = "Examples:\n  outlay migrate\n  outlay seed\n  \
        outlay decide --expense exp-nw-0001 --approver nw-mgr-sales --verdict approved\n  \
        outlay state --expense exp-nw-0001"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Config file path (defaults to outlay.toml)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, help = "Override logging.format (compact | pretty | json)")]
    log_format: Option<LogFormat>,
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                log_format: self.log_format,
                ledger_signing_key: None,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the demo directory, rules and expenses, then verify them")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Open an expense for approval")]
    Submit(SubmitArgs),
    #[command(about = "Record an approver's decision and re-evaluate the expense")]
    Decide(DecideArgs),
    #[command(about = "Show an expense's status, rule outcomes and eligible next approvers")]
    State(StateArgs),
    #[command(about = "List pending expenses waiting on an approver")]
    Inbox(InboxArgs),
    #[command(about = "List a submitter's expenses with approval progress, newest first")]
    Expenses(ExpensesArgs),
    #[command(subcommand, about = "Manage a company's approval rules")]
    Rules(RulesCommand),
    #[command(subcommand, about = "List users and change roles or managers")]
    Users(UsersCommand),
    #[command(about = "Verify an expense's decision ledger chain and signatures")]
    Verify(VerifyArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();
    logging::init(&options);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Submit(args) => commands::submit::run(&options, args),
        Command::Decide(args) => commands::decide::run(&options, args),
        Command::State(args) => commands::state::run(&options, args),
        Command::Inbox(args) => commands::inbox::run(&options, args),
        Command::Expenses(args) => commands::expenses::run(&options, args),
        Command::Rules(command) => commands::rules::run(&options, command),
        Command::Users(command) => commands::users::run(&options, command),
        Command::Verify(args) => commands::verify::run(&options, args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
