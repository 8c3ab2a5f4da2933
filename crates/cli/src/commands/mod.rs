pub mod config;
pub mod decide;
pub mod expenses;
pub mod inbox;
pub mod migrate;
pub mod rules;
pub mod seed;
pub mod state;
pub mod submit;
pub mod users;
pub mod verify;

use std::sync::Arc;

use outlay_core::audit::TracingAuditSink;
use outlay_core::config::{AppConfig, LoadOptions};
use outlay_core::errors::{ApplicationError, InterfaceError, WorkflowError};
use outlay_core::{DecisionLedger, WorkflowController};
use outlay_db::{connect_with_config, sql_ports, DbPool};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::runtime::Runtime;

/// `(error_class, message, exit_code)` carried out of an async command body.
pub type Failure = (&'static str, String, u8);

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_SEED_VERIFICATION: u8 = 6;
pub const EXIT_BAD_REQUEST: u8 = 7;
pub const EXIT_CONFLICT: u8 = 8;
pub const EXIT_INTERNAL: u8 = 9;
pub const EXIT_LEDGER_INVALID: u8 = 10;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: impl Serialize) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), EXIT_INTERNAL)
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: Some(data),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_failure(command: &str, (error_class, message, exit_code): Failure) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\
             \"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Loads configuration and builds the single-threaded runtime every command runs on.
pub(crate) fn prepare(
    command: &str,
    options: &LoadOptions,
) -> Result<(AppConfig, Runtime), CommandResult> {
    let config = AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            )
        })?;

    Ok((config, runtime))
}

pub(crate) async fn connect(config: &AppConfig) -> Result<DbPool, Failure> {
    connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))
}

/// A controller over the configured database, auditing through `tracing`.
pub(crate) async fn open_workflow(
    config: &AppConfig,
) -> Result<(DbPool, WorkflowController), Failure> {
    let pool = connect(config).await?;
    let ledger = DecisionLedger::new(config.ledger.signing_key.expose_secret().as_bytes());
    let workflow = WorkflowController::new(sql_ports(pool.clone()), ledger)
        .with_audit_sink(Arc::new(TracingAuditSink));
    Ok((pool, workflow))
}

/// Maps a workflow failure onto the interface error classes and their exit codes.
pub(crate) fn workflow_failure(error: WorkflowError) -> Failure {
    match InterfaceError::from(ApplicationError::from(error)) {
        InterfaceError::BadRequest { code, message, .. } => (code, message, EXIT_BAD_REQUEST),
        InterfaceError::Conflict { code, message, .. } => (code, message, EXIT_CONFLICT),
        InterfaceError::ServiceUnavailable { message, .. } => {
            ("persistence", message, EXIT_DATABASE)
        }
        InterfaceError::Internal { message, .. } => ("internal", message, EXIT_INTERNAL),
    }
}

#[cfg(test)]
mod tests {
    use outlay_core::{ExpenseId, ExpenseStatus, UserId, Verdict, WorkflowError};

    use super::{workflow_failure, CommandResult, EXIT_BAD_REQUEST, EXIT_CONFLICT};

    #[test]
    fn failure_payload_carries_error_class() {
        let result = CommandResult::failure("decide", "duplicate_decision", "already decided", 8);
        let payload: serde_json::Value =
            serde_json::from_str(&result.output).expect("payload is JSON");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "duplicate_decision");
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn workflow_errors_map_to_interface_exit_codes() {
        let (class, _, code) = workflow_failure(WorkflowError::ExpenseAlreadyFinalized {
            expense_id: ExpenseId("EXP-1".to_string()),
            status: ExpenseStatus::Approved,
        });
        assert_eq!((class, code), ("expense_already_finalized", EXIT_CONFLICT));

        let (class, _, code) = workflow_failure(WorkflowError::DuplicateDecision {
            expense_id: ExpenseId("EXP-1".to_string()),
            approver_id: UserId("mgr".to_string()),
            existing: Verdict::Approved,
        });
        assert_eq!((class, code), ("duplicate_decision", EXIT_CONFLICT));

        let (class, _, code) = workflow_failure(WorkflowError::UnknownUser(UserId("x".into())));
        assert_eq!((class, code), ("unknown_user", EXIT_BAD_REQUEST));
    }
}
