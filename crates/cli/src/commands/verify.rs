use clap::Args;

use outlay_core::config::LoadOptions;
use outlay_core::ExpenseId;

use crate::commands::{
    open_workflow, prepare, workflow_failure, CommandResult, EXIT_LEDGER_INVALID,
};

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    #[arg(long)]
    pub expense: String,
}

pub fn run(options: &LoadOptions, args: VerifyArgs) -> CommandResult {
    let (config, runtime) = match prepare("verify", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let expense_id = ExpenseId(args.expense);
    let result = runtime.block_on(async {
        let (pool, workflow) = open_workflow(&config).await?;
        let verification = workflow.verify_ledger(&expense_id).await;
        pool.close().await;
        verification.map_err(workflow_failure)
    });

    match result {
        Ok(verification) if verification.valid => {
            let message = format!(
                "ledger for `{}` verified ({} entries)",
                verification.expense_id, verification.verified_entries
            );
            CommandResult::success_with("verify", message, &verification)
        }
        Ok(verification) => CommandResult::failure(
            "verify",
            "ledger_verification",
            format!(
                "ledger for `{}` failed after {} entries: {}",
                verification.expense_id,
                verification.verified_entries,
                verification.failure_reason.as_deref().unwrap_or("unknown reason")
            ),
            EXIT_LEDGER_INVALID,
        ),
        Err(failure) => CommandResult::from_failure("verify", failure),
    }
}
