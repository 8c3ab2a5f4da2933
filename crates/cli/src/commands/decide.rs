use clap::Args;

use outlay_core::config::LoadOptions;
use outlay_core::{DecisionCommand, ExpenseId, UserId, Verdict};

use crate::commands::{open_workflow, prepare, workflow_failure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct DecideArgs {
    #[arg(long)]
    pub expense: String,
    #[arg(long)]
    pub approver: String,
    #[arg(long, help = "approved | rejected")]
    pub verdict: Verdict,
    #[arg(long)]
    pub comment: Option<String>,
}

pub fn run(options: &LoadOptions, args: DecideArgs) -> CommandResult {
    let (config, runtime) = match prepare("decide", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let command = DecisionCommand {
        expense_id: ExpenseId(args.expense),
        approver_id: UserId(args.approver),
        verdict: args.verdict,
        comment: args.comment,
    };
    let result = runtime.block_on(async {
        let (pool, workflow) = open_workflow(&config).await?;
        let receipt = workflow.submit_decision(command).await;
        pool.close().await;
        receipt.map_err(workflow_failure)
    });

    match result {
        Ok(receipt) => {
            let message = format!(
                "decision {} recorded on `{}`; expense is {}",
                receipt.decision.sequence,
                receipt.expense_id,
                receipt.status.as_str()
            );
            CommandResult::success_with("decide", message, &receipt)
        }
        Err(failure) => CommandResult::from_failure("decide", failure),
    }
}
