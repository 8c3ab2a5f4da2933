use clap::Args;

use outlay_core::config::LoadOptions;
use outlay_core::ExpenseId;

use crate::commands::{open_workflow, prepare, workflow_failure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct StateArgs {
    #[arg(long)]
    pub expense: String,
}

pub fn run(options: &LoadOptions, args: StateArgs) -> CommandResult {
    let (config, runtime) = match prepare("state", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let expense_id = ExpenseId(args.expense);
    let result = runtime.block_on(async {
        let (pool, workflow) = open_workflow(&config).await?;
        let state = workflow.workflow_state(&expense_id).await;
        pool.close().await;
        state.map_err(workflow_failure)
    });

    match result {
        Ok(state) => {
            let waiting_on = state
                .eligible_next_approvers
                .iter()
                .map(|approver_id| approver_id.0.as_str())
                .collect::<Vec<_>>();
            let message = if waiting_on.is_empty() {
                format!("expense `{}` is {}", state.expense_id, state.status.as_str())
            } else {
                format!(
                    "expense `{}` is {}; waiting on {}",
                    state.expense_id,
                    state.status.as_str(),
                    waiting_on.join(", ")
                )
            };
            CommandResult::success_with("state", message, &state)
        }
        Err(failure) => CommandResult::from_failure("state", failure),
    }
}
