use clap::Args;

use outlay_core::config::LoadOptions;
use outlay_core::UserId;

use crate::commands::{open_workflow, prepare, workflow_failure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct ExpensesArgs {
    #[arg(long, help = "User whose submitted expenses to list, newest first")]
    pub submitter: String,
}

pub fn run(options: &LoadOptions, args: ExpensesArgs) -> CommandResult {
    let (config, runtime) = match prepare("expenses", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let submitter_id = UserId(args.submitter);
    let result = runtime.block_on(async {
        let (pool, workflow) = open_workflow(&config).await?;
        let history = workflow.expenses_submitted_by(&submitter_id).await;
        pool.close().await;
        history.map_err(workflow_failure)
    });

    match result {
        Ok(history) => {
            let message = format!("{} expenses submitted by `{}`", history.len(), submitter_id);
            CommandResult::success_with("expenses", message, &history)
        }
        Err(failure) => CommandResult::from_failure("expenses", failure),
    }
}
