use clap::Args;

use outlay_core::config::LoadOptions;
use outlay_core::UserId;

use crate::commands::{open_workflow, prepare, workflow_failure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct InboxArgs {
    #[arg(long, help = "Manager or admin whose review queue to list")]
    pub approver: String,
}

pub fn run(options: &LoadOptions, args: InboxArgs) -> CommandResult {
    let (config, runtime) = match prepare("inbox", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let approver_id = UserId(args.approver);
    let result = runtime.block_on(async {
        let (pool, workflow) = open_workflow(&config).await?;
        let inbox = workflow.pending_for_approver(&approver_id).await;
        pool.close().await;
        inbox.map_err(workflow_failure)
    });

    match result {
        Ok(inbox) => {
            let message = format!("{} expenses waiting on `{}`", inbox.len(), approver_id);
            CommandResult::success_with("inbox", message, &inbox)
        }
        Err(failure) => CommandResult::from_failure("inbox", failure),
    }
}
