use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;

use outlay_core::config::LoadOptions;
use outlay_core::{NewExpense, UserId};

use crate::commands::{open_workflow, prepare, workflow_failure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[arg(long, help = "Id of the employee submitting the expense")]
    pub submitter: String,
    #[arg(long)]
    pub description: String,
    #[arg(long, default_value = "general")]
    pub category: String,
    #[arg(long, help = "Amount in the company currency")]
    pub amount: Decimal,
    #[arg(long, default_value = "USD")]
    pub currency: String,
    #[arg(long, help = "Amount as spent, when it differs from the company currency")]
    pub original_amount: Option<Decimal>,
    #[arg(long, requires = "original_amount")]
    pub original_currency: Option<String>,
    #[arg(long, help = "Date the expense was incurred (YYYY-MM-DD)")]
    pub date: NaiveDate,
}

impl SubmitArgs {
    fn into_new_expense(self) -> NewExpense {
        NewExpense {
            submitter_id: UserId(self.submitter),
            description: self.description,
            category: self.category,
            amount: self.amount,
            currency: self.currency,
            original_amount: self.original_amount,
            original_currency: self.original_currency,
            expense_date: self.date,
        }
    }
}

pub fn run(options: &LoadOptions, args: SubmitArgs) -> CommandResult {
    let (config, runtime) = match prepare("submit", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, workflow) = open_workflow(&config).await?;
        let opened = workflow.open_expense(args.into_new_expense()).await;
        pool.close().await;
        opened.map_err(workflow_failure)
    });

    match result {
        Ok(expense) => {
            let message = format!("expense `{}` opened for approval", expense.id);
            CommandResult::success_with("submit", message, &expense)
        }
        Err(failure) => CommandResult::from_failure("submit", failure),
    }
}
