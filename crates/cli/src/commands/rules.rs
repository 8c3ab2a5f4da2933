use clap::{Args, Subcommand};
use rust_decimal::Decimal;

use outlay_core::config::LoadOptions;
use outlay_core::{CompanyId, NewApprovalRule, RuleId, RuleType, UserId};

use crate::commands::{open_workflow, prepare, workflow_failure, CommandResult};

#[derive(Debug, Clone, Subcommand)]
pub enum RulesCommand {
    #[command(about = "List a company's approval rules in evaluation order")]
    List {
        #[arg(long)]
        company: String,
    },
    #[command(about = "Add an approval rule after the company's existing rules")]
    Add(AddRuleArgs),
    #[command(about = "Remove an approval rule")]
    Remove {
        #[arg(long)]
        rule: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct AddRuleArgs {
    #[arg(long)]
    pub company: String,
    #[arg(long = "type", help = "percentage | specific_approver | hybrid")]
    pub rule_type: RuleType,
    #[arg(long, help = "Share of the approver roster that must approve, 0 to 100")]
    pub threshold: Option<Decimal>,
    #[arg(long, help = "Manager or admin whose approval settles the rule")]
    pub approver: Option<String>,
    #[arg(long, help = "Hold other decisions until the submitter's manager has decided")]
    pub sequential: bool,
}

impl AddRuleArgs {
    fn into_new_rule(self) -> NewApprovalRule {
        NewApprovalRule {
            company_id: CompanyId(self.company),
            rule_type: self.rule_type,
            threshold_pct: self.threshold,
            specific_approver_id: self.approver.map(UserId),
            is_sequential: self.sequential,
        }
    }
}

pub fn run(options: &LoadOptions, command: RulesCommand) -> CommandResult {
    let (config, runtime) = match prepare("rules", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    runtime.block_on(async {
        let (pool, workflow) = match open_workflow(&config).await {
            Ok(opened) => opened,
            Err(failure) => return CommandResult::from_failure("rules", failure),
        };

        let result = match command {
            RulesCommand::List { company } => {
                let company_id = CompanyId(company);
                match workflow.list_rules(&company_id).await {
                    Ok(rules) => CommandResult::success_with(
                        "rules",
                        format!("{} rules configured for `{company_id}`", rules.len()),
                        &rules,
                    ),
                    Err(error) => CommandResult::from_failure("rules", workflow_failure(error)),
                }
            }
            RulesCommand::Add(args) => match workflow.configure_rule(args.into_new_rule()).await {
                Ok(rule) => CommandResult::success_with(
                    "rules",
                    format!("rule `{}` added at position {}", rule.id, rule.position),
                    &rule,
                ),
                Err(error) => CommandResult::from_failure("rules", workflow_failure(error)),
            },
            RulesCommand::Remove { rule } => match workflow.remove_rule(&RuleId(rule)).await {
                Ok(removed) => CommandResult::success_with(
                    "rules",
                    format!("rule `{}` removed", removed.id),
                    &removed,
                ),
                Err(error) => CommandResult::from_failure("rules", workflow_failure(error)),
            },
        };

        pool.close().await;
        result
    })
}
