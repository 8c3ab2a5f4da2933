use clap::{Args, Subcommand};

use outlay_core::config::LoadOptions;
use outlay_core::{CompanyId, ManagerAssignment, Role, RoleAssignment, UserId};

use crate::commands::{open_workflow, prepare, workflow_failure, CommandResult};

#[derive(Debug, Clone, Subcommand)]
pub enum UsersCommand {
    #[command(about = "List a company's users with their roles and managers")]
    List {
        #[arg(long)]
        company: String,
    },
    #[command(about = "Change a user's role (admins only, never their own)")]
    Role(RoleArgs),
    #[command(about = "Assign or clear the manager a user reports to (admins only)")]
    Manager(ManagerArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RoleArgs {
    #[arg(long, help = "Admin making the change")]
    pub actor: String,
    #[arg(long)]
    pub user: String,
    #[arg(long, help = "employee | manager | admin")]
    pub role: Role,
}

#[derive(Debug, Clone, Args)]
pub struct ManagerArgs {
    #[arg(long, help = "Admin making the change")]
    pub actor: String,
    #[arg(long)]
    pub user: String,
    #[arg(long, help = "Manager or admin of the same company; omit to clear")]
    pub manager: Option<String>,
}

pub fn run(options: &LoadOptions, command: UsersCommand) -> CommandResult {
    let (config, runtime) = match prepare("users", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    runtime.block_on(async {
        let (pool, workflow) = match open_workflow(&config).await {
            Ok(opened) => opened,
            Err(failure) => return CommandResult::from_failure("users", failure),
        };

        let result = match command {
            UsersCommand::List { company } => {
                let company_id = CompanyId(company);
                match workflow.list_users(&company_id).await {
                    Ok(users) => CommandResult::success_with(
                        "users",
                        format!("{} users in `{company_id}`", users.len()),
                        &users,
                    ),
                    Err(error) => CommandResult::from_failure("users", workflow_failure(error)),
                }
            }
            UsersCommand::Role(args) => {
                let assignment = RoleAssignment {
                    actor_id: UserId(args.actor),
                    user_id: UserId(args.user),
                    role: args.role,
                };
                match workflow.assign_role(assignment).await {
                    Ok(user) => CommandResult::success_with(
                        "users",
                        format!("`{}` is now {}", user.id, user.role.as_str()),
                        &user,
                    ),
                    Err(error) => CommandResult::from_failure("users", workflow_failure(error)),
                }
            }
            UsersCommand::Manager(args) => {
                let assignment = ManagerAssignment {
                    actor_id: UserId(args.actor),
                    user_id: UserId(args.user),
                    manager_id: args.manager.map(UserId),
                };
                match workflow.assign_manager(assignment).await {
                    Ok(user) => {
                        let message = match &user.manager_id {
                            Some(manager_id) => {
                                format!("`{}` now reports to `{manager_id}`", user.id)
                            }
                            None => format!("`{}` has no manager", user.id),
                        };
                        CommandResult::success_with("users", message, &user)
                    }
                    Err(error) => CommandResult::from_failure("users", workflow_failure(error)),
                }
            }
        };

        pool.close().await;
        result
    })
}
