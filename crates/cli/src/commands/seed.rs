use outlay_core::config::LoadOptions;
use outlay_db::{migrations, CompanySeedInfo, DemoSeedDataset};

use crate::commands::{
    connect, prepare, CommandResult, Failure, EXIT_MIGRATION, EXIT_SEED_VERIFICATION,
};

pub fn run(options: &LoadOptions) -> CommandResult {
    let (config, runtime) = match prepare("seed", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED_VERIFICATION))?;

        let run_result: Result<Vec<CompanySeedInfo>, Failure> = if verification.all_present {
            Ok(seed_result.companies_seeded)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), EXIT_SEED_VERIFICATION))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(companies) => {
            let lines: Vec<String> = companies
                .iter()
                .map(|company| {
                    format!(
                        "  - {}: {} ({})",
                        company.company_id,
                        company.expense_ids.join(", "),
                        company.description
                    )
                })
                .collect();
            let message = format!(
                "demo dataset loaded for {} companies:\n{}",
                companies.len(),
                lines.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        assert_eq!(
            verification_message(&["northwind-rules", "expense-exp-ct-0001"]),
            "seed verification failed for checks: northwind-rules, expense-exp-ct-0001"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "some seed data failed to load");
    }
}
