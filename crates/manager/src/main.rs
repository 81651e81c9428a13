use std::io::Read;
use std::process::ExitCode;

use anyhow::{Context, bail};
use serde::Deserialize;
use serde_json::{Value, json};

use rolegate_core::IdentityId;
use rolegate_directory::InMemoryDirectory;
use rolegate_manager::{
    AssignmentRequest, ManagerConfig, ManagerError, RequestContext, RoleManager,
};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Operation {
    Validate,
    Add,
    Replace,
    Remove,
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    identity: IdentityId,
    #[serde(default)]
    actor: Option<IdentityId>,
    operation: Operation,
    #[serde(flatten)]
    request: AssignmentRequest,
}

fn main() -> ExitCode {
    rolegate_observability::init();

    let manager = match build_manager() {
        Ok(manager) => manager,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "startup failed");
            eprintln!("rolegate-check: {err:#}");
            return ExitCode::from(2);
        }
    };

    let check = match read_check() {
        Ok(check) => check,
        Err(err) => {
            eprintln!("rolegate-check: {err:#}");
            return ExitCode::from(2);
        }
    };

    let (output, code) = match run(&manager, check) {
        Ok((output, accepted)) => (output, if accepted { 0 } else { 1 }),
        Err(err) => {
            let code = match err {
                ManagerError::Config(_) | ManagerError::Catalog(_) => 2,
                _ => 1,
            };
            (error_output(&err), code)
        }
    };

    println!("{output}");
    ExitCode::from(code)
}

fn build_manager() -> anyhow::Result<RoleManager<InMemoryDirectory>> {
    let config = ManagerConfig::from_env().context("loading configuration")?;
    let Some(path) = config.directory_snapshot.as_ref() else {
        bail!("{} must point to a directory snapshot", rolegate_manager::config::DIRECTORY_SNAPSHOT_VAR);
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading directory snapshot {}", path.display()))?;
    let directory = InMemoryDirectory::from_json_str(&raw).context("loading directory snapshot")?;
    RoleManager::new(directory, config.policy).context("building role catalog")
}

fn read_check() -> anyhow::Result<CheckRequest> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("reading request from stdin")?;
    serde_json::from_str(&raw).context("parsing request")
}

/// Run one check. `Ok((output, false))` is a validation-only rejection.
fn run(
    manager: &RoleManager<InMemoryDirectory>,
    check: CheckRequest,
) -> Result<(Value, bool), ManagerError> {
    let ctx = || {
        check
            .actor
            .clone()
            .map(|actor| RequestContext::new(actor, check.identity.clone()))
            .ok_or_else(|| ManagerError::InvalidRequest("actor is required for this operation".to_string()))
    };

    let change = match check.operation {
        Operation::Validate => {
            let report = manager.validate(&check.identity, &check.request)?;
            let accepted = report.is_valid();
            let output = json!({
                "status": if accepted { "valid" } else { "rejected" },
                "messages": report.messages(),
                "report": report,
            });
            return Ok((output, accepted));
        }
        Operation::Add => manager.add_roles(&ctx()?, &check.request)?,
        Operation::Replace => manager.replace_roles(&ctx()?, &check.request)?,
        Operation::Remove => manager.remove_roles(&ctx()?, &check.request)?,
    };

    Ok((json!({ "status": "applied", "change": change }), true))
}

fn error_output(err: &ManagerError) -> Value {
    let mut output = json!({
        "status": "error",
        "error": err.code(),
        "message": err.to_string(),
        "retryable": err.is_retryable(),
    });
    match err {
        ManagerError::Rejected(report) => {
            output["status"] = json!("rejected");
            output["messages"] = json!(report.messages());
            output["report"] = json!(report);
        }
        ManagerError::PartiallyApplied { applied, .. } => {
            output["change"] = json!(applied);
        }
        _ => {}
    }
    output
}
