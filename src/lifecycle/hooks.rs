//! Concurrent execution of registry on-ready hooks

use super::health::{HealthRegistry, HealthStatus};
use crate::di::{tokens, InitHook, ResourceRegistry};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;

/// Outcome of one [`InitHookExecutor::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl HookReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs on-ready hooks concurrently.
///
/// Every hook is spawned as its own task, so one hook failing (or panicking)
/// never cancels or delays the others. Failures are logged and recorded in the
/// [`HealthRegistry`] when the registry provides one; [`run`](Self::run) itself
/// never fails.
pub struct InitHookExecutor;

impl InitHookExecutor {
    pub async fn run(registry: &ResourceRegistry, hooks: Vec<InitHook>) -> HookReport {
        let mut report = HookReport::default();
        if hooks.is_empty() {
            return report;
        }

        let health = registry.resolve::<HealthRegistry>(tokens::HEALTH).ok();
        tracing::info!("Running {} init hooks...", hooks.len());

        let mut tasks = JoinSet::new();
        for hook in hooks {
            let name = hook.name().to_string();
            if let Some(health) = &health {
                health.report(&component_name(&name), HealthStatus::Starting, None);
            }
            let registry = registry.clone();
            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(hook.call(registry)).catch_unwind().await;
                (name, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (name, outcome) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    tracing::error!(error = %e, "Init hook task did not complete");
                    continue;
                }
            };

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => {
                    tracing::error!(
                        hook = %name,
                        error = %e,
                        stack = ?e,
                        "Error occurred while executing onInitiate hook"
                    );
                    Some(e.to_string())
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(
                        hook = %name,
                        error = %message,
                        stack = "panic",
                        "Error occurred while executing onInitiate hook"
                    );
                    Some(message)
                }
            };

            match failure {
                None => {
                    tracing::debug!("Init hook '{}' completed", name);
                    if let Some(health) = &health {
                        health.mark_healthy(&component_name(&name));
                    }
                    report.succeeded.push(name);
                }
                Some(message) => {
                    if let Some(health) = &health {
                        health.mark_failed(&component_name(&name), message);
                    }
                    report.failed.push(name);
                }
            }
        }

        tracing::info!(
            "Init hooks complete ({} succeeded, {} failed)",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }
}

fn component_name(hook: &str) -> String {
    format!("hook:{}", hook)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
