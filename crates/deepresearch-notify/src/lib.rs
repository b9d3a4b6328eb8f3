//! # Notifier
//!
//! Best-effort desktop notification delivery. `turul-mcp-server`'s own
//! `notifications.rs` is MCP *wire-protocol* notifications (client-facing
//! JSON-RPC), not desktop notifications, so this module is supplemented from
//! the `alfredjeanlab-oddjobs` manifest, which pulls in `notify-rust` for
//! exactly this purpose. The trait shape — one method, never failing the
//! caller, graceful degradation — follows the same "optional capability, log
//! don't crash" posture applied to other best-effort subsystems (e.g.
//! `McpNotification::handle_error`).

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, warn};

/// Fire-and-forget desktop notification sink.
///
/// `notify` must never propagate an error to the caller — unreachable
/// transports degrade through a fixed chain (preferred library → platform
/// CLI → log-only) and the method resolves to a success flag that only
/// reports whether *some* step in the chain believes it got the message out.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> bool;
}

/// Default notifier: `notify-rust` → `notify-send` CLI → log-only.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn new() -> Self {
        Self
    }

    fn try_notify_rust(title: &str, body: &str) -> bool {
        notify_rust::Notification::new()
            .summary(title)
            .body(body)
            .show()
            .is_ok()
    }

    async fn try_cli_command(title: &str, body: &str) -> bool {
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            tokio::process::Command::new("notify-send")
                .arg(title)
                .arg(body)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status(),
        )
        .await;

        matches!(result, Ok(Ok(status)) if status.success())
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, title: &str, body: &str) -> bool {
        let title = title.to_string();
        let body = body.to_string();

        // The chain itself runs detached so `notify()` returns immediately
        // to the caller without waiting on any delivery step.
        tokio::spawn(async move {
            let via_library =
                tokio::task::spawn_blocking({
                    let title = title.clone();
                    let body = body.clone();
                    move || DesktopNotifier::try_notify_rust(&title, &body)
                })
                .await
                .unwrap_or(false);

            if via_library {
                debug!(%title, "notification delivered via notify-rust");
                return;
            }

            if DesktopNotifier::try_cli_command(&title, &body).await {
                debug!(%title, "notification delivered via notify-send CLI fallback");
                return;
            }

            warn!(%title, %body, "notification degraded to log-only sink");
        });

        true
    }
}

/// Test/headless notifier that only logs — useful where no desktop session
/// exists (CI, servers) and for deterministic unit tests elsewhere in the
/// workspace.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, title: &str, body: &str) -> bool {
        debug!(%title, %body, "notification (log-only sink)");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_notifier_always_succeeds() {
        let notifier = LoggingNotifier;
        assert!(notifier.notify("Task complete", "Your report is ready.").await);
    }

    #[tokio::test]
    async fn desktop_notifier_never_panics_without_a_display() {
        // In a headless CI container neither notify-rust nor notify-send
        // will succeed; the call must still resolve (degrading to the
        // log-only sink) rather than erroring out to the caller.
        let notifier = DesktopNotifier::new();
        assert!(notifier.notify("Task complete", "Your report is ready.").await);
    }
}
