//! Lightweight audit logging for consent and lifecycle commands.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Value, json};

use crate::config::ensure_parent_dir;

/// Append an audit event to `~/.sophia/audit.log`.
///
/// Best-effort: a failed write is logged and never fails the calling flow.
/// Callers must not pass secrets in `details`.
pub fn log_sensitive_event(event: &str, details: Value) {
    let result = default_audit_path().and_then(|path| append_event(&path, event, details));
    if let Err(err) = result {
        crate::logging::warn(format!("audit log write failed: {err}"));
    }
}

pub(crate) fn append_event(path: &Path, event: &str, details: Value) -> anyhow::Result<()> {
    ensure_parent_dir(path)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let record = json!({
        "ts": Utc::now().to_rfc3339(),
        "event": event,
        "details": details,
    });
    writeln!(file, "{}", serde_json::to_string(&record)?)?;
    Ok(())
}

#[cfg(not(test))]
fn default_audit_path() -> anyhow::Result<PathBuf> {
    let home = crate::config::sophia_home()
        .ok_or_else(|| anyhow::anyhow!("home directory not found"))?;
    Ok(home.join("audit.log"))
}

// Unit tests exercise audited flows; keep their events out of the real home.
#[cfg(test)]
fn default_audit_path() -> anyhow::Result<PathBuf> {
    Ok(std::env::temp_dir()
        .join(format!("sophia-shell-test-{}", std::process::id()))
        .join("audit.log"))
}
