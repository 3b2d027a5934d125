//! One-shot commands

use anyhow::{bail, Context};
use serde_json::json;
use std::path::Path;
use tenure_audit::{verify_chain, AuditStore, QueryWindow, SqliteAuditStore};
use tenure_diff::{DiffEngine, DiffStats};
use tenure_service::AuthorityConfig;

pub fn check_config(config: &AuthorityConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    eprintln!("configuration is valid");
    Ok(())
}

pub fn diff(old: &Path, new: &Path, label: Option<&str>, stats: bool) -> anyhow::Result<()> {
    let old_text = read(old)?;
    let new_text = read(new)?;

    let engine = match label {
        Some(label) => DiffEngine::new().with_filename(label),
        None => DiffEngine::new(),
    };
    let diff = engine.generate(&old_text, &new_text);
    print!("{diff}");

    if stats {
        let s = DiffStats::from_diff(&diff);
        eprintln!(
            "additions={} deletions={} total_changes={}",
            s.additions, s.deletions, s.total_changes
        );
    }
    Ok(())
}

pub fn apply(base: &Path, diff: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let base_text = read(base)?;
    let diff_text = read(diff)?;

    let new_text = match tenure_diff::apply(&base_text, &diff_text) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("{}", serde_json::to_string_pretty(&json!({ "ok": false, "details": e }))?);
            bail!("patch does not apply: {e}");
        }
    };

    match output {
        Some(path) => std::fs::write(path, new_text).with_context(|| format!("writing {}", path.display()))?,
        None => print!("{new_text}"),
    }
    Ok(())
}

pub async fn audit(database_url: &str, limit: usize) -> anyhow::Result<()> {
    let store = SqliteAuditStore::connect(database_url).await?;
    let progress = store.get_aggregate_progress().await?;
    let records = store.list_audit(QueryWindow::default()).await?;
    let chain = verify_chain(&records);

    let recent: Vec<_> = records.iter().take(limit).collect();
    let body = json!({
        "progress": {
            "sample_count": progress.sample_count,
            "cumulative_score": progress.cumulative_score,
            "mean_score": progress.mean_score(),
            "updated_at": progress.updated_at,
        },
        "total_records": records.len(),
        "chain_ok": chain.is_ok(),
        "recent": recent,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);

    if let Err(e) = chain {
        bail!("{e}");
    }
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
