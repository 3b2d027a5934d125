//! Session replay.
//!
//! A session is JSON lines, one step each:
//!
//! ```text
//! {"op": "submit", "request": {"text": "..."}, "scorecard": {"predicted_intent": "explain", "total_score": 0.9}}
//! {"op": "edit", "request": {"filename": "a.py", "old_code": "...", "new_code": "..."}, "scorecard": {...}}
//! {"op": "edit", "request": {"filename": "a.py", "base_code": "@last", "diff": "@last", "write_token": "@last"}}
//! {"op": "state"}
//! ```
//!
//! The scorecard, when present, is what the scorer returns for that step.
//! In an apply, `@last` stands for the value from the most recent
//! successful generate. Each step prints one JSON line.

use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tenure_service::{
    AuthorityConfig, AuthorityService, EditRequest, EditResponse, GeneratedPatch, ScriptedScorer,
    SubmitRequest,
};
use tenure_types::Scorecard;
use tracing::info;

const LAST: &str = "@last";

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Submit {
        request: SubmitRequest,
        #[serde(default)]
        scorecard: Option<Scorecard>,
    },
    Edit {
        request: EditRequest,
        #[serde(default)]
        scorecard: Option<Scorecard>,
    },
    State,
}

pub async fn run(config: AuthorityConfig, session: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(session).with_context(|| format!("reading {}", session.display()))?;
    let scorer = Arc::new(ScriptedScorer::default());
    let service = AuthorityService::from_config(config, scorer.clone()).await?;

    let mut last: Option<GeneratedPatch> = None;
    let mut steps = 0usize;
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let step: Step = serde_json::from_str(line).with_context(|| format!("line {line_no}: invalid step"))?;
        let output = run_step(&service, &scorer, step, &mut last).await?;
        println!("{}", json!({ "line": line_no, "response": output }));
        steps += 1;
    }

    info!(steps, "Replay finished");
    Ok(())
}

async fn run_step(
    service: &AuthorityService,
    scorer: &ScriptedScorer,
    step: Step,
    last: &mut Option<GeneratedPatch>,
) -> anyhow::Result<Value> {
    let value = match step {
        Step::Submit { request, scorecard } => {
            if let Some(card) = scorecard {
                scorer.push(card)?;
            }
            match service.submit(request).await {
                Ok(report) => json!({ "ok": true, "report": report }),
                Err(e) => e.to_json(),
            }
        }
        Step::Edit { request, scorecard } => {
            if let Some(card) = scorecard {
                scorer.push(card)?;
            }
            match service.edit(substitute_last(request, last.as_ref())).await {
                Ok(response) => {
                    if let EditResponse::Generated(patch) = &response {
                        *last = Some(patch.clone());
                    }
                    json!({ "ok": true, "result": response })
                }
                Err(e) => e.to_json(),
            }
        }
        Step::State => json!({ "ok": true, "state": service.state().await? }),
    };
    Ok(value)
}

fn substitute_last(request: EditRequest, last: Option<&GeneratedPatch>) -> EditRequest {
    let (EditRequest::Apply(mut apply), Some(patch)) = (request.clone(), last) else {
        return request;
    };
    if apply.base_code == LAST {
        apply.base_code = patch.base_code.clone();
    }
    if apply.diff == LAST {
        apply.diff = patch.diff.clone();
    }
    if apply.write_token.as_deref() == Some(LAST) {
        apply.write_token = patch.write_token.as_ref().map(|t| t.token.clone());
    }
    if apply.filename.is_none() {
        apply.filename = Some(patch.filename.clone());
    }
    EditRequest::Apply(apply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_parse() {
        let submit: Step = serde_json::from_str(
            r#"{"op":"submit","request":{"text":"why","count_toward_progress":false},"scorecard":{"predicted_intent":"explain","total_score":0.5}}"#,
        )
        .unwrap();
        assert!(matches!(submit, Step::Submit { ref request, scorecard: Some(_) } if !request.count_toward_progress));

        let apply: Step = serde_json::from_str(
            r#"{"op":"edit","request":{"base_code":"@last","diff":"@last","write_token":"@last"}}"#,
        )
        .unwrap();
        assert!(matches!(apply, Step::Edit { request: EditRequest::Apply(_), scorecard: None }));

        let state: Step = serde_json::from_str(r#"{"op":"state"}"#).unwrap();
        assert!(matches!(state, Step::State));
    }

    #[tokio::test]
    async fn session_unlocks_then_edits() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AuthorityConfig::default();
        config.window_size = 2;
        config.patch_editing.workspace_root = dir.path().to_path_buf();

        let scorer = Arc::new(ScriptedScorer::default());
        let service = AuthorityService::from_config(config, scorer.clone()).await.unwrap();
        let mut last = None;

        let lines = [
            r#"{"op":"submit","request":{"text":"explain"},"scorecard":{"predicted_intent":"explain","total_score":0.9}}"#,
            r#"{"op":"submit","request":{"text":"explain"},"scorecard":{"predicted_intent":"explain","total_score":0.9}}"#,
            r#"{"op":"edit","request":{"filename":"m.py","old_code":"a = 1\n","new_code":"a = 2\n","requested_action":"fix_bug"},"scorecard":{"predicted_intent":"fix_bug","total_score":0.8,"code_eval":{"ok":true,"score":1.0}}}"#,
            r#"{"op":"edit","request":{"base_code":"@last","diff":"@last","write_token":"@last","requested_action":"fix_bug"},"scorecard":{"predicted_intent":"fix_bug","total_score":0.8}}"#,
        ];

        let mut outputs = Vec::new();
        for line in lines {
            let step: Step = serde_json::from_str(line).unwrap();
            outputs.push(run_step(&service, &scorer, step, &mut last).await.unwrap());
        }

        assert_eq!(outputs[0]["error"], "capability_locked");
        assert_eq!(outputs[1]["ok"], true);
        assert_eq!(outputs[2]["result"]["mode"], "generated");
        assert_eq!(outputs[3]["result"]["mode"], "applied");
        assert_eq!(std::fs::read_to_string(dir.path().join("m.py")).unwrap(), "a = 2\n");
    }
}
