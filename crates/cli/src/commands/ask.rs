//! `agentgate ask`: Run one synchronous turn.

use std::fmt::Write as _;
use std::sync::Arc;

use agentgate_agent::{ContextComposer, TurnRequest, TurnResult, TurnRunner, TurnSettings, TurnStatus};
use agentgate_config::AppConfig;
use agentgate_memory::NoopStore;
use agentgate_session::SessionHub;

pub async fn run(
    message: String,
    session: Option<String>,
    thinking: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let runner = build_runner(&config)?;

    let mut request = TurnRequest::new(message).with_thinking(thinking);
    if let Some(session) = session {
        request = request.with_session(session);
    }

    eprint!("  Thinking...");
    let result = runner.invoke(request).await?;
    eprint!("\r              \r");
    tracing::debug!(session = %result.session_id, status = ?result.status, "Turn finished");

    print!("{}", render(&result));

    if result.status == TurnStatus::Error {
        return Err(result.error.unwrap_or_else(|| "turn failed".into()).into());
    }
    Ok(())
}

/// A one-shot runner: nothing outlives the process, so extracted
/// artifacts and memories are not persisted.
pub fn build_runner(config: &AppConfig) -> agentgate_core::Result<TurnRunner> {
    let backend = agentgate_backends::build_from_config(config)?;
    let store = Arc::new(NoopStore);

    Ok(
        TurnRunner::new(backend, Arc::new(SessionHub::default()), TurnSettings::from_config(config))
            .with_composer(ContextComposer::from_config(config))
            .with_artifact_store(store.clone())
            .with_memory_store(store),
    )
}

/// Human-readable summary of a turn.
pub fn render(result: &TurnResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", result.response);

    if let Some(pending) = &result.interrupt {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Approval required for '{}': {}", pending.tool, pending.reason);
        let _ = writeln!(out, "  Input: {}", pending.input);
        let _ = writeln!(out, "  Session: {}", result.session_id);
    }

    if !result.artifacts.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "  Artifacts:");
        for artifact in &result.artifacts {
            let _ = writeln!(
                out,
                "    - {} [{} / {}]",
                artifact.title,
                artifact.language,
                artifact.kind.as_str()
            );
        }
    }

    if let Some(error) = &result.error {
        let _ = writeln!(out, "  Error: {error}");
    }

    let _ = writeln!(
        out,
        "  Tokens: {} in / {} out",
        result.usage.input_tokens, result.usage.output_tokens
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_turn_renders_artifacts() {
        let runner = build_runner(&AppConfig::default()).unwrap();
        let result = runner
            .invoke(TurnRequest::new("write some code").with_session("cli"))
            .await
            .unwrap();

        let text = render(&result);
        assert!(text.starts_with("You said: write some code"));
        assert!(text.contains("- greet [py / code]"));
        assert!(text.contains("Tokens:"));
    }

    #[tokio::test]
    async fn interrupted_turn_mentions_approval() {
        let runner = build_runner(&AppConfig::default()).unwrap();
        let result = runner.invoke(TurnRequest::new("delete it")).await.unwrap();

        let text = render(&result);
        assert!(text.contains("Approval required for 'delete_file'"));
    }
}
