use concierge_agent::{AgentRuntime, LoopState};
use concierge_core::{ApplicationError, Request, ShoppingResult};

use crate::commands::{async_runtime, live_runtime, CommandResult, RunSummary};

pub fn run(query: &str, trusted_only: bool, json_output: bool) -> CommandResult {
    if query.trim().is_empty() {
        return CommandResult::failure("ask", "empty_query", "shopping query must not be empty", 2);
    }

    let agent = match live_runtime("ask") {
        Ok(agent) => agent,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("ask") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let request = Request::new(query.trim()).trusted_only(trusted_only);
    runtime.block_on(execute(&agent, request, json_output))
}

/// Runs one request and renders the outcome. Exit code 5 means the intent
/// could not be resolved.
pub async fn execute(agent: &AgentRuntime, request: Request, json_output: bool) -> CommandResult {
    match agent.run(request).await {
        Ok(state) => CommandResult { exit_code: 0, output: render(&state, json_output) },
        Err(error) => {
            let message = ApplicationError::from(error).to_string();
            CommandResult::failure("ask", "intent_resolution", message, 5)
        }
    }
}

pub fn render(state: &LoopState, json_output: bool) -> String {
    let summary = RunSummary::from(state);
    if json_output {
        return serde_json::to_string_pretty(&summary).unwrap_or_else(|error| {
            format!("{{\"status\":\"error\",\"message\":\"summary serialization failed: {error}\"}}")
        });
    }

    if summary.needs_clarification {
        let question = summary.result.notes.as_deref().unwrap_or_default();
        return format!("? {question}");
    }

    let mut lines = vec![render_recommendation(&summary.result)];
    if !summary.errors.is_empty() {
        lines.push(format!("({} steps, {} recovered errors)", summary.steps, summary.errors.len()));
        lines.extend(summary.errors.iter().map(|error| format!("  ! {error}")));
    }
    lines.join("\n")
}

pub(crate) fn render_recommendation(result: &ShoppingResult) -> String {
    let mut lines = Vec::new();
    if let Some(notes) = result.notes.as_deref() {
        lines.push(format!("note: {notes}"));
    }

    let Some(best) = result.items.first() else {
        if lines.is_empty() {
            lines.push("no recommendation".to_string());
        }
        return lines.join("\n");
    };

    let offer = &best.offer;
    let price = offer.effective_price().unwrap_or(offer.price);
    lines.push("recommendation:".to_string());
    lines.push(format!("  {}", offer.name));
    lines.push(format!("  {price:.2} SAR | {} | {}", offer.retailer, offer.condition_or_unknown()));
    if !best.reason.is_empty() {
        lines.push(format!("  why: {}", best.reason));
    }
    lines.push(format!("  {}", offer.link));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use concierge_agent::LoopState;
    use concierge_core::{Condition, Offer, Request, SelectedOffer, ShoppingResult};

    use super::render;

    fn finished_state() -> LoopState {
        let mut state = LoopState::new(Request::new("iphone 15 pro max"));
        state.step_count = 3;
        let mut offer =
            Offer::new("iPhone 15 Pro Max", 4_899.0, "SAR", "Jarir", "https://jarir.example/p", "search")
                .with_condition(Condition::New);
        offer.price_sar = Some(4_899.0);
        state.result = Some(ShoppingResult {
            items: vec![SelectedOffer { offer, reason: "Trusted and cheapest".to_string() }],
            notes: None,
        });
        state
    }

    #[test]
    fn human_render_shows_best_offer() {
        let output = render(&finished_state(), false);

        assert!(output.contains("iPhone 15 Pro Max"));
        assert!(output.contains("4899.00 SAR | Jarir | New"));
        assert!(output.contains("why: Trusted and cheapest"));
        assert!(output.contains("https://jarir.example/p"));
    }

    #[test]
    fn json_render_carries_run_summary() {
        let output = render(&finished_state(), true);
        let payload: serde_json::Value = serde_json::from_str(&output).expect("valid json");

        assert_eq!(payload["query"], "iphone 15 pro max");
        assert_eq!(payload["steps"], 3);
        assert_eq!(payload["needs_clarification"], false);
        assert_eq!(payload["result"]["items"][0]["retailer"], "Jarir");
        assert_eq!(payload["result"]["items"][0]["reason"], "Trusted and cheapest");
    }

    #[test]
    fn clarification_renders_question_only() {
        let mut state = LoopState::new(Request::new("phone"));
        state.needs_clarification = true;
        state.result = Some(ShoppingResult::empty_with_note("What is your budget in SAR?"));

        assert_eq!(render(&state, false), "? What is your budget in SAR?");
    }
}
