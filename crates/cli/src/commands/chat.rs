use std::io::{self, BufRead, Write};

use concierge_agent::{AgentRuntime, LoopState};
use concierge_core::{ApplicationError, Request};

use crate::commands::ask::render_recommendation;
use crate::commands::{async_runtime, live_runtime, CommandResult};

/// What one line of operator input asks the REPL to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Turn {
    Quit,
    Reset,
    Skip,
    Submit(Request),
}

/// Conversation context carried between turns. The only cross-turn state is
/// the accumulated query while an answer to a clarification is pending.
#[derive(Debug)]
pub struct ChatSession {
    trusted_only: bool,
    pending_context: Option<String>,
}

impl ChatSession {
    pub fn new(trusted_only: bool) -> Self {
        Self { trusted_only, pending_context: None }
    }

    pub fn awaiting_answer(&self) -> bool {
        self.pending_context.is_some()
    }

    pub fn prompt(&self) -> &'static str {
        if self.awaiting_answer() {
            "answer> "
        } else {
            "search> "
        }
    }

    pub fn interpret(&mut self, line: &str) -> Turn {
        let input = line.trim();
        match input.to_ascii_lowercase().as_str() {
            "q" | "quit" | "exit" => return Turn::Quit,
            "reset" => {
                self.pending_context = None;
                return Turn::Reset;
            }
            "" => return Turn::Skip,
            _ => {}
        }

        let request = match self.pending_context.as_deref() {
            Some(context) => Request::new(format!("{context} {input}")).after_clarification(),
            None => Request::new(input),
        };
        Turn::Submit(request.trusted_only(self.trusted_only))
    }

    /// Keeps the accumulated query when the agent asked a question, clears
    /// it once a recommendation was produced.
    pub fn observe(&mut self, state: &LoopState) {
        self.pending_context =
            state.needs_clarification.then(|| state.request.query.clone());
    }
}

pub fn run(trusted_only: bool) -> CommandResult {
    let agent = match live_runtime("chat") {
        Ok(agent) => agent,
        Err(failure) => return failure,
    };
    let runtime = match async_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let outcome = runtime.block_on(converse(&agent, stdin.lock(), &mut stdout, trusted_only));

    match outcome {
        Ok(turns) => CommandResult::success("chat", format!("session ended after {turns} turns")),
        Err(error) => CommandResult::failure("chat", "io", error.to_string(), 6),
    }
}

/// Drives the REPL until `q` or end of input. Returns the number of
/// requests submitted to the agent.
pub async fn converse<R, W>(
    agent: &AgentRuntime,
    input: R,
    output: &mut W,
    trusted_only: bool,
) -> io::Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut session = ChatSession::new(trusted_only);
    let mut submitted = 0;
    writeln!(output, "type a product to search, 'reset' to start over, 'q' to quit")?;

    let mut lines = input.lines();
    loop {
        write!(output, "{}", session.prompt())?;
        output.flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };

        let request = match session.interpret(&line) {
            Turn::Quit => break,
            Turn::Skip => continue,
            Turn::Reset => {
                writeln!(output, "context cleared")?;
                continue;
            }
            Turn::Submit(request) => request,
        };

        if request.clarification_rounds > 0 {
            writeln!(output, "refining search with: {}", request.query)?;
        }
        submitted += 1;

        match agent.run(request).await {
            Ok(state) => {
                session.observe(&state);
                let result = state.result();
                if state.needs_clarification {
                    writeln!(output, "? {}", result.notes.as_deref().unwrap_or_default())?;
                } else {
                    writeln!(output, "{}", render_recommendation(&result))?;
                }
            }
            Err(error) => {
                writeln!(output, "error: {}", ApplicationError::from(error))?;
            }
        }
    }

    Ok(submitted)
}

#[cfg(test)]
mod tests {
    use concierge_agent::LoopState;
    use concierge_core::{Request, ShoppingResult};

    use super::{ChatSession, Turn};

    fn clarified(query: &str) -> LoopState {
        let mut state = LoopState::new(Request::new(query));
        state.needs_clarification = true;
        state.result = Some(ShoppingResult::empty_with_note("What is your budget?"));
        state
    }

    #[test]
    fn answer_is_appended_to_pending_context() {
        let mut session = ChatSession::new(true);
        let Turn::Submit(first) = session.interpret("laptop") else {
            panic!("expected a submission");
        };
        assert_eq!(first.clarification_rounds, 0);
        assert!(first.trusted_only);

        session.observe(&clarified(&first.query));
        assert!(session.awaiting_answer());
        assert_eq!(session.prompt(), "answer> ");

        let Turn::Submit(second) = session.interpret("  under 3000 SAR ") else {
            panic!("expected a submission");
        };
        assert_eq!(second.query, "laptop under 3000 SAR");
        assert_eq!(second.clarification_rounds, 1);
    }

    #[test]
    fn recommendation_clears_context() {
        let mut session = ChatSession::new(false);
        session.observe(&clarified("phone"));
        assert!(session.awaiting_answer());

        session.observe(&LoopState::new(Request::new("phone 256gb")));
        assert!(!session.awaiting_answer());
    }

    #[test]
    fn control_words_are_recognized() {
        let mut session = ChatSession::new(false);
        session.observe(&clarified("tv"));

        assert_eq!(session.interpret("RESET"), Turn::Reset);
        assert!(!session.awaiting_answer());
        assert_eq!(session.interpret("   "), Turn::Skip);
        assert_eq!(session.interpret("q"), Turn::Quit);
    }
}
