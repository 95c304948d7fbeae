//! Streaming output
//!
//! The engine pushes tokens into a [`TokenAccumulator`] while a call runs.
//! The accumulator owns the text for exactly one call and decides whether
//! the call counts as a success once the engine returns.

/// One event pushed by the engine during generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamToken {
    /// A fragment of generated text
    Token(String),
    /// Generation finished normally
    Done,
    /// The engine reported an internal run error
    Error(String),
}

/// Terminal state of an accumulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccumulatorState {
    Running,
    Finished,
    Failed(String),
}

/// Result of one engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCallOutcome {
    Success(String),
    Failure(String),
}

impl EngineCallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EngineCallOutcome::Success(_))
    }
}

/// Output buffer for a single engine call
#[derive(Debug)]
pub struct TokenAccumulator {
    text: String,
    state: AccumulatorState,
}

impl TokenAccumulator {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            state: AccumulatorState::Running,
        }
    }

    /// Applies one event from the engine
    ///
    /// Events after a terminal marker are dropped.
    pub fn push(&mut self, token: StreamToken) {
        if self.state != AccumulatorState::Running {
            tracing::debug!("Ignoring {:?} after terminal state {:?}", token, self.state);
            return;
        }

        match token {
            StreamToken::Token(text) => self.text.push_str(&text),
            StreamToken::Done => self.state = AccumulatorState::Finished,
            StreamToken::Error(reason) => {
                tracing::warn!("LLM run error: {}", reason);
                self.state = AccumulatorState::Failed(reason);
            }
        }
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    /// Combines the accumulated state with the engine's return value
    ///
    /// Either an error return or an error marker yields `Failure`, and any
    /// partial text is discarded.
    pub fn into_outcome<E: std::fmt::Display>(self, run: Result<(), E>) -> EngineCallOutcome {
        if let Err(e) = run {
            return EngineCallOutcome::Failure(e.to_string());
        }
        match self.state {
            AccumulatorState::Failed(reason) => EngineCallOutcome::Failure(reason),
            AccumulatorState::Running | AccumulatorState::Finished => {
                EngineCallOutcome::Success(self.text)
            }
        }
    }
}

impl Default for TokenAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_fragments_in_order() {
        let mut acc = TokenAccumulator::new();
        acc.push(StreamToken::Token("Hi".to_string()));
        acc.push(StreamToken::Token(" there".to_string()));
        acc.push(StreamToken::Done);

        assert_eq!(acc.state(), &AccumulatorState::Finished);
        assert_eq!(
            acc.into_outcome::<String>(Ok(())),
            EngineCallOutcome::Success("Hi there".to_string())
        );
    }

    #[test]
    fn test_error_marker_discards_partial_output() {
        let mut acc = TokenAccumulator::new();
        acc.push(StreamToken::Token("partial".to_string()));
        acc.push(StreamToken::Error("npu fault".to_string()));

        assert_eq!(
            acc.into_outcome::<String>(Ok(())),
            EngineCallOutcome::Failure("npu fault".to_string())
        );
    }

    #[test]
    fn test_error_return_wins_over_finished_state() {
        let mut acc = TokenAccumulator::new();
        acc.push(StreamToken::Token("text".to_string()));
        acc.push(StreamToken::Done);

        let outcome = acc.into_outcome(Err("run returned -1"));
        assert_eq!(outcome, EngineCallOutcome::Failure("run returned -1".to_string()));
    }

    #[test]
    fn test_tokens_after_done_are_ignored() {
        let mut acc = TokenAccumulator::new();
        acc.push(StreamToken::Token("a".to_string()));
        acc.push(StreamToken::Done);
        acc.push(StreamToken::Token("b".to_string()));
        acc.push(StreamToken::Error("late".to_string()));

        assert_eq!(acc.text(), "a");
        assert_eq!(acc.state(), &AccumulatorState::Finished);
    }

    #[test]
    fn test_ok_without_done_is_success() {
        let mut acc = TokenAccumulator::new();
        acc.push(StreamToken::Token("x".to_string()));
        assert!(acc.into_outcome::<String>(Ok(())).is_success());
    }
}
