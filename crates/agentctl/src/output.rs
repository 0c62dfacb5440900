//! Terminal output formatting - clean, ASCII-only, professional

use agent_common::AgentError;
use owo_colors::OwoColorize;

/// Print a successful answer.
pub fn display_answer(answer: &str) {
    println!("{}", answer);
}

/// Print a failure with a plain-language explanation.
pub fn display_error(err: &AgentError) {
    eprintln!("{}", user_message(err).bright_red());
}

/// Map an internal error to a sentence a user can act on. Never leaks
/// serde or reqwest debug text at this layer.
pub fn user_message(err: &AgentError) -> String {
    match err {
        AgentError::InvalidQuery => "Please enter a question.".to_string(),
        AgentError::UnparsableExpression(text) => format!(
            "I was unable to determine a calculation from \"{}\". Could you rephrase it?",
            text
        ),
        AgentError::DivisionByZero(expr) => format!(
            "The calculation \"{}\" divides by zero, which has no defined result.",
            expr
        ),
        AgentError::Overflow(bound) => format!(
            "That calculation exceeds the largest magnitude I handle safely ({:e}).",
            bound
        ),
        AgentError::SearchUnavailable(reason) => format!(
            "I could not fetch current data for that ({}). Please try again shortly.",
            reason
        ),
        AgentError::ExtractionFailed => {
            "Search results came back, but I could not find a usable number in them.".to_string()
        }
        AgentError::NoToolCallFound => {
            "I could not work out which tool that needs. Could you rephrase the question?"
                .to_string()
        }
        AgentError::IncompleteToolCall { tool, argument } => format!(
            "The {} step was missing its \"{}\" input, so I stopped rather than guess.",
            tool, argument
        ),
        AgentError::LlmUnavailable(reason) => format!(
            "The language model is not reachable ({}). Check that Ollama is running.",
            reason
        ),
        AgentError::Config(reason) => format!("Configuration problem: {}", reason),
        AgentError::Http(_) | AgentError::Json(_) | AgentError::Io(_) => {
            "An internal error occurred while handling that query.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparsable_message_echoes_input() {
        let msg = user_message(&AgentError::UnparsableExpression("hello there".to_string()));
        assert!(msg.contains("hello there"));
        assert!(msg.contains("unable to determine"));
    }

    #[test]
    fn test_search_unavailable_mentions_current_data() {
        let msg = user_message(&AgentError::SearchUnavailable("request timed out".to_string()));
        assert!(msg.contains("could not fetch current data"));
        assert!(msg.contains("request timed out"));
    }

    #[test]
    fn test_division_by_zero_names_expression() {
        let msg = user_message(&AgentError::DivisionByZero("10 / 0".to_string()));
        assert!(msg.contains("10 / 0"));
    }
}
