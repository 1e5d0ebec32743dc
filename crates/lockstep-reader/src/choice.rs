use std::fmt;

/// What the operator asked to do with the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorChoice {
    Acknowledge,
    Requeue,
    DeadLetter,
    Skip,
}

impl fmt::Display for OperatorChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorChoice::Acknowledge => f.write_str("complete"),
            OperatorChoice::Requeue => f.write_str("abandon"),
            OperatorChoice::DeadLetter => f.write_str("dead-letter"),
            OperatorChoice::Skip => f.write_str("skip"),
        }
    }
}

/// Result of parsing one line of operator input. An unrecognised token is
/// a request to ask again, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResult {
    Choice(OperatorChoice),
    RetryInput,
}

pub const ACTION_MENU: &str = "\
Choose an action:
  [C] Complete    - remove the message from the queue
  [A] Abandon     - return the message to the queue
  [D] Dead-letter - move the message to the dead-letter queue
  [S] Skip        - leave the message locked until the lock expires
Your choice (C/A/D/S): ";

pub const INVALID_CHOICE: &str = "Invalid choice. Enter C, A, D or S.";

pub fn parse_choice(input: &str) -> PromptResult {
    let token = input.trim().to_ascii_uppercase();
    let choice = match token.as_str() {
        "C" | "1" => OperatorChoice::Acknowledge,
        "A" | "2" => OperatorChoice::Requeue,
        "D" | "3" => OperatorChoice::DeadLetter,
        "S" | "4" => OperatorChoice::Skip,
        _ => return PromptResult::RetryInput,
    };
    PromptResult::Choice(choice)
}
