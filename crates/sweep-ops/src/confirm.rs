//! Confirmation phrase gate for destructive operations.

use sweep_core::{Mode, ValidationError};

/// Authorizes a start request by comparing the typed phrase with the one the
/// mode requires.
///
/// The comparison is case-insensitive but otherwise exact. The gate never
/// clears the typed text; callers do that after every start attempt, see
/// [`ConfirmationInput::take`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmationGate;

impl ConfirmationGate {
    pub fn new() -> Self {
        Self
    }

    /// Check if `token` authorizes `mode`.
    pub fn authorize(&self, mode: Mode, token: &str) -> bool {
        token.to_uppercase() == mode.required_phrase()
    }

    /// Like [`authorize`](Self::authorize), returning the mismatch as an error.
    pub fn check(&self, mode: Mode, token: &str) -> Result<(), ValidationError> {
        if self.authorize(mode, token) {
            Ok(())
        } else {
            Err(ValidationError::phrase_mismatch(mode))
        }
    }
}

/// Text buffer holding the phrase as the user types it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmationInput {
    text: String,
}

impl ConfirmationInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the typed text.
    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn push(&mut self, c: char) {
        self.text.push(c);
    }

    pub fn backspace(&mut self) {
        self.text.pop();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether the current text would authorize `mode`.
    pub fn matches(&self, mode: Mode) -> bool {
        ConfirmationGate.authorize(mode, &self.text)
    }

    /// Take the typed text, leaving the buffer empty.
    ///
    /// Use this for every start attempt so a stale phrase can never be
    /// submitted twice.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

impl From<&str> for ConfirmationInput {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_exact_phrase() {
        let gate = ConfirmationGate::new();
        assert!(gate.authorize(Mode::Messages, "DELETE"));
        assert!(gate.authorize(Mode::Servers, "LEAVE"));
        assert!(gate.authorize(Mode::Identity, "REMOVE"));
    }

    #[test]
    fn test_authorize_is_case_normalized() {
        let gate = ConfirmationGate::new();
        assert!(gate.authorize(Mode::Messages, "delete"));
        assert!(gate.authorize(Mode::Messages, "DeLeTe"));
        assert!(!gate.authorize(Mode::Servers, "delete"));
    }

    #[test]
    fn test_authorize_rejects_near_misses() {
        let gate = ConfirmationGate::new();
        assert!(!gate.authorize(Mode::Messages, ""));
        assert!(!gate.authorize(Mode::Messages, "DELET"));
        assert!(!gate.authorize(Mode::Messages, " DELETE"));
        assert!(!gate.authorize(Mode::Messages, "DELETE "));
        assert!(!gate.authorize(Mode::Messages, "REMOVE"));
    }

    #[test]
    fn test_check_reports_expected_phrase() {
        let err = ConfirmationGate::new()
            .check(Mode::Identity, "remove me")
            .unwrap_err();
        assert_eq!(err.expected, "REMOVE");
        assert_eq!(err.mode, Mode::Identity);
    }

    #[test]
    fn test_input_take_clears() {
        let mut input = ConfirmationInput::new();
        for c in "leave".chars() {
            input.push(c);
        }
        assert!(input.matches(Mode::Servers));

        let typed = input.take();
        assert_eq!(typed, "leave");
        assert!(input.is_empty());
        assert!(!input.matches(Mode::Servers));
    }

    #[test]
    fn test_input_backspace() {
        let mut input = ConfirmationInput::from("DELETEE");
        assert!(!input.matches(Mode::Messages));
        input.backspace();
        assert!(input.matches(Mode::Messages));
    }
}
