use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Function => "function",
        }
    }
}

/// One message in the conversation log. Identity is position in the
/// transcript; a turn is never mutated after it is appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Set only for function-role turns: the function that produced the result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Turn {
    pub fn is_completion(&self) -> bool {
        matches!(self.role, Role::Assistant | Role::Function)
    }
}

/// Append-only ordered log of turns, owned per conversation for the
/// lifetime of the process.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_system(&mut self, content: impl Into<String>) {
        self.turns.push(Turn { role: Role::System, content: content.into(), name: None });
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn { role: Role::User, content: content.into(), name: None });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn { role: Role::Assistant, content: content.into(), name: None });
    }

    pub fn push_function(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::Function,
            content: content.into(),
            name: Some(name.into()),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Number of completed interactions: assistant and function turns.
    /// The UI projection must hold exactly this many finalized fragments.
    pub fn completed_interactions(&self) -> usize {
        self.turns.iter().filter(|turn| turn.is_completion()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, Transcript};

    #[test]
    fn turns_keep_append_order() {
        let mut transcript = Transcript::new();
        transcript.push_user("show me customers");
        transcript.push_function("get_customers", "[Got 2 customers]");
        transcript.push_user("thanks");
        transcript.push_assistant("You're welcome.");

        let roles: Vec<Role> = transcript.turns().iter().map(|turn| turn.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Function, Role::User, Role::Assistant]);
    }

    #[test]
    fn function_turns_carry_their_function_name() {
        let mut transcript = Transcript::new();
        transcript.push_function("get_products", "[Got 3 products]");

        let turn = &transcript.turns()[0];
        assert_eq!(turn.name.as_deref(), Some("get_products"));
        assert_eq!(turn.role, Role::Function);
    }

    #[test]
    fn completed_interactions_counts_assistant_and_function_turns_only() {
        let mut transcript = Transcript::new();
        transcript.push_system("prompt");
        transcript.push_user("hello");
        transcript.push_assistant("hi");
        transcript.push_user("list products");
        transcript.push_function("get_products", "[Got 1 products]");

        assert_eq!(transcript.completed_interactions(), 2);
    }
}
