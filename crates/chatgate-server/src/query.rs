use chatgate_core::ChatMessage;

/// Builds the message list submitted upstream for one accepted message
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    system_prompt: Option<String>,
}

impl QueryBuilder {
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn build(&self, text: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.push(ChatMessage::user(text));
        messages
    }
}
