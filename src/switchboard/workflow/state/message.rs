// SPDX-License-Identifier: MIT

//! Conversation messages kept in `messages`-typed state fields

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod roles {
    pub const USER: &str = "user";
    pub const ASSISTANT: &str = "assistant";
    pub const SYSTEM: &str = "system";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(roles::USER, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(roles::ASSISTANT, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(roles::SYSTEM, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == roles::USER
    }

    pub(crate) fn is_message_value(value: &Value) -> bool {
        value.get("role").is_some_and(Value::is_string)
            && value.get("content").is_some_and(Value::is_string)
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Self {
        serde_json::json!({ "role": message.role, "content": message.content })
    }
}
