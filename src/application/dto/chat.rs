//! Chat request payloads.

use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::shared::error::AppError;
use crate::shared::validation::{validate_theme, validate_user_ids};

/// Default theme of new chats
pub const DEFAULT_THEME: &str = "{}";

/// Name and theme of a chat.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct ChatProps {
    #[validate(length(max = 127, message = "name must be at most 127 characters"))]
    pub name: String,

    #[validate(custom(function = validate_theme))]
    pub theme: String,
}

impl ChatProps {
    pub fn new(name: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            theme: theme.into(),
        }
    }

    /// The theme as a JSON document.
    pub fn theme_value(&self) -> Result<Value, AppError> {
        Ok(serde_json::from_str(&self.theme)?)
    }
}

impl Default for ChatProps {
    fn default() -> Self {
        Self::new("", DEFAULT_THEME)
    }
}

/// Group chat creation. The first member is the creator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct CreateGroupChat {
    #[validate(nested)]
    #[serde(flatten)]
    pub props: ChatProps,

    #[validate(
        length(min = 3, max = 31, message = "group chats have 3 to 31 members"),
        custom(function = validate_user_ids)
    )]
    pub members: Vec<String>,
}
