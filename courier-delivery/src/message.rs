//! Request and message value types

use serde::{Deserialize, Serialize};

/// A caller's request to deliver one message.
///
/// The sender is not part of the request; it is derived from whichever
/// provider ends up carrying the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Caller-supplied key for duplicate suppression, see
    /// [`IdempotentDispatcher`](crate::IdempotentDispatcher)
    #[serde(default)]
    pub request_id: Option<String>,
}

impl SendRequest {
    #[must_use]
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            request_id: None,
        }
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// The message handed to a provider for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Message {
    /// Build the message a given provider will carry, using the provider's
    /// identity as the sender.
    #[must_use]
    pub fn for_provider(request: &SendRequest, provider: &str) -> Self {
        Self {
            sender: provider.to_string(),
            recipient: request.recipient.clone(),
            subject: request.subject.clone(),
            body: request.body.clone(),
        }
    }
}
