//! Caller-facing rendering of a send result

use core::fmt;

use courier_delivery::{DeliveryError, DeliveryOutcome, DeliveryStatus};

pub const DELIVERED: &str = "Email sent successfully!";
pub const FAILED: &str = "Failed to send email after retries.";
pub const CANCELLED: &str = "Email delivery cancelled.";

/// Status code and message reported for one request.
///
/// The outcome is kept for diagnostics only; `message` never carries attempt
/// counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub message: String,
    pub outcome: Option<DeliveryOutcome>,
}

impl Response {
    #[must_use]
    pub fn from_result(result: &Result<DeliveryOutcome, DeliveryError>) -> Self {
        match result {
            Ok(outcome) => {
                let (status, message) = match outcome.status {
                    DeliveryStatus::Delivered => (200, DELIVERED),
                    DeliveryStatus::Failed => (500, FAILED),
                    DeliveryStatus::Cancelled => (503, CANCELLED),
                };

                Self {
                    status,
                    message: message.to_string(),
                    outcome: Some(outcome.clone()),
                }
            }
            Err(error @ DeliveryError::Duplicate(_)) => Self {
                status: 409,
                message: error.to_string(),
                outcome: None,
            },
            Err(error @ DeliveryError::Configuration(_)) => Self {
                status: 500,
                message: format!("Error sending email: {error}"),
                outcome: None,
            },
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

#[cfg(test)]
mod tests {
    use courier_delivery::ConfigurationError;
    use pretty_assertions::assert_eq;

    use super::*;

    fn outcome(status: DeliveryStatus, attempts_made: u32) -> DeliveryOutcome {
        DeliveryOutcome {
            status,
            attempts_made,
            provider_used: "user2@example.com".to_string(),
            used_fallback: attempts_made > 2,
            history: Vec::new(),
        }
    }

    #[test]
    fn test_delivered() {
        let response = Response::from_result(&Ok(outcome(DeliveryStatus::Delivered, 1)));

        assert_eq!(response.status, 200);
        assert_eq!(response.message, DELIVERED);
        assert!(response.is_success());
        assert_eq!(response.to_string(), "200 Email sent successfully!");
    }

    #[test]
    fn test_failed_hides_attempt_count() {
        let response = Response::from_result(&Ok(outcome(DeliveryStatus::Failed, 3)));

        assert_eq!(response.status, 500);
        assert_eq!(response.message, FAILED);
        assert!(!response.message.contains('3'));
        assert!(!response.is_success());
        assert_eq!(response.outcome.map(|o| o.attempts_made), Some(3));
    }

    #[test]
    fn test_cancelled() {
        let response = Response::from_result(&Ok(outcome(DeliveryStatus::Cancelled, 1)));

        assert_eq!(response.status, 503);
        assert_eq!(response.message, CANCELLED);
    }

    #[test]
    fn test_configuration_error() {
        let error = DeliveryError::from(ConfigurationError::TooFewProviders {
            found: 1,
            required: 2,
        });
        let response = Response::from_result(&Err(error));

        assert_eq!(response.status, 500);
        assert_eq!(
            response.message,
            "Error sending email: Configuration error: At least 2 providers are required, found 1"
        );
        assert!(response.outcome.is_none());
    }

    #[test]
    fn test_duplicate() {
        let response =
            Response::from_result(&Err(DeliveryError::Duplicate("order-42".to_string())));

        assert_eq!(response.status, 409);
        assert_eq!(response.message, "Duplicate request: order-42");
    }
}
