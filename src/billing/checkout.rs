use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

pub const PLAN_NAME: &str = "Glow AI Premium";
pub const TRIAL_DAYS: u32 = 3;
pub const MONTHLY_PRICE: &str = "$5.99";
pub const LIST_PRICE: &str = "$19.99";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// The checkout form. Every field is required; nothing else is checked.
#[derive(Debug, Clone, Default)]
pub struct PaymentDetails {
    pub card_number: String,
    pub expiry: String,
    pub cvc: String,
    pub cardholder_name: String,
}

impl PaymentDetails {
    pub fn validate(&self) -> Result<(), CheckoutError> {
        let fields = [
            ("Card number", &self.card_number),
            ("Expiry date", &self.expiry),
            ("CVC", &self.cvc),
            ("Cardholder name", &self.cardholder_name),
        ];
        for (label, value) in fields {
            if value.trim().is_empty() {
                return Err(CheckoutError::MissingField(label));
            }
        }
        Ok(())
    }

    fn card_last4(&self) -> String {
        let digits: Vec<char> = self
            .card_number
            .chars()
            .filter(|ch| ch.is_ascii_digit())
            .collect();
        let start = digits.len().saturating_sub(4);
        digits[start..].iter().collect()
    }
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub plan: &'static str,
    pub trial_days: u32,
    pub price_after_trial: &'static str,
    pub card_last4: String,
    pub confirmed_at: DateTime<Utc>,
}

/// Simulated payment processor. It never declines: once the form is
/// complete it waits a fixed delay and confirms.
#[derive(Debug, Clone)]
pub struct Checkout {
    delay: Duration,
}

impl Checkout {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub async fn process(&self, details: &PaymentDetails) -> Result<Receipt, CheckoutError> {
        details.validate()?;
        info!(
            "Processing simulated checkout for {} (delay={}ms)",
            PLAN_NAME,
            self.delay.as_millis()
        );
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Receipt {
            plan: PLAN_NAME,
            trial_days: TRIAL_DAYS,
            price_after_trial: MONTHLY_PRICE,
            card_last4: details.card_last4(),
            confirmed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> PaymentDetails {
        PaymentDetails {
            card_number: "4242 4242 4242 4242".to_string(),
            expiry: "12/29".to_string(),
            cvc: "123".to_string(),
            cardholder_name: "Sam Doe".to_string(),
        }
    }

    #[tokio::test]
    async fn complete_form_always_succeeds() {
        let receipt = Checkout::new(Duration::ZERO)
            .process(&details())
            .await
            .unwrap();
        assert_eq!(receipt.plan, PLAN_NAME);
        assert_eq!(receipt.trial_days, 3);
        assert_eq!(receipt.card_last4, "4242");
    }

    #[tokio::test]
    async fn blank_field_is_rejected() {
        let mut form = details();
        form.cvc = "  ".to_string();
        let err = Checkout::new(Duration::ZERO)
            .process(&form)
            .await
            .unwrap_err();
        assert_eq!(err, CheckoutError::MissingField("CVC"));
        assert_eq!(err.to_string(), "CVC is required");
    }
}
