pub mod checkout;
pub mod gate;
pub mod tier;

pub use checkout::{Checkout, CheckoutError, PaymentDetails, Receipt};
pub use gate::{UsageGate, UsagePolicy, UsageRecord};
pub use tier::{Tier, TierStore};
