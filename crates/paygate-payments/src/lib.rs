//! # paygate-payments
//!
//! Payment-gated issuance of paid-tier API credentials.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  302   ┌─────────────────┐  302   ┌──────────────────────┐
//! │  /create-   │──────▶│  Stripe Hosted  │──────▶│  /create-api-key/    │
//! │  checkout-  │        │  Checkout Page  │        │  {session}/{token}   │
//! │  session    │        └─────────────────┘        └──────────┬───────────┘
//! └──────┬──────┘                                             │
//!        │ put intent                    status == paid?      │
//!        ▼                               token matches?       ▼
//! ┌─────────────┐                        single-winner claim  ┌─────────────┐
//! │ SessionStore│◀──────────────────────────────────────────▶│  Registry   │
//! └─────────────┘          mark issued (last)                 │  mint+plan  │
//!                                                             └─────────────┘
//! ```
//!
//! A credential is issued only when the payment processor reports the
//! checkout as paid, the one-time token bound into the success URL matches,
//! and this request wins the conditional claim on the intent. Replays and
//! concurrent duplicates are rejected and logged on the `paygate::fraud`
//! target.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use paygate_payments::{IssuanceConfig, IssuanceService, MemoryStore, RedirectUrls, StripeGateway};
//!
//! let store = Arc::new(MemoryStore::new());
//! let service = IssuanceService::new(
//!     Arc::new(StripeGateway::new("sk_test_xxx")),
//!     registry,
//!     store.clone(),
//!     store,
//!     IssuanceConfig::new("https://api.example.com", RedirectUrls::from_site("https://example.com"), "plan_1"),
//! );
//!
//! let redirect = service.initiate_checkout("pro-monthly", "alice").await?;
//! // 302 to redirect.location()
//! ```

mod config;
mod credential;
mod error;
mod gateway;
mod issuance;
mod portal;
mod redirect;
mod registry;
mod store;
mod token;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{CONFIRM_PATH, IssuanceConfig, SESSION_ID_PLACEHOLDER};
pub use credential::{CredentialSecret, IssuedCredential, MintedCredential, Tier};
pub use error::{IssuanceError, ReplayKind, Result};
pub use gateway::{
    CheckoutParams, CheckoutSession, PaymentGateway, PaymentStatus, SessionStatus, StripeGateway,
};
pub use issuance::{FRAUD_TARGET, IssuanceService};
pub use portal::AccessController;
pub use redirect::{Destination, Redirect, RedirectUrls};
pub use registry::{
    CredentialRegistry, HttpCredentialRegistry, MemoryCredentialRegistry, RegistryConfig,
};
#[cfg(feature = "postgres")]
pub use store::{PgStore, TableNames};
pub use store::{
    ClaimOutcome, CredentialStore, MarkOutcome, MemoryStore, PurchaseIntent, SessionStore,
};
pub use token::OneTimeToken;
