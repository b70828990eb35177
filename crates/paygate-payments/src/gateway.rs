//! Payment Gateway
//!
//! The checkout, status and billing-portal calls this crate needs from the
//! payment processor. [`StripeGateway`] implements them with Stripe Checkout
//! (Hosted) in subscription mode.

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    BillingPortalSession, CheckoutSession as StripeCheckoutSession, CheckoutSessionId,
    CheckoutSessionMode, Client, CreateBillingPortalSession, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CustomerId, ListPrices, Price,
};

use crate::error::{IssuanceError, Result};

/// Parameters for a hosted checkout session
#[derive(Clone, Debug)]
pub struct CheckoutParams {
    /// Resolved price id
    pub price_id: String,

    /// Success URL, still containing the session id placeholder
    pub success_url: String,

    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,

    /// Purchasing identity, recorded on the session for reconciliation
    pub requester: String,
}

/// Result of creating a checkout session
#[derive(Clone, Debug)]
pub struct CheckoutSession {
    /// Processor session id
    pub id: String,

    /// Hosted checkout page
    pub url: String,
}

/// Payment state of a checkout session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    Unknown(String),
}

impl PaymentStatus {
    pub fn from_gateway(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            "unpaid" => PaymentStatus::Unpaid,
            "no_payment_required" => PaymentStatus::NoPaymentRequired,
            other => PaymentStatus::Unknown(other.to_string()),
        }
    }

    /// Only an explicit `paid` counts; a free checkout is not a payment.
    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }
}

/// What the gateway reports for a checkout session
#[derive(Clone, Debug)]
pub struct SessionStatus {
    pub payment_status: PaymentStatus,

    /// Customer created or attached by the checkout, if any
    pub customer_id: Option<String>,
}

/// Payment processor operations
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Resolve a price lookup key to a price id
    async fn resolve_price(&self, lookup_key: &str) -> Result<Option<String>>;

    /// Create a hosted checkout session
    async fn create_checkout_session(&self, params: CheckoutParams) -> Result<CheckoutSession>;

    /// Current payment status of a checkout session
    async fn session_status(&self, session_id: &str) -> Result<SessionStatus>;

    /// Create a self-service billing portal session, returning its URL
    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String>;
}

fn upstream(e: stripe::StripeError) -> IssuanceError {
    IssuanceError::Upstream(format!("Stripe: {e}"))
}

/// Stripe-backed gateway
pub struct StripeGateway {
    client: Client,
}

impl StripeGateway {
    /// Create a new Stripe gateway
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn resolve_price(&self, lookup_key: &str) -> Result<Option<String>> {
        let mut params = ListPrices::new();
        params.lookup_keys = Some(vec![lookup_key.to_string()]);
        params.active = Some(true);
        params.limit = Some(1);

        let prices = Price::list(&self.client, &params).await.map_err(upstream)?;

        Ok(prices.data.into_iter().next().map(|price| price.id.to_string()))
    }

    async fn create_checkout_session(&self, request: CheckoutParams) -> Result<CheckoutSession> {
        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.client_reference_id = Some(&request.requester);

        let mut metadata = HashMap::new();
        metadata.insert("requester".to_string(), request.requester.clone());
        params.metadata = Some(metadata);

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(upstream)?;

        let url = session
            .url
            .ok_or_else(|| IssuanceError::Upstream("No checkout URL returned".into()))?;

        Ok(CheckoutSession {
            id: session.id.to_string(),
            url,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus> {
        let id: CheckoutSessionId = session_id
            .parse()
            .map_err(|_| IssuanceError::Validation(format!("bad session id: {session_id}")))?;

        let session = StripeCheckoutSession::retrieve(&self.client, &id, &[])
            .await
            .map_err(upstream)?;

        Ok(SessionStatus {
            payment_status: PaymentStatus::from_gateway(session.payment_status.as_str()),
            customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
        })
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String> {
        let customer: CustomerId = customer_id
            .parse()
            .map_err(|_| IssuanceError::Upstream(format!("bad customer id: {customer_id}")))?;

        let mut params = CreateBillingPortalSession::new(customer);
        params.return_url = Some(return_url);

        let session = BillingPortalSession::create(&self.client, params)
            .await
            .map_err(upstream)?;

        Ok(session.url)
    }
}
