//! Redirect targets returned by every issuance operation.

use crate::error::{IssuanceError, Result};

/// Named landing pages on the customer-facing site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    /// Credential issued.
    Success,
    /// Checkout abandoned, unpaid, or confirmation link rejected.
    PaymentCancel,
    /// Anything else, including identity mismatches.
    GenericCancel,
}

/// Absolute URLs for each [`Destination`].
#[derive(Clone, Debug)]
pub struct RedirectUrls {
    pub success: String,
    pub payment_cancel: String,
    pub generic_cancel: String,
    /// Where the billing portal sends the customer back to.
    pub portal_return: String,
}

impl RedirectUrls {
    /// Derive the standard pages from the site's base URL.
    pub fn from_site(site_url: &str) -> Self {
        let base = site_url.trim_end_matches('/');
        Self {
            success: format!("{base}/thanks_upgrade"),
            payment_cancel: format!("{base}/canceled_upgrade"),
            generic_cancel: format!("{base}/cancel"),
            portal_return: format!("{base}/thanks_upgrade"),
        }
    }

    pub fn url_for(&self, destination: Destination) -> &str {
        match destination {
            Destination::Success => &self.success,
            Destination::PaymentCancel => &self.payment_cancel,
            Destination::GenericCancel => &self.generic_cancel,
        }
    }

    pub fn redirect(&self, destination: Destination) -> Redirect {
        Redirect::to(self.url_for(destination))
    }

    /// Turn the outcome of an operation into the redirect the caller sees.
    ///
    /// Rejections were already logged where they were detected; only fatal
    /// errors are logged here.
    pub fn settle(&self, operation: &'static str, outcome: Result<Redirect>) -> Redirect {
        match outcome {
            Ok(redirect) => redirect,
            Err(e) => {
                match &e {
                    IssuanceError::Upstream(_)
                    | IssuanceError::Persistence(_)
                    | IssuanceError::Inconsistency { .. }
                    | IssuanceError::Config(_) => {
                        tracing::error!(operation, error = %e, "Request failed");
                    }
                    _ => {
                        tracing::info!(
                            operation,
                            reason = %e,
                            suspicious = e.is_suspicious(),
                            "Request cancelled"
                        );
                    }
                }
                self.redirect(e.destination())
            }
        }
    }
}

/// A `302 Found` the HTTP layer should answer with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    location: String,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_site_trims_trailing_slash() {
        let urls = RedirectUrls::from_site("https://example.com/");
        assert_eq!(urls.success, "https://example.com/thanks_upgrade");
        assert_eq!(urls.payment_cancel, "https://example.com/canceled_upgrade");
        assert_eq!(urls.generic_cancel, "https://example.com/cancel");
        assert_eq!(
            urls.redirect(Destination::GenericCancel).location(),
            "https://example.com/cancel"
        );
    }

    #[test]
    fn test_settle() {
        let urls = RedirectUrls::from_site("https://example.com");

        let ok = urls.settle("confirm", Ok(Redirect::to("https://pay.example/x")));
        assert_eq!(ok.location(), "https://pay.example/x");

        let unpaid = urls.settle("confirm", Err(IssuanceError::PaymentNotConfirmed));
        assert_eq!(unpaid.location(), "https://example.com/canceled_upgrade");

        let down = urls.settle("confirm", Err(IssuanceError::Upstream("down".into())));
        assert_eq!(down.location(), "https://example.com/cancel");
    }
}
