//! Provider data structure passed to resources and data sources

use crate::backend::Backend;
use plugkit::types::Diagnostic;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Renewal interval used when the provider configuration leaves it unset.
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct CornerProviderData {
    pub backend: Arc<Backend>,
    pub renew_interval: Duration,
}

impl CornerProviderData {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            renew_interval: DEFAULT_RENEW_INTERVAL,
        }
    }

    pub fn with_renew_interval(mut self, interval: Duration) -> Self {
        self.renew_interval = interval;
        self
    }

    /// Recovers the provider data handed to a configure hook. Absent data is
    /// not an error: validation runs before the provider is configured.
    pub fn from_any(
        data: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Result<Option<Self>, Diagnostic> {
        match data {
            None => Ok(None),
            Some(data) => match data.downcast::<CornerProviderData>() {
                Ok(data) => Ok(Some(data.as_ref().clone())),
                Err(_) => Err(Diagnostic::error(
                    "Unexpected Provider Data Type",
                    "Expected CornerProviderData. This is always a bug in the provider.",
                )),
            },
        }
    }
}

pub fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "Provider data was not properly configured",
    )
}
