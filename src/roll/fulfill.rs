use super::dice::Denomination;
use super::{RResult, RollError};
use crate::common::Int;
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Where die results come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum FulfillmentMethod {
    #[default]
    Prng,
    /// Typed in by a user.
    Manual,
    /// A registered hardware or companion-app integration.
    Custom(String),
}

impl FulfillmentMethod {
    pub fn is_external(&self) -> bool {
        *self != Self::Prng
    }
}

impl fmt::Display for FulfillmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prng => f.write_str("prng"),
            Self::Manual => f.write_str("manual"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

impl From<String> for FulfillmentMethod {
    fn from(s: String) -> Self {
        match s.as_str() {
            "" | "prng" => Self::Prng,
            "manual" => Self::Manual,
            _ => Self::Custom(s),
        }
    }
}

impl From<FulfillmentMethod> for String {
    fn from(method: FulfillmentMethod) -> Self {
        method.to_string()
    }
}

/// Which method fulfills each denomination, keyed by labels such as `d20`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FulfillmentConfig {
    pub methods: HashMap<String, FulfillmentMethod>,
    pub default_method: FulfillmentMethod,
    /// How long to wait for an external result before falling back to the
    /// PRNG. Waits forever when unset.
    pub timeout_ms: Option<u64>,
}

impl FulfillmentConfig {
    pub fn with_method(mut self, denomination: Denomination, method: FulfillmentMethod) -> Self {
        self.methods.insert(denomination.label(), method);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn method_for(&self, denomination: Denomination) -> &FulfillmentMethod {
        self.methods
            .get(&denomination.label())
            .unwrap_or(&self.default_method)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug)]
struct Pending {
    method: FulfillmentMethod,
    denomination: Denomination,
    sender: oneshot::Sender<Int>,
}

/// The channel through which external actors supply die results to
/// evaluations waiting on them. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct ResultRegistry {
    pending: Arc<Mutex<Vec<Pending>>>,
}

impl ResultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn request(
        &self,
        method: FulfillmentMethod,
        denomination: Denomination,
    ) -> oneshot::Receiver<Int> {
        let (sender, receiver) = oneshot::channel();
        debug!(%method, denomination = %denomination.label(), "awaiting external result");
        self.lock().push(Pending {
            method,
            denomination,
            sender,
        });
        receiver
    }

    /// Supplies one result to the oldest evaluation waiting on `method` and
    /// `denomination`. Returns `false` if nothing was waiting.
    pub fn register_result(
        &self,
        method: &FulfillmentMethod,
        denomination: &str,
        result: Int,
    ) -> RResult<bool> {
        let invalid = || RollError::InvalidResult {
            denomination: denomination.to_string(),
            result,
        };
        let denom: Denomination = denomination.parse().map_err(|_| invalid())?;
        if !denom.contains(result) {
            return Err(invalid());
        }

        let mut pending = self.lock();
        pending.retain(|p| !p.sender.is_canceled());
        while let Some(i) = pending
            .iter()
            .position(|p| p.method == *method && p.denomination == denom)
        {
            if pending.remove(i).sender.send(result).is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The `(method, denomination)` pairs currently waiting, oldest first.
    pub fn pending(&self) -> Vec<(FulfillmentMethod, String)> {
        self.lock()
            .iter()
            .filter(|p| !p.sender.is_canceled())
            .map(|p| (p.method.clone(), p.denomination.label()))
            .collect()
    }

    /// Drops every waiting request; their evaluations fail as cancelled.
    pub fn cancel_all(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_register_without_request() {
        let registry = ResultRegistry::new();
        assert!(!registry.register_result(&FulfillmentMethod::Manual, "d6", 3).unwrap());
    }

    #[test]
    fn test_register_feeds_oldest_request() {
        let registry = ResultRegistry::new();
        let first = registry.request(FulfillmentMethod::Manual, Denomination::standard(20));
        let second = registry.request(FulfillmentMethod::Manual, Denomination::standard(20));
        assert_eq!(registry.pending().len(), 2);

        assert!(registry.register_result(&FulfillmentMethod::Manual, "d20", 17).unwrap());
        assert_eq!(first.now_or_never(), Some(Ok(17)));
        assert_eq!(registry.pending(), vec![(FulfillmentMethod::Manual, "d20".to_string())]);

        // wrong method
        assert!(!registry.register_result(&FulfillmentMethod::Prng, "d20", 2).unwrap());
        drop(second);
        assert!(!registry.register_result(&FulfillmentMethod::Manual, "d20", 2).unwrap());
    }

    #[test]
    fn test_register_rejects_out_of_range() {
        let registry = ResultRegistry::new();
        assert!(matches!(
            registry.register_result(&FulfillmentMethod::Manual, "d6", 7),
            Err(RollError::InvalidResult { result: 7, .. })
        ));
        assert!(registry.register_result(&FulfillmentMethod::Manual, "dF", -1).is_ok());
        assert!(registry.register_result(&FulfillmentMethod::Manual, "d", 1).is_err());
    }

    #[test]
    fn test_cancel_all() {
        let registry = ResultRegistry::new();
        let rx = registry.request(FulfillmentMethod::Manual, Denomination::Coin);
        registry.cancel_all();
        assert!(matches!(rx.now_or_never(), Some(Err(oneshot::Canceled))));
    }

    #[test]
    fn test_config() {
        let config = FulfillmentConfig::default()
            .with_method(Denomination::standard(20), FulfillmentMethod::Manual);
        assert_eq!(config.method_for(Denomination::standard(20)), &FulfillmentMethod::Manual);
        assert_eq!(config.method_for(Denomination::standard(6)), &FulfillmentMethod::Prng);

        let config: FulfillmentConfig =
            serde_json::from_str(r#"{"methods": {"d6": "pixels"}, "timeoutMs": 50}"#).unwrap();
        assert_eq!(
            config.method_for(Denomination::standard(6)),
            &FulfillmentMethod::Custom("pixels".into())
        );
        assert_eq!(config.timeout(), Some(Duration::from_millis(50)));
    }
}
