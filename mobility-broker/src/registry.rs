//! The Subscription Registry (§4.C): for each event type, the
//! insertion-ordered set of subscriber endpoints that declared interest.

use std::collections::HashMap;

use mobility_wire::EventType;

/// Built once by [`negotiator::negotiate`](crate::negotiator::negotiate) at
/// `setup`, immutable for the run (§4.C).
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    by_type: HashMap<String, Vec<String>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `endpoint` as a subscriber of `event_type`, appending to
    /// the end of that type's list (deterministic dispatch order, §4.C).
    /// A duplicate `(event_type, endpoint)` pair is not re-added, matching
    /// "Subscription = many-to-many" without double delivery per §4.G's I4.
    pub fn subscribe(&mut self, event_type: &EventType, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        let subscribers = self.by_type.entry(event_type.as_str().to_string()).or_default();
        if !subscribers.contains(&endpoint) {
            subscribers.push(endpoint);
        }
    }

    /// The subscribers of `event_type`, in insertion order, or an empty
    /// slice if nobody subscribed.
    pub fn subscribers(&self, event_type: &EventType) -> &[String] {
        self.by_type
            .get(event_type.as_str())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_subscription_order_and_dedupes() {
        let mut reg = SubscriptionRegistry::new();
        let departed = EventType::from("DEPARTED");
        reg.subscribe(&departed, "a");
        reg.subscribe(&departed, "b");
        reg.subscribe(&departed, "a");

        assert_eq!(reg.subscribers(&departed), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unknown_type_has_no_subscribers() {
        let reg = SubscriptionRegistry::new();
        assert!(reg.subscribers(&EventType::from("ARRIVED")).is_empty());
    }
}
