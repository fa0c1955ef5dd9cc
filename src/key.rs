//! Request key used for coalescing.
//!
//! Two buffered requests with an equal key may share one transfer. The retry
//! policy participates in the key by *reference identity* — two requests
//! using different policy instances are never coalesced, even if every other
//! field matches, since a shared transfer would otherwise have to pick one
//! policy's retry state over the other's.

use crate::retry::RetryPolicy;
use bytes::Bytes;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone)]
pub struct RequestKey {
    url: String,
    offset: u64,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    policy_identity: usize,
    // Kept alive so `policy_identity` (an address) cannot be reused by an
    // unrelated, later-allocated policy while this key lives in the index.
    _policy: Arc<dyn RetryPolicy>,
}

impl RequestKey {
    pub fn new(
        url: String,
        offset: u64,
        headers: Vec<(String, String)>,
        body: Option<Bytes>,
        policy: Arc<dyn RetryPolicy>,
    ) -> Self {
        // Headers participate in the key in call order, not sorted: a
        // request with headers "A: 1, B: 2" is a distinct logical request
        // from one with "B: 2, A: 1".
        let policy_identity = Arc::as_ptr(&policy) as *const () as usize;
        Self {
            url,
            offset,
            headers,
            body,
            policy_identity,
            _policy: policy,
        }
    }
}

impl PartialEq for RequestKey {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.offset == other.offset
            && self.headers == other.headers
            && self.body == other.body
            && self.policy_identity == other.policy_identity
    }
}

impl Eq for RequestKey {}

impl Hash for RequestKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.offset.hash(state);
        self.headers.hash(state);
        self.body.hash(state);
        self.policy_identity.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::NeverRetry;
    use std::collections::HashMap;

    #[test]
    fn equal_fields_and_policy_identity_coalesce() {
        let policy: Arc<dyn RetryPolicy> = Arc::new(NeverRetry);
        let k1 = RequestKey::new(
            "https://h/x".into(),
            0,
            vec![("A".into(), "1".into())],
            None,
            policy.clone(),
        );
        let k2 = RequestKey::new(
            "https://h/x".into(),
            0,
            vec![("A".into(), "1".into())],
            None,
            policy,
        );
        assert_eq!(k1, k2);

        let mut map = HashMap::new();
        map.insert(k1, "first");
        assert_eq!(map.get(&k2), Some(&"first"));
    }

    #[test]
    fn different_policy_instances_do_not_coalesce() {
        let p1: Arc<dyn RetryPolicy> = Arc::new(NeverRetry);
        let p2: Arc<dyn RetryPolicy> = Arc::new(NeverRetry);
        let k1 = RequestKey::new("https://h/x".into(), 0, vec![], None, p1);
        let k2 = RequestKey::new("https://h/x".into(), 0, vec![], None, p2);
        assert_ne!(k1, k2);
    }

    #[test]
    fn header_order_distinguishes_keys() {
        let policy: Arc<dyn RetryPolicy> = Arc::new(NeverRetry);
        let k1 = RequestKey::new(
            "https://h/x".into(),
            0,
            vec![("A".into(), "1".into()), ("B".into(), "2".into())],
            None,
            policy.clone(),
        );
        let k2 = RequestKey::new(
            "https://h/x".into(),
            0,
            vec![("B".into(), "2".into()), ("A".into(), "1".into())],
            None,
            policy,
        );
        assert_ne!(k1, k2);
    }
}
