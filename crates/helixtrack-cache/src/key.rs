//! Cache key digest: a `Sha256` hash of the request four-tuple, encoded
//! with `base64` into a stable string key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use helixtrack_core::AccessRequest;
use sha2::{Digest, Sha256};

/// A stable digest of `(username, resource, resource-id, action, project-id,
/// context)`. `AccessRequest::context` is already a `BTreeMap`, so its
/// iteration order is deterministic and two requests that differ only in
/// the insertion order of equivalent context entries hash identically.
pub fn digest(request: &AccessRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.username.as_bytes());
    hasher.update(b"\0");
    hasher.update(request.resource.as_bytes());
    hasher.update(b"\0");
    hasher.update(request.resource_id.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(request.action.as_bytes());
    hasher.update(b"\0");
    hasher.update(request.project_id.as_deref().unwrap_or("").as_bytes());
    for (k, v) in &request.context {
        hasher.update(b"\0");
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
    BASE64.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalent_context_maps_hash_equally_regardless_of_insertion_order() {
        let mut a = AccessRequest::new("alice", "ticket", Some("t-1".into()), "ticketUpdate");
        a.context.insert("z".into(), "1".into());
        a.context.insert("a".into(), "2".into());

        let mut b = AccessRequest::new("alice", "ticket", Some("t-1".into()), "ticketUpdate");
        b.context.insert("a".into(), "2".into());
        b.context.insert("z".into(), "1".into());

        assert_eq!(digest(&a), digest(&b));
    }

    #[test]
    fn distinct_requests_hash_differently() {
        let a = AccessRequest::new("alice", "ticket", Some("t-1".into()), "ticketUpdate");
        let b = AccessRequest::new("bob", "ticket", Some("t-1".into()), "ticketUpdate");
        assert_ne!(digest(&a), digest(&b));
    }
}
