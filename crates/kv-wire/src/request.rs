//! Client request/response payloads exchanged coordinator↔client and
//! coordinator↔storage.

use serde::{Deserialize, Serialize};

/// `{"request": [op, ...args], "request_hash": int32, "forwarded": bool}`.
///
/// `op` is `"get"`, `"put"`, or `"set"`; `args` holds the key (and value, for
/// `put`/`set`). `forwarded` distinguishes a fresh client request (the
/// coordinator must verify its hash and fan it out to the replica set) from
/// a copy the coordinator already fanned out to a replica (which must just
/// be executed against local storage and answered, never fanned out again —
/// the replica set includes the coordinating node itself often enough that
/// without this flag a self-addressed fan-out would recurse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub request: Vec<String>,
    pub request_hash: i32,
    #[serde(default)]
    pub forwarded: bool,
}

impl RequestPayload {
    pub fn new(request: Vec<String>, request_hash: i32) -> Self {
        RequestPayload {
            request,
            request_hash,
            forwarded: false,
        }
    }

    pub fn op(&self) -> Option<&str> {
        self.request.first().map(String::as_str)
    }

    pub fn key(&self) -> Option<&str> {
        self.request.get(1).map(String::as_str)
    }

    pub fn value(&self) -> Option<&str> {
        self.request.get(2).map(String::as_str)
    }

    pub fn forwarded(&self) -> bool {
        self.forwarded
    }

    /// A copy of this request marked as already routed to a replica.
    pub fn as_forwarded(&self) -> Self {
        RequestPayload {
            forwarded: true,
            ..self.clone()
        }
    }
}

/// `{"status": bool, "description": ..., "request_hash": int32}`.
///
/// `description` is a free-form JSON value: a `[value, version]` pair on a
/// successful `get`, an empty array for a miss, or a string reason on
/// failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub status: bool,
    pub description: serde_json::Value,
    pub request_hash: i32,
}

impl ResponsePayload {
    pub fn success(description: serde_json::Value, request_hash: i32) -> Self {
        ResponsePayload {
            status: true,
            description,
            request_hash,
        }
    }

    pub fn failure(reason: impl Into<String>, request_hash: i32) -> Self {
        ResponsePayload {
            status: false,
            description: serde_json::Value::String(reason.into()),
            request_hash,
        }
    }
}

/// Compute the non-keyed 32-bit request hash over `(client_addr, request)`.
///
/// This mirrors the source's `mmh3.hash((client_addr, request))` call; as
/// §9 notes, collisions are possible, so callers must key pending state on
/// `(client_addr, request_hash)`, never `request_hash` alone.
pub fn request_hash(client_addr: &str, request: &[String]) -> i32 {
    let mut buf = String::with_capacity(client_addr.len() + 8 * request.len());
    buf.push_str(client_addr);
    for part in request {
        buf.push('\u{0}');
        buf.push_str(part);
    }
    crate::hash::murmur3_32(buf.as_bytes(), 0) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_hash_is_deterministic() {
        let req = vec!["get".to_owned(), "alpha".to_owned()];
        let a = request_hash("127.0.0.1:1234", &req);
        let b = request_hash("127.0.0.1:1234", &req);
        assert_eq!(a, b);
    }

    #[test]
    fn request_hash_differs_by_client() {
        let req = vec!["get".to_owned(), "alpha".to_owned()];
        let a = request_hash("127.0.0.1:1234", &req);
        let b = request_hash("127.0.0.1:5678", &req);
        assert_ne!(a, b);
    }

    #[test]
    fn request_payload_accessors() {
        let req = RequestPayload::new(
            vec!["put".to_owned(), "k".to_owned(), "v".to_owned()],
            7,
        );
        assert_eq!(req.op(), Some("put"));
        assert_eq!(req.key(), Some("k"));
        assert_eq!(req.value(), Some("v"));
    }

    #[test]
    fn response_payload_round_trips_json() {
        let resp = ResponsePayload::success(serde_json::json!(["v", 1]), 42);
        let json = serde_json::to_string(&resp).unwrap();
        let back: ResponsePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }
}
