//! Service path matching.
//!
//! # Responsibilities
//! - Take the first path segment as the logical service name
//! - Strip that segment, keeping the remainder and the query string
//!
//! # Design Decisions
//! - Service names are matched case-insensitively (canonical lowercase)
//! - The remainder is forwarded byte-for-byte, no decoding or normalization
//! - An empty first segment is no route at all

use axum::http::Uri;

use crate::registry::canonical_service_name;

/// A request path split into its service and forwarded parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRoute {
    /// Canonical service name.
    pub service_name: String,
    /// The stripped prefix as it appeared in the request (`/Pedidos`).
    pub prefix: String,
    /// Path and query to send upstream, always starting with `/`.
    pub forward_path_and_query: String,
}

/// Split `/service/rest?query` into `service` and `/rest?query`.
pub fn match_service(uri: &Uri) -> Option<ServiceRoute> {
    let path = uri.path();
    let trimmed = path.strip_prefix('/').unwrap_or(path);

    let (segment, rest) = match trimmed.find('/') {
        Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
        None => (trimmed, "/"),
    };
    if segment.is_empty() {
        return None;
    }

    let mut forward = String::with_capacity(rest.len() + 16);
    forward.push_str(rest);
    if let Some(query) = uri.query() {
        forward.push('?');
        forward.push_str(query);
    }

    Some(ServiceRoute {
        service_name: canonical_service_name(segment),
        prefix: format!("/{segment}"),
        forward_path_and_query: forward,
    })
}
