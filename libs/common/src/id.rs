use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = wayfarer_common::id::prefixed_ulid("sub");
/// assert!(id.starts_with("sub_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    /// STOMP subscription ids.
    pub const SUBSCRIPTION: &str = "sub";
    /// STOMP receipt ids requested on DISCONNECT.
    pub const RECEIPT: &str = "rcpt";
}
