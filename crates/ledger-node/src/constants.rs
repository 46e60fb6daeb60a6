pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:3001";
pub(crate) const DEFAULT_KEY_FILE: &str = "node/wallet/private_key";
/// Upper bound on one peer round trip. A slow peer only delays its own delivery.
pub(crate) const PEER_TIMEOUT_SECS: u64 = 10;
