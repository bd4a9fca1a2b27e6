//! Route and header constants for the integration surface.

pub const INTEGRATION_WEBHOOK_ENDPOINT: &str = "/integration/webhook";
pub const INTEGRATION_SYNC_ENDPOINT: &str = "/integration/sync";
pub const INTEGRATION_CREATE_ENDPOINT: &str = "/integration/create";
pub const INTEGRATION_STATUS_ENDPOINT: &str = "/integration/status";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "linear-signature";
pub const DEFAULT_INTEGRATION_BIND: &str = "127.0.0.1:3141";
