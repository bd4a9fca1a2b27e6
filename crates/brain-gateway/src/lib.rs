//! HTTP surface for tracker integration: webhook intake, manual sync,
//! issue creation and a status endpoint.

mod integration_server;

pub use integration_server::{
    build_integration_router, run_integration_server, IntegrationServerConfig,
    IntegrationServerState, DEFAULT_INTEGRATION_BIND, INTEGRATION_CREATE_ENDPOINT,
    INTEGRATION_STATUS_ENDPOINT, INTEGRATION_SYNC_ENDPOINT, INTEGRATION_WEBHOOK_ENDPOINT,
    WEBHOOK_SIGNATURE_HEADER,
};
