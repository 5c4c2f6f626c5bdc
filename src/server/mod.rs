pub mod api;
pub mod data;
pub mod ws;

pub use api::create_mock_router;
pub use data::{MockStore, DEMO_EMAIL, DEMO_PASSWORD, LOGIN_DELAY_MS, MOCK_TOKEN};
pub use ws::run_ws_server;
