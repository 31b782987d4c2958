//! Helpers shared by the tests of several modules

mod fake_server;

pub use self::fake_server::{status_info, FakeServer, ServerConnection};
