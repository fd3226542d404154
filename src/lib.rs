//! Prism Mock
//!
//! A fixture-replay HTTP mock server. Each request is mapped to a fixture
//! file; when it exists the recorded status, content type and body are
//! replayed after an optional artificial delay. When it does not, the
//! server answers 404 and writes an empty mock next to where the fixture
//! belongs, so the missing response can be filled in by hand.
//!
//! # Features
//!
//! - **Deterministic keys**: SHA-256 over method and url, optionally the body
//! - **Latency simulation**: Fixed, random range or preset delays
//! - **Record-then-edit**: Placeholder fixtures written on every miss
//! - **Route contexts**: Exact, prefix, regex or glob path ownership
//!
//! # Example Configuration
//!
//! ```yaml
//! routes:
//!   - name: users
//!     context:
//!       type: prefix
//!       value: /users
//!     delay:
//!       min_ms: 100
//!       max_ms: 300
//! ```
//!
//! # Fixture Format
//!
//! ```json
//! {
//!   "requestUrl": "/users/42",
//!   "contentType": "application/json",
//!   "statusCode": 200,
//!   "data": {"id": 42}
//! }
//! ```

pub mod config;
pub mod delay;
pub mod dispatcher;
pub mod error;
pub mod fixture;
pub mod key;
pub mod replay;
pub mod router;
pub mod server;
pub mod store;

pub use config::{MockServerConfig, RouteConfig};
pub use dispatcher::MockDispatcher;
pub use server::MockServer;
