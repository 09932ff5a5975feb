//! `campaign-http` is the resilient request executor behind a catalog of
//! marketing-automation API operations.
//!
//! Every operation funnels through [`RequestExecutor::execute`], which turns a
//! [`CallDescriptor`] into the parsed response body or one [`TerminalError`]:
//! - transient failures (5xx, network errors) are retried with exponential
//!   backoff from the [`RetryPolicy`];
//! - `429` responses wait for the server's `retry-after` instead;
//! - `401`, `404` and other client errors fail immediately.
//!
//! ```no_run
//! use campaign_http::{CallDescriptor, Config, RequestExecutor};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let executor = RequestExecutor::new(&config);
//! let groups = executor.execute(&CallDescriptor::get("/groups")?).await?;
//! println!("{groups}");
//! # Ok(())
//! # }
//! ```

mod config;
mod descriptor;
mod error;
mod executor;
mod policy;

pub mod outcome;
pub mod transport;

pub use config::{Config, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_MS};
pub use descriptor::{CallDescriptor, Method};
pub use error::{Cause, ConfigError, DescriptorError, TerminalError};
pub use executor::RequestExecutor;
pub use outcome::AttemptOutcome;
pub use policy::RetryPolicy;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, TerminalError>;
