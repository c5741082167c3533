//! HTTP client for the Mastery Loop tutoring backend.
//!
//! [`HttpGateway`] implements [`mastery_session::TutoringGateway`] on top of
//! `reqwest`, mapping each operation to the backend's JSON endpoints and
//! classifying failures into [`mastery_session::GatewayError`].
//!
//! # Example
//!
//! ```rust,no_run
//! use mastery_gateway::{GatewayOptions, HttpGateway};
//! use mastery_session::{Config, TutoringGateway};
//!
//! # async fn run() -> Result<(), mastery_session::GatewayError> {
//! let options = GatewayOptions::from_config(&Config::default(), None);
//! let gateway = HttpGateway::new(options)?;
//! let explanation = gateway.explain("Transformers").await?;
//! println!("{explanation}");
//! # Ok(())
//! # }
//! ```

mod client;

pub use client::{GatewayOptions, HttpGateway};
