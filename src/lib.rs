#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # negotiate-server
//!
//! Server-side handshake driver for the HTTP `Negotiate` (SPNEGO)
//! authentication scheme, which selects Kerberos or NTLM behind a single
//! challenge/response exchange.
//!
//! The crate does not implement any mechanism itself. A platform
//! [`SecurityContextProvider`] (Windows SSPI with the `sspi` feature, or one
//! supplied by the host) does the cryptography; this crate owns the
//! lifecycle around it:
//!
//! - [`HandshakeContext`] wraps one native server context for one attempt,
//!   runs the blob exchange, reports completion, protocol and identity, and
//!   releases the native context exactly once.
//! - [`blob`] transcodes between `Authorization`/`WWW-Authenticate` base64
//!   text and raw bytes.
//! - [`HandshakeDriver`] turns request headers into response headers and
//!   guarantees disposal on every exit path.
//!
//! ```ignore
//! use std::sync::Arc;
//! use negotiate_server::{HandshakeDriver, NegotiateConfig, Outcome};
//!
//! let provider = Arc::new(negotiate_server::sspi::SspiProvider::new()?);
//! let mut driver = HandshakeDriver::new(provider, NegotiateConfig::new());
//!
//! match driver.drive(request.headers()) {
//!     Ok(Outcome::Authenticated { identity, protocol, header }) => { /* 200 */ }
//!     Ok(outcome) => { /* 401 with outcome.www_authenticate() */ }
//!     Err(err) => { /* negotiate_server::status_for(&err) */ }
//! }
//! ```
//!
//! ## Optional Features
//!
//! - **sspi**: Provides [`sspi::SspiProvider`], bound directly to Windows
//!   SSPI. Windows only.

pub use http::{HeaderMap, HeaderValue, StatusCode};

pub use self::auth::{
    blob, parse_authorization, status_for, ChannelBinding, ContextParams, ContextRequirements,
    HandshakeContext, HandshakeDriver, Identity, NegotiateConfig, Outcome, Protocol,
    SecurityContextProvider, ServerContext, Step, NEGOTIATE,
};
#[cfg(all(windows, feature = "sspi"))]
#[cfg_attr(docsrs, doc(cfg(all(windows, feature = "sspi"))))]
pub use self::auth::sspi;
pub use self::error::{BoxError, Error, Result};

mod auth;
mod error;
pub mod routing;
