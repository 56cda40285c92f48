// src/auth/provider.rs

//! The seam between the handshake core and the platform security-context
//! provider (SSPI, GSSAPI, or a test double).
//!
//! The core never inspects blobs. It hands bytes to a [`ServerContext`] and
//! reads back the next blob and whether the handshake is done.

use std::fmt;

use crate::error::BoxError;

use super::{ChannelBinding, ContextRequirements};

/// Creates server-role security contexts bound to the provider's ambient
/// credential.
///
/// A provider is built once, shared behind an `Arc`, and used by many
/// concurrent attempts. Its credential is read-only after construction.
pub trait SecurityContextProvider: Send + Sync {
    /// The per-attempt context this provider hands out.
    type Context: ServerContext;

    /// Create a fresh server-role context. No network I/O happens here.
    ///
    /// On error nothing may be left allocated.
    fn create_context(&self, params: &ContextParams<'_>) -> Result<Self::Context, BoxError>;
}

/// One native server-role security context.
pub trait ServerContext: Send {
    /// Run one accept round.
    ///
    /// Errors must be surfaced: a malformed, replayed, out-of-order, or
    /// tampered blob fails the call instead of producing an empty reply.
    fn step(&mut self, incoming: Option<&[u8]>) -> Result<Step, BoxError>;

    /// Name of the mechanism that completed. Only called once complete.
    fn protocol(&self) -> Result<String, BoxError>;

    /// Materialize the authenticated principal. Only called once complete.
    fn identity(&self) -> Result<Identity, BoxError>;

    /// Release the native context. Called exactly once.
    fn close(&mut self);
}

/// The result of one accept round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Step {
    /// Next blob to send to the client, if any.
    pub outgoing: Option<Vec<u8>>,
    /// Whether no further rounds are needed.
    pub complete: bool,
}

impl Step {
    /// A round that needs another client blob.
    pub fn continue_needed(outgoing: Vec<u8>) -> Self {
        Step {
            outgoing: Some(outgoing),
            complete: false,
        }
    }

    /// The final round, with an optional mutual-auth token.
    pub fn complete(outgoing: Option<Vec<u8>>) -> Self {
        Step {
            outgoing,
            complete: true,
        }
    }
}

/// What a provider needs to create one context.
#[derive(Clone, Copy, Debug)]
pub struct ContextParams<'a> {
    /// Security package; `"Negotiate"` unless configured otherwise.
    pub package: &'a str,
    /// Optional target name. Servers normally leave this unset.
    pub target_name: Option<&'a str>,
    /// Optional channel binding token.
    pub channel_binding: Option<&'a ChannelBinding>,
    /// Requested context requirements.
    pub requirements: ContextRequirements,
}

/// The authenticated principal of a completed handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    name: String,
    authentication_type: String,
}

impl Identity {
    /// Build an identity from a principal name and the mechanism that proved it.
    pub fn new(name: impl Into<String>, authentication_type: impl Into<String>) -> Self {
        Identity {
            name: name.into(),
            authentication_type: authentication_type.into(),
        }
    }

    /// Principal name, e.g. `CONTOSO\alice` or `alice@CONTOSO.COM`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The mechanism that authenticated the principal.
    pub fn authentication_type(&self) -> &str {
        &self.authentication_type
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Mechanisms that can complete a Negotiate handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Protocol {
    Kerberos,
    Ntlm,
    /// Any other package the provider reports.
    Other(String),
}

impl Protocol {
    /// Classify a provider-reported package name.
    pub fn from_package(name: &str) -> Self {
        if name.eq_ignore_ascii_case("kerberos") {
            Protocol::Kerberos
        } else if name.eq_ignore_ascii_case("ntlm") {
            Protocol::Ntlm
        } else {
            Protocol::Other(name.to_owned())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Kerberos => "Kerberos",
            Protocol::Ntlm => "NTLM",
            Protocol::Other(name) => name,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
