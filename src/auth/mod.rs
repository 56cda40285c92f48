// src/auth/mod.rs

//! Server-side HTTP Negotiate (Kerberos/SPNEGO/NTLM) authentication.
//!
//! [`HandshakeContext`] wraps one native security context for one attempt,
//! [`HandshakeDriver`] feeds it header blobs until it completes, and the
//! [`blob`] functions transcode between header text and bytes.

pub mod blob;
mod driver;
mod negotiate;
mod provider;

#[cfg(all(windows, feature = "sspi"))]
pub mod sspi;

pub use self::driver::{parse_authorization, status_for, HandshakeDriver, Outcome};
pub use self::negotiate::HandshakeContext;
pub use self::provider::{
    ContextParams, Identity, Protocol, SecurityContextProvider, ServerContext, Step,
};

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Authentication scheme name used in `Authorization` and `WWW-Authenticate`.
pub const NEGOTIATE: &str = "Negotiate";

const DEFAULT_MAX_ROUNDS: usize = 10;

/// Context requirements requested from the provider when accepting.
///
/// Defaults to no requirements, which lets the client drive what it asks for.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContextRequirements(u8);

impl ContextRequirements {
    pub const NONE: ContextRequirements = ContextRequirements(0);
    pub const MUTUAL_AUTH: ContextRequirements = ContextRequirements(1 << 0);
    pub const REPLAY_DETECT: ContextRequirements = ContextRequirements(1 << 1);
    pub const SEQUENCE_DETECT: ContextRequirements = ContextRequirements(1 << 2);
    pub const CONFIDENTIALITY: ContextRequirements = ContextRequirements(1 << 3);
    pub const INTEGRITY: ContextRequirements = ContextRequirements(1 << 4);

    /// Returns true if every requirement in `other` is set in `self`.
    pub fn contains(self, other: ContextRequirements) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ContextRequirements {
    type Output = ContextRequirements;

    fn bitor(self, rhs: ContextRequirements) -> ContextRequirements {
        ContextRequirements(self.0 | rhs.0)
    }
}

impl BitOrAssign for ContextRequirements {
    fn bitor_assign(&mut self, rhs: ContextRequirements) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ContextRequirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ContextRequirements, &str); 5] = [
            (ContextRequirements::MUTUAL_AUTH, "MUTUAL_AUTH"),
            (ContextRequirements::REPLAY_DETECT, "REPLAY_DETECT"),
            (ContextRequirements::SEQUENCE_DETECT, "SEQUENCE_DETECT"),
            (ContextRequirements::CONFIDENTIALITY, "CONFIDENTIALITY"),
            (ContextRequirements::INTEGRITY, "INTEGRITY"),
        ];

        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{}", name));
            }
        }
        set.finish()
    }
}

/// An already-formed channel binding token, passed through to the provider
/// untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelBinding(Vec<u8>);

impl ChannelBinding {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        ChannelBinding(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ChannelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBinding")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Configuration for Negotiate authentication.
///
/// The credential is always the process's ambient default, held by the
/// [`SecurityContextProvider`]; this only describes how each context is
/// created and how long an attempt may run.
#[derive(Clone, Debug)]
pub struct NegotiateConfig {
    pub(crate) package: String,
    pub(crate) target_name: Option<String>,
    pub(crate) channel_binding: Option<ChannelBinding>,
    pub(crate) requirements: ContextRequirements,
    pub(crate) max_rounds: usize,
}

impl Default for NegotiateConfig {
    fn default() -> Self {
        Self {
            package: NEGOTIATE.to_owned(),
            target_name: None,
            channel_binding: None,
            requirements: ContextRequirements::NONE,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl NegotiateConfig {
    /// Negotiate package, ambient credential, no target name or binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different security package, e.g. `"Kerberos"` to refuse NTLM.
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn target_name(mut self, target_name: impl Into<String>) -> Self {
        self.target_name = Some(target_name.into());
        self
    }

    pub fn channel_binding(mut self, binding: ChannelBinding) -> Self {
        self.channel_binding = Some(binding);
        self
    }

    pub fn requirements(mut self, requirements: ContextRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    /// Upper bound on exchanges per attempt before the driver gives up.
    ///
    /// A value of zero is treated as one.
    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub(crate) fn params(&self) -> ContextParams<'_> {
        ContextParams {
            package: &self.package,
            target_name: self.target_name.as_deref(),
            channel_binding: self.channel_binding.as_ref(),
            requirements: self.requirements,
        }
    }
}
