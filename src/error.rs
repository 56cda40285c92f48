use std::error::Error as StdError;
use std::fmt;

/// A `Result` alias where the `Err` case is `negotiate_server::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// The Errors that may occur while driving a Negotiate handshake.
///
/// Every variant is fatal to the attempt it came from. The caller decides the
/// HTTP status (see [`status_for`](crate::status_for)) and must make sure the
/// handshake context is disposed.
pub struct Error {
    inner: Box<Inner>,
}

/// Boxed error returned by security-context providers.
pub type BoxError = Box<dyn StdError + Send + Sync>;

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
            }),
        }
    }

    /// Returns true if the security context could not be created.
    pub fn is_context_creation(&self) -> bool {
        matches!(self.inner.kind, Kind::ContextCreation)
    }

    /// Returns true if an inbound blob was not valid base64.
    pub fn is_malformed_blob(&self) -> bool {
        matches!(self.inner.kind, Kind::MalformedBlob)
    }

    /// Returns true if the mechanism rejected a round.
    pub fn is_negotiation(&self) -> bool {
        matches!(self.inner.kind, Kind::Negotiation)
    }

    /// Returns true if the protocol or identity was queried before completion.
    pub fn is_not_ready(&self) -> bool {
        matches!(self.inner.kind, Kind::NotReady)
    }

    /// Returns true if a completed context could not be mapped to an identity.
    pub fn is_identity_resolution(&self) -> bool {
        matches!(self.inner.kind, Kind::IdentityResolution)
    }

    /// Returns true if the context was used after it was disposed.
    pub fn is_disposed(&self) -> bool {
        matches!(self.inner.kind, Kind::Disposed)
    }

    /// Returns true if an outgoing blob could not be turned into a header.
    pub fn is_header(&self) -> bool {
        matches!(self.inner.kind, Kind::Header)
    }

    pub(crate) fn kind(&self) -> &Kind {
        &self.inner.kind
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_struct("negotiate_server::Error");

        builder.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }

        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.inner.kind {
            Kind::ContextCreation => f.write_str("failed to create security context")?,
            Kind::MalformedBlob => f.write_str("malformed negotiate blob")?,
            Kind::Negotiation => f.write_str("negotiation rejected")?,
            Kind::NotReady => f.write_str("handshake is not complete")?,
            Kind::IdentityResolution => f.write_str("failed to resolve authenticated identity")?,
            Kind::Disposed => f.write_str("security context already disposed")?,
            Kind::Header => f.write_str("invalid negotiate header")?,
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    ContextCreation,
    MalformedBlob,
    Negotiation,
    NotReady,
    IdentityResolution,
    Disposed,
    Header,
}

// constructors

pub(crate) fn context_creation<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::ContextCreation, Some(e))
}

pub(crate) fn malformed_blob<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::MalformedBlob, Some(e))
}

pub(crate) fn negotiation<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Negotiation, Some(e))
}

pub(crate) fn not_ready(what: &'static str) -> Error {
    Error::new(Kind::NotReady, Some(what))
}

pub(crate) fn identity_resolution<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::IdentityResolution, Some(e))
}

pub(crate) fn disposed() -> Error {
    Error::new(Kind::Disposed, None::<BoxError>)
}

pub(crate) fn header<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Header, Some(e))
}
