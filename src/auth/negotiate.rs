// src/auth/negotiate.rs

//! The per-attempt handshake context.
//!
//! A [`HandshakeContext`] owns exactly one native server context from
//! construction until [`dispose`](HandshakeContext::dispose). Exchanges take
//! `&mut self`, so at most one round can be in flight per context.

use std::fmt;

use super::provider::{Identity, SecurityContextProvider, ServerContext};
use super::{blob, NegotiateConfig};
use crate::error;
use crate::Result;

/// One in-progress or completed Negotiate authentication attempt.
///
/// Disposal is always required for the server role, whether or not the
/// handshake completed. Calling [`dispose`](Self::dispose) more than once is a
/// no-op, and dropping an undisposed context disposes it.
pub struct HandshakeContext<C: ServerContext> {
    inner: Option<C>,
    complete: bool,
    rounds: usize,
}

impl<C: ServerContext> HandshakeContext<C> {
    /// Create a server-role context from the provider's ambient credential.
    ///
    /// Either returns a context bound to one native handle or fails with a
    /// context-creation error; nothing is left allocated on failure.
    pub fn new<P>(provider: &P, config: &NegotiateConfig) -> Result<Self>
    where
        P: SecurityContextProvider<Context = C> + ?Sized,
    {
        let params = config.params();
        let inner = provider.create_context(&params).map_err(|e| {
            log::debug!("creating {} server context failed: {}", params.package, e);
            error::context_creation(e)
        })?;

        log::trace!("created {} server context", params.package);

        Ok(HandshakeContext {
            inner: Some(inner),
            complete: false,
            rounds: 0,
        })
    }

    /// Run one handshake round.
    ///
    /// `incoming` may be `None` only on the first round, when the client
    /// initiates without a prior challenge. Later it is passed on as-is and the
    /// mechanism decides whether an empty continuation is acceptable.
    ///
    /// Returns the next blob for the client, if any, and whether the
    /// handshake is complete. Any mechanism rejection is returned as a
    /// negotiation error and ends the attempt; nothing is retried.
    pub fn exchange(&mut self, incoming: Option<&[u8]>) -> Result<(Option<Vec<u8>>, bool)> {
        let inner = self.inner.as_mut().ok_or_else(error::disposed)?;

        if self.complete {
            return Err(error::negotiation("handshake already complete"));
        }

        let incoming = incoming.filter(|b| !b.is_empty());
        let round = self.rounds + 1;

        let step = inner.step(incoming).map_err(|e| {
            log::warn!("negotiate round {} rejected: {}", round, e);
            error::negotiation(e)
        })?;

        self.rounds = round;
        self.complete = step.complete;
        let outgoing = step.outgoing.filter(|b| !b.is_empty());

        log::debug!(
            "negotiate round {}: in={} out={} complete={}",
            round,
            incoming.map_or(0, <[u8]>::len),
            outgoing.as_ref().map_or(0, Vec::len),
            self.complete,
        );

        Ok((outgoing, self.complete))
    }

    /// [`exchange`](Self::exchange) over wire blobs.
    ///
    /// Malformed base64 fails before the native context is touched.
    pub fn exchange_base64(&mut self, incoming: Option<&str>) -> Result<(Option<String>, bool)> {
        let incoming = blob::decode(incoming)?;
        let (outgoing, complete) = self.exchange(incoming.as_deref())?;
        Ok((blob::encode(outgoing.as_deref()), complete))
    }

    /// Whether no further rounds are needed. Never resets once true.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of successful rounds so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_none()
    }

    /// Name of the mechanism that completed, e.g. `"Kerberos"` or `"NTLM"`.
    pub fn protocol(&self) -> Result<String> {
        let inner = self.completed("protocol")?;
        inner.protocol().map_err(error::negotiation)
    }

    /// The authenticated principal of the completed handshake.
    pub fn identity(&self) -> Result<Identity> {
        let inner = self.completed("identity")?;
        inner.identity().map_err(|e| {
            log::error!("completed negotiate context has no resolvable identity: {}", e);
            error::identity_resolution(e)
        })
    }

    /// Release the native context.
    ///
    /// Safe after any outcome, including zero exchanges. The handle is
    /// released once; later calls do nothing.
    pub fn dispose(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.close();
            log::trace!(
                "disposed negotiate context after {} round(s), complete={}",
                self.rounds,
                self.complete
            );
        }
    }

    fn completed(&self, what: &'static str) -> Result<&C> {
        let inner = self.inner.as_ref().ok_or_else(error::disposed)?;
        if !self.complete {
            return Err(error::not_ready(what));
        }
        Ok(inner)
    }
}

impl<C: ServerContext> Drop for HandshakeContext<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<C: ServerContext> fmt::Debug for HandshakeContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeContext")
            .field("complete", &self.complete)
            .field("rounds", &self.rounds)
            .field("disposed", &self.inner.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::provider::{ContextParams, Step};
    use super::*;
    use crate::error::BoxError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // Two-round mechanism: expects b"hello" then b"proof".
    struct Echo {
        closes: Arc<AtomicUsize>,
        seen: usize,
    }

    impl ServerContext for Echo {
        fn step(&mut self, incoming: Option<&[u8]>) -> std::result::Result<Step, BoxError> {
            self.seen += 1;
            match (self.seen, incoming) {
                (1, None) | (1, Some(b"hello")) => Ok(Step::continue_needed(b"challenge".to_vec())),
                (2, Some(b"proof")) => Ok(Step::complete(Some(Vec::new()))),
                _ => Err("SEC_E_INVALID_TOKEN".into()),
            }
        }

        fn protocol(&self) -> std::result::Result<String, BoxError> {
            Ok("Kerberos".to_owned())
        }

        fn identity(&self) -> std::result::Result<Identity, BoxError> {
            Ok(Identity::new("alice@CONTOSO.COM", "Kerberos"))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct EchoProvider {
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    impl SecurityContextProvider for EchoProvider {
        type Context = Echo;

        fn create_context(&self, _: &ContextParams<'_>) -> std::result::Result<Echo, BoxError> {
            if self.fail {
                return Err("no ambient credential".into());
            }
            Ok(Echo {
                closes: self.closes.clone(),
                seen: 0,
            })
        }
    }

    fn provider() -> (EchoProvider, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            EchoProvider {
                closes: closes.clone(),
                fail: false,
            },
            closes,
        )
    }

    #[test]
    fn test_two_round_completion() {
        let (provider, closes) = provider();
        let mut ctx = HandshakeContext::new(&provider, &NegotiateConfig::new()).unwrap();

        let (out, done) = ctx.exchange(Some(b"hello")).unwrap();
        assert_eq!(out.as_deref(), Some(&b"challenge"[..]));
        assert!(!done);
        assert!(!ctx.is_complete());

        let (out, done) = ctx.exchange(Some(b"proof")).unwrap();
        // Empty final tokens are reported as absent.
        assert_eq!(out, None);
        assert!(done);
        assert!(ctx.is_complete());
        assert_eq!(ctx.rounds(), 2);
        assert_eq!(ctx.protocol().unwrap(), "Kerberos");
        assert_eq!(ctx.identity().unwrap().name(), "alice@CONTOSO.COM");

        ctx.dispose();
        ctx.dispose();
        drop(ctx);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_not_ready_before_completion() {
        let (provider, _) = provider();
        let mut ctx = HandshakeContext::new(&provider, &NegotiateConfig::new()).unwrap();
        assert!(ctx.protocol().unwrap_err().is_not_ready());
        assert!(ctx.identity().unwrap_err().is_not_ready());

        ctx.exchange(None).unwrap();
        assert!(ctx.protocol().unwrap_err().is_not_ready());
    }

    #[test]
    fn test_rejected_round_is_negotiation_error() {
        let (provider, closes) = provider();
        let mut ctx = HandshakeContext::new(&provider, &NegotiateConfig::new()).unwrap();
        ctx.exchange(None).unwrap();

        let err = ctx.exchange(Some(b"tampered")).unwrap_err();
        assert!(err.is_negotiation());
        assert!(!ctx.is_complete());
        assert_eq!(ctx.rounds(), 1);

        drop(ctx);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exchange_after_complete_is_rejected() {
        let (provider, _) = provider();
        let mut ctx = HandshakeContext::new(&provider, &NegotiateConfig::new()).unwrap();
        ctx.exchange(None).unwrap();
        ctx.exchange(Some(b"proof")).unwrap();

        assert!(ctx.exchange(Some(b"proof")).unwrap_err().is_negotiation());
        assert!(ctx.is_complete());
    }

    #[test]
    fn test_disposed_context() {
        let (provider, closes) = provider();
        let mut ctx = HandshakeContext::new(&provider, &NegotiateConfig::new()).unwrap();
        ctx.dispose();

        assert!(ctx.is_disposed());
        assert!(ctx.exchange(None).unwrap_err().is_disposed());
        assert!(ctx.protocol().unwrap_err().is_disposed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_creation_failure() {
        let closes = Arc::new(AtomicUsize::new(0));
        let provider = EchoProvider {
            closes: closes.clone(),
            fail: true,
        };
        let err = HandshakeContext::new(&provider, &NegotiateConfig::new()).unwrap_err();
        assert!(err.is_context_creation());
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_exchange_base64() {
        let (provider, _) = provider();
        let mut ctx = HandshakeContext::new(&provider, &NegotiateConfig::new()).unwrap();

        let err = ctx.exchange_base64(Some("not-base64!")).unwrap_err();
        assert!(err.is_malformed_blob());
        assert_eq!(ctx.rounds(), 0);

        // "aGVsbG8=" is b"hello"
        let (out, done) = ctx.exchange_base64(Some("aGVsbG8=")).unwrap();
        assert_eq!(out.as_deref(), Some("Y2hhbGxlbmdl"));
        assert!(!done);
    }
}
