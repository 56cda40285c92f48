// src/auth/driver.rs

//! Drives one Negotiate attempt across HTTP requests.
//!
//! The driver parses `Authorization: Negotiate <blob>`, feeds the blob into a
//! [`HandshakeContext`], and hands back the `WWW-Authenticate` value for the
//! response. It disposes the context on every exit path: completion, any
//! error, a client that restarts, or [`abandon`](HandshakeDriver::abandon).

use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, HeaderValue, StatusCode};

use super::negotiate::HandshakeContext;
use super::provider::{Identity, SecurityContextProvider, ServerContext};
use super::{blob, NegotiateConfig, NEGOTIATE};
use crate::error::{self, Error, Kind};
use crate::Result;

/// What the host should answer after one request.
#[derive(Debug)]
pub enum Outcome {
    /// No Negotiate credentials were offered; reply 401 with a bare
    /// `WWW-Authenticate: Negotiate` to start a handshake.
    Challenge { header: HeaderValue },
    /// The handshake needs another round; reply 401 with this header.
    Continue { header: HeaderValue },
    /// The handshake completed. `header` carries the final mutual-auth
    /// token, if the mechanism produced one, and belongs on the success
    /// response.
    Authenticated {
        identity: Identity,
        protocol: String,
        header: Option<HeaderValue>,
    },
}

impl Outcome {
    /// The status this outcome is normally answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Challenge { .. } | Outcome::Continue { .. } => StatusCode::UNAUTHORIZED,
            Outcome::Authenticated { .. } => StatusCode::OK,
        }
    }

    /// The `WWW-Authenticate` value to put on the response, if any.
    pub fn www_authenticate(&self) -> Option<&HeaderValue> {
        match self {
            Outcome::Challenge { header } | Outcome::Continue { header } => Some(header),
            Outcome::Authenticated { header, .. } => header.as_ref(),
        }
    }

    fn challenge() -> Outcome {
        Outcome::Challenge {
            header: HeaderValue::from_static(NEGOTIATE),
        }
    }
}

/// Map a handshake error to the status the host should reply with.
///
/// Rejected or unreadable client blobs get 401 so the client can start a
/// fresh handshake. Everything else is a server-side failure.
pub fn status_for(err: &Error) -> StatusCode {
    match err.kind() {
        Kind::MalformedBlob | Kind::Negotiation => StatusCode::UNAUTHORIZED,
        Kind::ContextCreation
        | Kind::NotReady
        | Kind::IdentityResolution
        | Kind::Disposed
        | Kind::Header => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Find a Negotiate credential in the request's `Authorization` headers.
///
/// Returns `None` if no Negotiate credential is present, `Some(None)` for a
/// bare `Negotiate`, and `Some(Some(blob))` for `Negotiate <blob>`. The scheme
/// is matched case-insensitively.
pub fn parse_authorization(headers: &HeaderMap) -> Option<Option<&str>> {
    for value in headers.get_all(http::header::AUTHORIZATION) {
        let value = match value.to_str() {
            Ok(v) => v.trim(),
            Err(_) => continue,
        };

        if value.eq_ignore_ascii_case(NEGOTIATE) {
            return Some(None);
        }

        let scheme = match value.get(..NEGOTIATE.len()) {
            Some(s) if s.eq_ignore_ascii_case(NEGOTIATE) => s,
            _ => continue,
        };

        let rest = &value[scheme.len()..];
        if rest.starts_with(|c: char| c.is_ascii_whitespace()) {
            let token = rest.trim();
            return Some(if token.is_empty() { None } else { Some(token) });
        }
    }

    None
}

fn negotiate_header(blob: Option<&[u8]>) -> Result<HeaderValue> {
    match blob::encode(blob) {
        Some(token) => {
            HeaderValue::from_str(&format!("{} {}", NEGOTIATE, token)).map_err(error::header)
        }
        None => Ok(HeaderValue::from_static(NEGOTIATE)),
    }
}

struct Round {
    outgoing: Option<Vec<u8>>,
    authenticated: Option<(Identity, String)>,
}

fn run_round<C: ServerContext>(
    ctx: &mut HandshakeContext<C>,
    incoming: Option<&[u8]>,
    max_rounds: usize,
) -> Result<Round> {
    if ctx.rounds() >= max_rounds {
        return Err(error::negotiation(format!(
            "handshake exceeded {} rounds",
            max_rounds
        )));
    }

    let (outgoing, complete) = ctx.exchange(incoming)?;

    let authenticated = if complete {
        Some((ctx.identity()?, ctx.protocol()?))
    } else {
        None
    };

    Ok(Round {
        outgoing,
        authenticated,
    })
}

/// Runs one Negotiate attempt (normally one per connection).
///
/// Requests for the same attempt must be driven in arrival order, one at a
/// time; `&mut self` enforces this. The provider, and with it the ambient
/// credential, is shared between drivers.
pub struct HandshakeDriver<P: SecurityContextProvider> {
    provider: Arc<P>,
    config: NegotiateConfig,
    context: Option<HandshakeContext<P::Context>>,
}

impl<P: SecurityContextProvider> HandshakeDriver<P> {
    pub fn new(provider: Arc<P>, config: NegotiateConfig) -> Self {
        HandshakeDriver {
            provider,
            config,
            context: None,
        }
    }

    /// Whether a handshake is waiting for the client's next blob.
    pub fn in_progress(&self) -> bool {
        self.context.is_some()
    }

    /// Process one request's headers.
    ///
    /// The exchange may block on cryptographic validation; async hosts
    /// should use [`drive_blocking`](Self::drive_blocking) instead.
    pub fn drive(&mut self, headers: &HeaderMap) -> Result<Outcome> {
        let (mut ctx, incoming) = match self.prepare(headers)? {
            Some(prepared) => prepared,
            None => return Ok(Outcome::challenge()),
        };

        let round = run_round(&mut ctx, incoming.as_deref(), self.config.max_rounds);
        self.settle(ctx, round)
    }

    /// Like [`drive`](Self::drive), but runs the exchange on tokio's
    /// blocking pool.
    pub async fn drive_blocking(&mut self, headers: &HeaderMap) -> Result<Outcome>
    where
        P::Context: 'static,
    {
        let (mut ctx, incoming) = match self.prepare(headers)? {
            Some(prepared) => prepared,
            None => return Ok(Outcome::challenge()),
        };

        let max_rounds = self.config.max_rounds;
        let joined = tokio::task::spawn_blocking(move || {
            let round = run_round(&mut ctx, incoming.as_deref(), max_rounds);
            (ctx, round)
        })
        .await;

        match joined {
            Ok((ctx, round)) => self.settle(ctx, round),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // The context was dropped, and so disposed, with the task.
            Err(e) => Err(error::negotiation(e)),
        }
    }

    /// Dispose an unfinished attempt, e.g. on client disconnect or timeout.
    pub fn abandon(&mut self) {
        if let Some(mut ctx) = self.context.take() {
            log::warn!("abandoning negotiate attempt after {} round(s)", ctx.rounds());
            ctx.dispose();
        }
    }

    fn prepare(
        &mut self,
        headers: &HeaderMap,
    ) -> Result<Option<(HandshakeContext<P::Context>, Option<Vec<u8>>)>> {
        let token = match parse_authorization(headers) {
            Some(token) => token,
            None => {
                // The client started over without credentials.
                self.abandon();
                return Ok(None);
            }
        };

        let incoming = match blob::decode(token) {
            Ok(incoming) => incoming,
            Err(e) => {
                self.abandon();
                return Err(e);
            }
        };

        let ctx = match self.context.take() {
            Some(ctx) => ctx,
            None => HandshakeContext::new(&*self.provider, &self.config)?,
        };

        Ok(Some((ctx, incoming)))
    }

    fn settle(
        &mut self,
        mut ctx: HandshakeContext<P::Context>,
        round: Result<Round>,
    ) -> Result<Outcome> {
        match round {
            Ok(Round {
                outgoing,
                authenticated: None,
            }) => {
                let header = negotiate_header(outgoing.as_deref())?;
                self.context = Some(ctx);
                Ok(Outcome::Continue { header })
            }
            Ok(Round {
                outgoing,
                authenticated: Some((identity, protocol)),
            }) => {
                ctx.dispose();
                log::debug!("negotiate authenticated {} via {}", identity, protocol);
                let header = match outgoing {
                    Some(blob) => Some(negotiate_header(Some(&blob))?),
                    None => None,
                };
                Ok(Outcome::Authenticated {
                    identity,
                    protocol,
                    header,
                })
            }
            Err(e) => {
                ctx.dispose();
                Err(e)
            }
        }
    }
}

impl<P: SecurityContextProvider> fmt::Debug for HandshakeDriver<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeDriver")
            .field("config", &self.config)
            .field("context", &self.context)
            .finish()
    }
}
