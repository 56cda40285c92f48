// tests/support/mod.rs

//! A scripted security-context provider.
//!
//! It speaks two toy mechanisms that follow the shape of the real ones:
//!
//! - NTLM: the client's first round (empty, or a `NTLMSSP\0\x01` negotiate
//!   message) gets a challenge carrying a per-context nonce; the reply must
//!   be `NTLMSSP\0\x03` + that nonce + the user name.
//! - Kerberos: a single `KRB5 AP-REQ <user>` round, answered with a mutual
//!   auth `KRB5 AP-REP` token.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use negotiate_server::{
    BoxError, ContextParams, Identity, SecurityContextProvider, ServerContext, Step,
};

pub const NTLM_NEGOTIATE: &[u8] = b"NTLMSSP\0\x01\0\0\0";
const NTLM_CHALLENGE: &[u8] = b"NTLMSSP\0\x02";
const NTLM_AUTHENTICATE: &[u8] = b"NTLMSSP\0\x03";
const KRB_AP_REQ: &[u8] = b"KRB5 AP-REQ ";
pub const KRB_AP_REP: &[u8] = b"KRB5 AP-REP";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build the client's NTLM authenticate message for a challenge.
pub fn ntlm_authenticate(challenge: &[u8], user: &str) -> Vec<u8> {
    assert!(challenge.starts_with(NTLM_CHALLENGE), "not an NTLM challenge");
    let nonce = &challenge[NTLM_CHALLENGE.len()..];
    let mut msg = NTLM_AUTHENTICATE.to_vec();
    msg.extend_from_slice(nonce);
    msg.extend_from_slice(user.as_bytes());
    msg
}

pub fn kerberos_ap_req(user: &str) -> Vec<u8> {
    let mut msg = KRB_AP_REQ.to_vec();
    msg.extend_from_slice(user.as_bytes());
    msg
}

#[derive(Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub steps: AtomicUsize,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn steps(&self) -> usize {
        self.steps.load(Ordering::SeqCst)
    }

    /// Contexts created but not yet released.
    pub fn live(&self) -> usize {
        self.created() - self.closed()
    }
}

#[derive(Default)]
pub struct MockProvider {
    pub counters: Arc<Counters>,
    pub fail_create: bool,
    pub fail_identity: bool,
    nonces: AtomicU64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create() -> Self {
        MockProvider {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn failing_identity() -> Self {
        MockProvider {
            fail_identity: true,
            ..Self::default()
        }
    }
}

impl SecurityContextProvider for MockProvider {
    type Context = MockContext;

    fn create_context(&self, params: &ContextParams<'_>) -> Result<MockContext, BoxError> {
        if self.fail_create {
            return Err("SEC_E_NO_CREDENTIALS".into());
        }
        if params.package != "Negotiate" {
            return Err(format!("unsupported package {}", params.package).into());
        }

        self.counters.created.fetch_add(1, Ordering::SeqCst);
        let nonce = self.nonces.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(MockContext {
            counters: self.counters.clone(),
            fail_identity: self.fail_identity,
            nonce: nonce.to_be_bytes(),
            state: State::Initial,
            closed: false,
        })
    }
}

enum State {
    Initial,
    NtlmChallenged,
    Done { user: String, protocol: &'static str },
}

pub struct MockContext {
    counters: Arc<Counters>,
    fail_identity: bool,
    nonce: [u8; 8],
    state: State,
    closed: bool,
}

impl ServerContext for MockContext {
    fn step(&mut self, incoming: Option<&[u8]>) -> Result<Step, BoxError> {
        assert!(!self.closed, "step on a closed context");
        self.counters.steps.fetch_add(1, Ordering::SeqCst);

        match (&self.state, incoming) {
            (State::Initial, None) | (State::Initial, Some(NTLM_NEGOTIATE)) => {
                self.state = State::NtlmChallenged;
                let mut challenge = NTLM_CHALLENGE.to_vec();
                challenge.extend_from_slice(&self.nonce);
                Ok(Step::continue_needed(challenge))
            }
            (State::Initial, Some(token)) if token.starts_with(KRB_AP_REQ) => {
                let user = String::from_utf8(token[KRB_AP_REQ.len()..].to_vec())?;
                if user.is_empty() {
                    return Err("KRB_AP_ERR_BADMATCH".into());
                }
                self.state = State::Done {
                    user,
                    protocol: "Kerberos",
                };
                Ok(Step::complete(Some(KRB_AP_REP.to_vec())))
            }
            (State::NtlmChallenged, Some(token)) if token.starts_with(NTLM_AUTHENTICATE) => {
                let rest = &token[NTLM_AUTHENTICATE.len()..];
                if rest.len() < 8 || rest[..8] != self.nonce {
                    return Err("SEC_E_INVALID_TOKEN: challenge mismatch".into());
                }
                let user = String::from_utf8(rest[8..].to_vec())?;
                self.state = State::Done {
                    user,
                    protocol: "NTLM",
                };
                Ok(Step::complete(None))
            }
            (State::Done { .. }, _) => Err("SEC_E_OUT_OF_SEQUENCE".into()),
            _ => Err("SEC_E_INVALID_TOKEN".into()),
        }
    }

    fn protocol(&self) -> Result<String, BoxError> {
        match self.state {
            State::Done { protocol, .. } => Ok(protocol.to_owned()),
            _ => Err("context incomplete".into()),
        }
    }

    fn identity(&self) -> Result<Identity, BoxError> {
        if self.fail_identity {
            return Err("SEC_E_NO_IMPERSONATION".into());
        }
        match &self.state {
            State::Done { user, protocol } => Ok(Identity::new(user.clone(), *protocol)),
            _ => Err("context incomplete".into()),
        }
    }

    fn close(&mut self) {
        assert!(!self.closed, "context closed twice");
        self.closed = true;
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}
