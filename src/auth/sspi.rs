// src/auth/sspi.rs

//! Windows SSPI (Security Support Provider Interface) provider for server-side
//! Negotiate.
//!
//! The inbound credential of the current process is acquired once and shared
//! by every context. Each context drives `AcceptSecurityContext` and owns its
//! `CtxtHandle` until [`ServerContext::close`] deletes it. Unlike the client
//! role, nothing is released automatically on completion.

use std::ffi::c_void;
use std::fmt;
use std::ptr;
use std::sync::Arc;

use windows::core::{HRESULT, PCWSTR};
use windows::Win32::Foundation::{
    SEC_E_OK, SEC_I_COMPLETE_AND_CONTINUE, SEC_I_COMPLETE_NEEDED, SEC_I_CONTINUE_NEEDED,
};
use windows::Win32::Security::Authentication::Identity::{
    AcceptSecurityContext, AcquireCredentialsHandleW, CompleteAuthToken, DeleteSecurityContext,
    FreeContextBuffer, FreeCredentialsHandle, QueryContextAttributesW, SecBuffer, SecBufferDesc,
    SecPkgContext_NamesW, SecPkgContext_NegotiationInfoW, ASC_REQ_ALLOCATE_MEMORY,
    ASC_REQ_CONFIDENTIALITY, ASC_REQ_FLAGS, ASC_REQ_INTEGRITY, ASC_REQ_MUTUAL_AUTH,
    ASC_REQ_REPLAY_DETECT, ASC_REQ_SEQUENCE_DETECT, SECPKG_ATTR_NAMES,
    SECPKG_ATTR_NEGOTIATION_INFO, SECPKG_CRED_INBOUND,
};
use windows::Win32::Security::Credentials::SecHandle;

use super::provider::{ContextParams, Identity, Protocol, SecurityContextProvider, ServerContext, Step};
use super::{ContextRequirements, NEGOTIATE};
use crate::error::BoxError;

const SECBUFFER_VERSION: u32 = 0;
const SECBUFFER_TOKEN: u32 = 2;
const SECBUFFER_CHANNEL_BINDINGS: u32 = 14;
const SECURITY_NATIVE_DREP: u32 = 0x10;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn status_error(call: &str, status: HRESULT) -> BoxError {
    format!("{} failed: 0x{:08X} ({})", call, status.0, status.message()).into()
}

/// The process's inbound credential for one security package.
struct Credential {
    handle: SecHandle,
    package: String,
}

impl Drop for Credential {
    fn drop(&mut self) {
        if let Err(e) = unsafe { FreeCredentialsHandle(&self.handle) } {
            log::debug!("FreeCredentialsHandle failed: {}", e);
        }
    }
}

/// SSPI-backed [`SecurityContextProvider`].
///
/// Holds the ambient inbound credential; cheap to share behind an `Arc`.
pub struct SspiProvider {
    credential: Arc<Credential>,
}

impl SspiProvider {
    /// Acquire the current process's inbound credential for `Negotiate`.
    pub fn new() -> crate::Result<Self> {
        Self::with_package(NEGOTIATE)
    }

    /// Acquire the inbound credential for a specific package, e.g.
    /// `"Kerberos"`.
    pub fn with_package(package: &str) -> crate::Result<Self> {
        let package_w = wide(package);
        let mut handle = SecHandle::default();
        let mut expiry = 0i64;

        unsafe {
            AcquireCredentialsHandleW(
                PCWSTR::null(),
                PCWSTR(package_w.as_ptr()),
                SECPKG_CRED_INBOUND,
                None,
                None,
                None,
                None,
                &mut handle,
                Some(&mut expiry),
            )
        }
        .map_err(|e| {
            crate::error::context_creation(format!("AcquireCredentialsHandleW failed: {}", e))
        })?;

        log::debug!("acquired inbound {} credential", package);

        Ok(SspiProvider {
            credential: Arc::new(Credential {
                handle,
                package: package.to_owned(),
            }),
        })
    }
}

impl fmt::Debug for SspiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SspiProvider")
            .field("package", &self.credential.package)
            .finish()
    }
}

impl SecurityContextProvider for SspiProvider {
    type Context = SspiContext;

    fn create_context(&self, params: &ContextParams<'_>) -> Result<SspiContext, BoxError> {
        if !params.package.eq_ignore_ascii_case(&self.credential.package) {
            return Err(format!(
                "credential was acquired for {}, not {}",
                self.credential.package, params.package
            )
            .into());
        }

        Ok(SspiContext {
            credential: self.credential.clone(),
            handle: None,
            flags: asc_flags(params.requirements),
            channel_binding: params.channel_binding.map(|b| b.as_bytes().to_vec()),
        })
    }
}

fn asc_flags(requirements: ContextRequirements) -> ASC_REQ_FLAGS {
    const MAP: [(ContextRequirements, ASC_REQ_FLAGS); 5] = [
        (ContextRequirements::MUTUAL_AUTH, ASC_REQ_MUTUAL_AUTH),
        (ContextRequirements::REPLAY_DETECT, ASC_REQ_REPLAY_DETECT),
        (ContextRequirements::SEQUENCE_DETECT, ASC_REQ_SEQUENCE_DETECT),
        (ContextRequirements::CONFIDENTIALITY, ASC_REQ_CONFIDENTIALITY),
        (ContextRequirements::INTEGRITY, ASC_REQ_INTEGRITY),
    ];

    let mut flags = ASC_REQ_ALLOCATE_MEMORY.0;
    for (requirement, flag) in MAP {
        if requirements.contains(requirement) {
            flags |= flag.0;
        }
    }
    ASC_REQ_FLAGS(flags)
}

/// Copy a provider-allocated output token and free the provider's buffer.
fn take_output(buffer: &mut SecBuffer) -> Option<Vec<u8>> {
    if buffer.pvBuffer.is_null() {
        return None;
    }

    let bytes = unsafe {
        std::slice::from_raw_parts(buffer.pvBuffer as *const u8, buffer.cbBuffer as usize)
    }
    .to_vec();
    unsafe {
        let _ = FreeContextBuffer(buffer.pvBuffer);
    }
    buffer.pvBuffer = ptr::null_mut();
    buffer.cbBuffer = 0;
    Some(bytes)
}

/// One server-role SSPI context.
///
/// The `CtxtHandle` comes into existence on the first accepted round and is
/// deleted by [`close`](ServerContext::close).
pub struct SspiContext {
    credential: Arc<Credential>,
    handle: Option<SecHandle>,
    flags: ASC_REQ_FLAGS,
    channel_binding: Option<Vec<u8>>,
}

impl fmt::Debug for SspiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SspiContext")
            .field("package", &self.credential.package)
            .field("established", &self.handle.is_some())
            .finish()
    }
}

impl SspiContext {
    fn established(&self) -> Result<&SecHandle, BoxError> {
        self.handle
            .as_ref()
            .ok_or_else(|| "security context has not been established".into())
    }

    fn negotiated_package(&self) -> Result<String, BoxError> {
        let handle = self.established()?;
        let mut info = SecPkgContext_NegotiationInfoW::default();

        unsafe {
            QueryContextAttributesW(
                handle,
                SECPKG_ATTR_NEGOTIATION_INFO,
                &mut info as *mut _ as *mut c_void,
            )
        }
        .map_err(|e| format!("QueryContextAttributesW(NEGOTIATION_INFO) failed: {}", e))?;

        if info.PackageInfo.is_null() {
            return Err("negotiation info carries no package".into());
        }

        let name = unsafe { (*info.PackageInfo).Name.to_string() };
        unsafe {
            let _ = FreeContextBuffer(info.PackageInfo as *mut c_void);
        }
        Ok(name?)
    }
}

impl ServerContext for SspiContext {
    fn step(&mut self, incoming: Option<&[u8]>) -> Result<Step, BoxError> {
        let mut token = incoming.map(<[u8]>::to_vec).unwrap_or_default();
        let mut binding = self.channel_binding.clone();

        let mut in_buffers = Vec::with_capacity(2);
        in_buffers.push(SecBuffer {
            cbBuffer: token.len() as u32,
            BufferType: SECBUFFER_TOKEN,
            pvBuffer: if token.is_empty() {
                ptr::null_mut()
            } else {
                token.as_mut_ptr() as *mut c_void
            },
        });
        if let Some(binding) = binding.as_mut() {
            in_buffers.push(SecBuffer {
                cbBuffer: binding.len() as u32,
                BufferType: SECBUFFER_CHANNEL_BINDINGS,
                pvBuffer: binding.as_mut_ptr() as *mut c_void,
            });
        }
        let in_desc = SecBufferDesc {
            ulVersion: SECBUFFER_VERSION,
            cBuffers: in_buffers.len() as u32,
            pBuffers: in_buffers.as_mut_ptr(),
        };

        let mut out_buffer = SecBuffer {
            cbBuffer: 0,
            BufferType: SECBUFFER_TOKEN,
            pvBuffer: ptr::null_mut(),
        };
        let mut out_desc = SecBufferDesc {
            ulVersion: SECBUFFER_VERSION,
            cBuffers: 1,
            pBuffers: &mut out_buffer,
        };

        let mut new_handle = self.handle.unwrap_or_default();
        let mut attributes = 0u32;
        let mut expiry = 0i64;

        let status = unsafe {
            AcceptSecurityContext(
                Some(&self.credential.handle),
                self.handle.as_ref().map(|h| h as *const SecHandle),
                Some(&in_desc),
                self.flags,
                SECURITY_NATIVE_DREP,
                Some(&mut new_handle),
                Some(&mut out_desc),
                &mut attributes,
                Some(&mut expiry),
            )
        };

        if status.is_err() {
            take_output(&mut out_buffer);
            return Err(status_error("AcceptSecurityContext", status));
        }

        // Any success status means the handle now names a live context.
        self.handle = Some(new_handle);

        if status == SEC_I_COMPLETE_NEEDED || status == SEC_I_COMPLETE_AND_CONTINUE {
            let completed = unsafe { CompleteAuthToken(&new_handle, &out_desc) };
            if let Err(e) = completed {
                take_output(&mut out_buffer);
                return Err(format!("CompleteAuthToken failed: {}", e).into());
            }
        }

        let outgoing = take_output(&mut out_buffer);

        if status == SEC_E_OK || status == SEC_I_COMPLETE_NEEDED {
            Ok(Step::complete(outgoing))
        } else if status == SEC_I_CONTINUE_NEEDED || status == SEC_I_COMPLETE_AND_CONTINUE {
            Ok(Step {
                outgoing,
                complete: false,
            })
        } else {
            Err(status_error("AcceptSecurityContext", status))
        }
    }

    fn protocol(&self) -> Result<String, BoxError> {
        let package = self.negotiated_package()?;
        Ok(Protocol::from_package(&package).as_str().to_owned())
    }

    fn identity(&self) -> Result<Identity, BoxError> {
        let handle = self.established()?;
        let mut names = SecPkgContext_NamesW::default();

        unsafe {
            QueryContextAttributesW(handle, SECPKG_ATTR_NAMES, &mut names as *mut _ as *mut c_void)
        }
        .map_err(|e| format!("QueryContextAttributesW(NAMES) failed: {}", e))?;

        if names.sUserName.is_null() {
            return Err("context has no client name".into());
        }

        let name = unsafe { names.sUserName.to_string() };
        unsafe {
            let _ = FreeContextBuffer(names.sUserName.0 as *mut c_void);
        }

        Ok(Identity::new(name?, self.protocol()?))
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = unsafe { DeleteSecurityContext(&handle) } {
                log::debug!("DeleteSecurityContext failed: {}", e);
            }
        }
    }
}
