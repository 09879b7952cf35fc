//! # permit-issuer: credential issuance
//!
//! Drives one certificate-signing-request lifecycle per call:
//!
//! ```text
//! GenerateKeypair → SubmitCsr → AwaitApproval → FetchCertificate → AssembleBundle
//!                        ↘ Denied / TimedOut / Failed
//! ```
//!
//! The CSR is named after the user (see [`permit_types::csr_name`]), so a
//! retried issuance targets the same object. A CSR left by an earlier attempt
//! is replaced, since its private key died with that attempt.
//!
//! The approval wait polls with capped exponential backoff, is bounded by
//! the caller's timeout and stops promptly on cancellation. Transient API
//! errors are retried inside the wait; nothing else is.

mod backoff;
mod config;
mod error;
mod issuer;
mod keys;
pub mod kubeconfig;

pub use config::{ApprovalMode, IssuerConfig};
pub use error::{IssuanceStage, IssueError, IssueResult};
pub use issuer::CredentialIssuer;
pub use kubeconfig::KubeconfigError;
