//! The issuance state machine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use permit_store::{CertificateApi, StoreError};
use permit_types::{
    ClusterInfo, CredentialBundle, CsrObject, CsrState, UserName, csr_name, managed_labels,
};
use tokio::sync::OnceCell;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backoff::Backoff;
use crate::config::{ApprovalMode, IssuerConfig};
use crate::error::{IssuanceStage, IssueError, IssueResult};
use crate::keys;

const SELF_APPROVAL_REASON: &str = "PermitSelfApproved";

/// Turns user names into credential bundles.
///
/// Holds no per-user state: everything about an issuance lives in the CSR
/// object, whose name is derived from the user name. A retry after a
/// failure or timeout starts from scratch and converges on the same object.
pub struct CredentialIssuer {
    api: Arc<dyn CertificateApi>,
    config: IssuerConfig,
    cluster: OnceCell<ClusterInfo>,
}

impl CredentialIssuer {
    pub fn new(api: Arc<dyn CertificateApi>, config: IssuerConfig) -> Self {
        Self {
            api,
            config,
            cluster: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Issues a client certificate for `user`.
    ///
    /// `timeout` bounds the whole run, from reading the cluster info to
    /// receiving the certificate. On timeout or cancellation the CSR is left
    /// behind for inspection; the next attempt for the same user replaces it.
    #[instrument(skip(self, cancel), fields(user = %user, csr = %csr_name(user)))]
    pub async fn issue(
        &self,
        user: &UserName,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> IssueResult<CredentialBundle> {
        let deadline = Instant::now() + timeout;
        let name = csr_name(user);

        let material = keys::generate(user).map_err(|e| IssueError::Crypto {
            user: user.clone(),
            message: e.to_string(),
        })?;
        let request = CsrObject::client_auth(
            name.clone(),
            material.request_pem,
            self.config.signer_name.clone(),
        )
        .with_expiration_seconds(self.config.expiration_seconds())
        .with_labels(managed_labels(user));

        let (cluster, certificate_pem) = timeout_at(deadline, async {
            let cluster = self
                .guard(user, IssuanceStage::AssembleBundle, cancel, self.cluster(user))
                .await?
                .clone();
            self.submit(user, &request, cancel).await?;
            let certificate_pem = self.await_certificate(user, &request, cancel).await?;
            Ok::<_, IssueError>((cluster, certificate_pem))
        })
        .await
        .map_err(|_| {
            warn!(?timeout, "issuance timed out; leaving any CSR in place");
            IssueError::TimedOut {
                user: user.clone(),
                csr: name.clone(),
                timeout,
            }
        })??;

        if let Err(e) = self.api.delete_csr(&name).await {
            warn!(error = %e, "failed to delete CSR after issuance");
        }

        info!("issued client certificate");
        Ok(CredentialBundle::new(
            user.clone(),
            cluster,
            certificate_pem,
            material.key_pem,
        ))
    }

    /// Public endpoint and CA, read from the cluster at most once.
    async fn cluster(&self, user: &UserName) -> IssueResult<&ClusterInfo> {
        self.cluster
            .get_or_try_init(|| async {
                let info = self
                    .api
                    .cluster_info()
                    .await
                    .map_err(failed(user, IssuanceStage::AssembleBundle))?;
                debug!(cluster = %info.name, endpoint = %info.endpoint, "read cluster info");
                Ok::<_, IssueError>(info)
            })
            .await
    }

    async fn submit(
        &self,
        user: &UserName,
        request: &CsrObject,
        cancel: &CancellationToken,
    ) -> IssueResult<()> {
        let stage = IssuanceStage::SubmitCsr;
        match self.guard(user, stage, cancel, self.create(user, request)).await {
            Err(IssueError::Failed { source, .. }) if source.is_conflict() => {
                // Left by an earlier attempt whose private key is gone.
                warn!("replacing CSR left by an earlier attempt");
                self.guard(user, stage, cancel, async {
                    self.api
                        .delete_csr(&request.name)
                        .await
                        .map_err(failed(user, stage))
                })
                .await?;
                self.guard(user, stage, cancel, self.create(user, request))
                    .await?;
            }
            other => other?,
        }

        if self.config.approval == ApprovalMode::SelfApprove {
            let stage = IssuanceStage::AwaitApproval;
            let message = format!("client certificate for {user} issued by permit");
            self.guard(user, stage, cancel, async {
                self.api
                    .approve_csr(&request.name, SELF_APPROVAL_REASON, &message)
                    .await
                    .map_err(failed(user, stage))
            })
            .await?;
            debug!("approved own CSR");
        }
        Ok(())
    }

    async fn create(&self, user: &UserName, request: &CsrObject) -> IssueResult<()> {
        let outcome = self
            .api
            .create_csr(request)
            .await
            .map_err(failed(user, IssuanceStage::SubmitCsr))?;
        if outcome.created() {
            info!("submitted CSR");
        }
        Ok(())
    }

    /// Polls until the CSR reaches a terminal state.
    async fn await_certificate(
        &self,
        user: &UserName,
        request: &CsrObject,
        cancel: &CancellationToken,
    ) -> IssueResult<String> {
        let mut backoff = Backoff::new(self.config.poll_initial, self.config.poll_max);
        let mut stage = IssuanceStage::AwaitApproval;

        loop {
            match self.guard(user, stage, cancel, self.read(request)).await? {
                Ok(csr) if !csr.same_definition(request) => {
                    return Err(IssueError::Superseded {
                        user: user.clone(),
                        csr: request.name.clone(),
                    });
                }
                Ok(csr) => match csr.state() {
                    CsrState::Issued { certificate_pem } => return Ok(certificate_pem),
                    CsrState::Denied { reason } => {
                        return Err(IssueError::Denied {
                            user: user.clone(),
                            csr: request.name.clone(),
                            reason,
                        });
                    }
                    CsrState::Failed { reason } => {
                        return Err(IssueError::SignerFailed {
                            user: user.clone(),
                            csr: request.name.clone(),
                            reason,
                        });
                    }
                    CsrState::Approved => {
                        stage = IssuanceStage::FetchCertificate;
                        debug!("approved, waiting for certificate");
                    }
                    CsrState::Pending => debug!("waiting for approval"),
                },
                Err(e) if e.is_transient() => debug!(error = %e, "transient error while polling"),
                Err(e) => return Err(failed(user, stage)(e)),
            }

            let delay = backoff.next_delay();
            self.guard(user, stage, cancel, async {
                sleep(delay).await;
                Ok(())
            })
            .await?;
        }
    }

    async fn read(&self, request: &CsrObject) -> IssueResult<Result<CsrObject, StoreError>> {
        Ok(self.api.get_csr(&request.name).await)
    }

    /// Runs `fut` unless `cancel` fires first.
    async fn guard<T>(
        &self,
        user: &UserName,
        stage: IssuanceStage,
        cancel: &CancellationToken,
        fut: impl Future<Output = IssueResult<T>>,
    ) -> IssueResult<T> {
        cancel.run_until_cancelled(fut).await.unwrap_or_else(|| {
            info!(%stage, "issuance cancelled; leaving CSR in place");
            Err(IssueError::Cancelled {
                user: user.clone(),
                stage,
            })
        })
    }
}

fn failed(user: &UserName, stage: IssuanceStage) -> impl Fn(StoreError) -> IssueError + '_ {
    move |source| IssueError::Failed {
        user: user.clone(),
        stage,
        source,
    }
}
