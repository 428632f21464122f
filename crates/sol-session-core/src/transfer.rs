use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::controller::{port_reason, WalletSessionController};
use crate::domain::{
    ConfirmationStatus, TransferForm, TransferOutcome, TransferRequest, TxSignature,
};
use crate::error::{SessionError, ValidationError};
use crate::ports::{NavigatorPort, RpcPort, WalletProviderPort};
use crate::transaction::TransferTransaction;

#[derive(Debug, Default)]
struct TransferState {
    form: TransferForm,
    outcome: Option<TransferOutcome>,
    in_flight: bool,
}

/// Builds, submits and confirms a single native SOL transfer from the
/// connected account. Never retries on its own.
pub struct TransferWorkflow<P, R, N> {
    controller: WalletSessionController<P, R, N>,
    state: Mutex<TransferState>,
}

impl<P, R, N> TransferWorkflow<P, R, N>
where
    P: WalletProviderPort,
    R: RpcPort,
    N: NavigatorPort,
{
    pub fn new(controller: WalletSessionController<P, R, N>) -> Self {
        Self {
            controller,
            state: Mutex::new(TransferState::default()),
        }
    }

    pub fn form(&self) -> TransferForm {
        self.lock().form.clone()
    }

    pub fn set_form(&self, form: TransferForm) {
        self.lock().form = form;
    }

    pub fn outcome(&self) -> Option<TransferOutcome> {
        self.lock().outcome.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Submits whatever is currently in the form.
    pub async fn submit(&self) -> Result<TransferOutcome, SessionError> {
        let form = self.form();
        self.submit_transfer(form).await
    }

    /// Validation failures come back as [`SessionError::Validation`] before
    /// the wallet is touched. Once the wallet returns a signature the call
    /// resolves to an outcome, `Confirmed` or `Failed`.
    pub async fn submit_transfer(&self, form: TransferForm) -> Result<TransferOutcome, SessionError> {
        {
            // A refused submit must not overwrite the form of the one in flight.
            let mut g = self.lock();
            if g.in_flight {
                return Err(SessionError::TransferInProgress);
            }
            g.form = form.clone();
        }
        let cell = self.controller.cell();

        let Some((ticket, from)) = cell.connected_ticket() else {
            if !cell.is_torn_down() {
                cell.update(|inner| {
                    inner.session.last_message = ValidationError::NotConnected.to_string();
                });
            }
            return Err(ValidationError::NotConnected.into());
        };
        let request = match TransferRequest::parse(&form) {
            Ok(request) => request,
            Err(e) => {
                cell.message_if_current(ticket, e.to_string());
                return Err(e.into());
            }
        };
        let provider = self.controller.provider().ok_or(SessionError::NotConnected)?;

        {
            let mut g = self.lock();
            if g.in_flight {
                return Err(SessionError::TransferInProgress);
            }
            g.in_flight = true;
            g.outcome = None;
        }
        let _in_flight = InFlight(&self.state);

        cell.message_if_current(ticket, "Processing transaction...");
        let tx = TransferTransaction::system_transfer(from, request.recipient, request.lamports);
        info!(
            %from,
            to = %request.recipient,
            lamports = request.lamports,
            "submitting transfer"
        );

        let signature = match provider.sign_and_send(&tx).await {
            Ok(signature) => signature,
            Err(e) => {
                warn!(error = %e, "transfer submission failed");
                cell.message_if_current(
                    ticket,
                    format!("Transaction failed: {}", port_reason(&e)),
                );
                return Err(e.into());
            }
        };

        let mut outcome = TransferOutcome {
            signature,
            status: ConfirmationStatus::Pending,
            error: None,
        };
        self.lock().outcome = Some(outcome.clone());

        match self.confirm(&outcome.signature).await {
            Ok(()) => {
                outcome.status = ConfirmationStatus::Confirmed;
                info!(signature = %outcome.signature, "transfer confirmed");
                cell.message_if_current(
                    ticket,
                    format!("Transaction successful! Signature: {}", outcome.signature),
                );
                {
                    let mut g = self.lock();
                    g.outcome = Some(outcome.clone());
                    if g.form == form {
                        g.form = TransferForm::default();
                    }
                }
                if let Err(e) = self.controller.refresh_balance().await {
                    warn!(error = %e, "post-transfer balance refresh failed");
                }
            }
            Err(reason) => {
                outcome.status = ConfirmationStatus::Failed;
                outcome.error = Some(reason.clone());
                warn!(signature = %outcome.signature, %reason, "transfer not confirmed");
                cell.message_if_current(ticket, format!("Transaction failed: {reason}"));
                self.lock().outcome = Some(outcome.clone());
            }
        }

        Ok(outcome)
    }

    /// Waits for confirmation under the network's validity bound, capped by
    /// the configured wall-clock timeout.
    async fn confirm(&self, signature: &TxSignature) -> Result<(), String> {
        let rpc = self.controller.rpc();
        let limit = self.controller.config().confirm_timeout;
        let confirmation = async {
            match rpc.latest_confirmation_bound().await {
                Ok(bound) => rpc.confirm_transaction(signature, &bound).await,
                Err(e) => Err(e),
            }
        };

        match tokio::time::timeout(limit, confirmation).await {
            Err(_) => Err(format!(
                "confirmation timed out after {} ms",
                limit.as_millis()
            )),
            Ok(Err(e)) => Err(port_reason(&e)),
            Ok(Ok(ConfirmationStatus::Confirmed)) => Ok(()),
            Ok(Ok(status)) => Err(format!("transaction not confirmed: {status:?}")),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight flag however the submission ends, including when
/// the caller drops the future.
struct InFlight<'a>(&'a Mutex<TransferState>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).in_flight = false;
    }
}
