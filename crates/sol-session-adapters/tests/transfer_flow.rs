mod common;

use std::sync::Arc;
use std::time::Duration;

use sol_session_adapters::{InMemoryRpcAdapter, InMemoryWalletAdapter, StaticNavigator};
use sol_session_core::{
    ConfirmationStatus, ConnectionStatus, PortError, SessionError, TransferForm,
    TransferWorkflow, ValidationError,
};

use common::{alice, bob, mount_with, quiet_config, until, Harness};

type Workflow = TransferWorkflow<InMemoryWalletAdapter, InMemoryRpcAdapter, StaticNavigator>;

const FIVE_SOL: u64 = 5_000_000_000;

async fn funded() -> (Harness, Workflow) {
    let rpc = InMemoryRpcAdapter::default();
    rpc.set_balance(alice(), FIVE_SOL).expect("seed");
    let wallet = InMemoryWalletAdapter::new("Phantom", alice()).with_ledger(rpc.clone());
    let h = mount_with(wallet, rpc, quiet_config());
    h.controller.connect().await.expect("connect");
    h.controller.refresh_balance().await.expect("refresh");
    let workflow = TransferWorkflow::new(h.controller.clone());
    (h, workflow)
}

#[tokio::test]
async fn sends_one_and_a_half_sol() {
    let (h, workflow) = funded().await;
    assert_eq!(h.controller.snapshot().balance, Some(5.0));

    let outcome = workflow
        .submit_transfer(TransferForm::new(bob().to_string(), "1.5"))
        .await
        .expect("transfer");
    assert_eq!(outcome.status, ConfirmationStatus::Confirmed);
    assert_eq!(outcome.error, None);

    let sent = h.wallet.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].fee_payer, alice());
    assert_eq!(sent[0].transfer_lamports(), 1_500_000_000);

    let s = h.controller.snapshot();
    assert_eq!(
        s.last_message,
        format!("Transaction successful! Signature: {}", outcome.signature)
    );
    assert_eq!(s.balance, Some(3.5));
    assert!(workflow.form().is_empty());
    assert_eq!(workflow.outcome(), Some(outcome));
    assert_eq!(h.rpc.balance_of(&bob()), 1_500_000_000);
}

#[tokio::test]
async fn non_positive_amounts_never_reach_the_wallet() {
    let (h, workflow) = funded().await;

    for amount in ["0", "-1", "abc", "", "0.0000000001"] {
        let err = workflow
            .submit_transfer(TransferForm::new(bob().to_string(), amount))
            .await
            .expect_err("invalid amount");
        assert!(
            matches!(
                err,
                SessionError::Validation(
                    ValidationError::InvalidAmount(_) | ValidationError::AmountTooSmall(_)
                )
            ),
            "{amount:?} gave {err:?}"
        );
        assert_eq!(h.controller.snapshot().last_message, err.to_string());
    }
    assert!(h.wallet.sent_transactions().is_empty());
    assert_eq!(workflow.form().amount, "0.0000000001");
}

#[tokio::test]
async fn recipient_is_checked_before_amount() {
    let (h, workflow) = funded().await;
    let err = workflow
        .submit_transfer(TransferForm::new("not-a-key", "-3"))
        .await
        .expect_err("invalid recipient");
    assert!(matches!(
        err,
        SessionError::Validation(ValidationError::InvalidRecipient(_))
    ));
    assert!(h.wallet.sent_transactions().is_empty());
}

#[tokio::test]
async fn transfer_requires_a_connection() {
    let rpc = InMemoryRpcAdapter::default();
    let h = mount_with(InMemoryWalletAdapter::new("Phantom", alice()), rpc, quiet_config());
    let workflow = TransferWorkflow::new(h.controller.clone());

    let err = workflow
        .submit_transfer(TransferForm::new(bob().to_string(), "1"))
        .await
        .expect_err("not connected");
    assert_eq!(err, SessionError::Validation(ValidationError::NotConnected));
    assert_eq!(
        h.controller.snapshot().last_message,
        "Please connect your wallet first"
    );
}

#[tokio::test]
async fn wallet_refusal_is_reported() {
    let (h, workflow) = funded().await;
    h.wallet
        .fail_send(Some(PortError::Rejected("User rejected the request.".to_owned())))
        .expect("script refusal");

    let err = workflow
        .submit_transfer(TransferForm::new(bob().to_string(), "1"))
        .await
        .expect_err("refused");
    assert_eq!(
        err,
        SessionError::UserRejected("User rejected the request.".to_owned())
    );
    let s = h.controller.snapshot();
    assert_eq!(s.last_message, "Transaction failed: User rejected the request.");
    assert_eq!(s.status, ConnectionStatus::Connected);
    assert_eq!(workflow.outcome(), None);
    assert!(!workflow.is_in_flight());
    assert_eq!(workflow.form().amount, "1");
}

#[tokio::test]
async fn expired_blockhash_marks_outcome_failed() {
    let (h, workflow) = funded().await;
    h.rpc
        .set_confirmation(Err(PortError::Timeout("block height exceeded".to_owned())))
        .expect("script expiry");

    let outcome = workflow
        .submit_transfer(TransferForm::new(bob().to_string(), "2"))
        .await
        .expect("outcome");
    assert_eq!(outcome.status, ConfirmationStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("block height exceeded"));
    assert_eq!(
        h.controller.snapshot().last_message,
        "Transaction failed: block height exceeded"
    );
    assert_eq!(workflow.form().amount, "2");
}

#[tokio::test(start_paused = true)]
async fn confirmation_is_capped_by_the_wall_clock() {
    let (h, workflow) = funded().await;
    h.rpc
        .set_confirm_delay(Duration::from_secs(600))
        .expect("slow confirmation");

    let outcome = workflow
        .submit_transfer(TransferForm::new(bob().to_string(), "0.25"))
        .await
        .expect("outcome");
    assert_eq!(outcome.status, ConfirmationStatus::Failed);
    assert_eq!(
        outcome.error.as_deref(),
        Some("confirmation timed out after 90000 ms")
    );
    assert_eq!(h.rpc.confirm_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn one_transfer_at_a_time() {
    let (h, workflow) = funded().await;
    h.rpc
        .set_confirm_delay(Duration::from_secs(5))
        .expect("slow confirmation");
    let workflow = Arc::new(workflow);

    let first = {
        let workflow = Arc::clone(&workflow);
        tokio::spawn(async move {
            workflow
                .submit_transfer(TransferForm::new(bob().to_string(), "1"))
                .await
        })
    };
    until("first transfer sent", || h.wallet.sent_transactions().len() == 1).await;
    assert!(workflow.is_in_flight());
    assert_eq!(
        workflow.outcome().map(|o| o.status),
        Some(ConfirmationStatus::Pending)
    );

    let err = workflow
        .submit_transfer(TransferForm::new(bob().to_string(), "2"))
        .await
        .expect_err("busy");
    assert_eq!(err, SessionError::TransferInProgress);
    assert_eq!(workflow.form(), TransferForm::new(bob().to_string(), "1"));

    let outcome = first.await.expect("join").expect("first transfer");
    assert_eq!(outcome.status, ConfirmationStatus::Confirmed);
    assert!(!workflow.is_in_flight());
    assert_eq!(h.wallet.sent_transactions().len(), 1);
    assert!(workflow.form().is_empty());
}

#[tokio::test(start_paused = true)]
async fn edits_made_during_a_transfer_survive_its_success() {
    let (h, workflow) = funded().await;
    h.rpc
        .set_confirm_delay(Duration::from_secs(5))
        .expect("slow confirmation");
    let workflow = Arc::new(workflow);

    let first = {
        let workflow = Arc::clone(&workflow);
        tokio::spawn(async move {
            workflow
                .submit_transfer(TransferForm::new(bob().to_string(), "1"))
                .await
        })
    };
    until("first transfer sent", || h.wallet.sent_transactions().len() == 1).await;

    let next = TransferForm::new(bob().to_string(), "0.25");
    workflow.set_form(next.clone());

    let outcome = first.await.expect("join").expect("first transfer");
    assert_eq!(outcome.status, ConfirmationStatus::Confirmed);
    assert_eq!(workflow.form(), next);
}
