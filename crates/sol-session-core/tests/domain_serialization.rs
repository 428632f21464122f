use sol_session_core::{
    AccountId, ConfirmationStatus, ConnectionStatus, TransferOutcome, TxSignature, WalletSession,
};

#[test]
fn account_id_serializes_as_base58() {
    let account: AccountId = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        .parse()
        .expect("token program id");
    let json = serde_json::to_string(&account).expect("serialize account");
    assert_eq!(json, "\"TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA\"");
    let back: AccountId = serde_json::from_str(&json).expect("deserialize account");
    assert_eq!(back, account);
}

#[test]
fn malformed_account_is_rejected_on_deserialize() {
    let err = serde_json::from_str::<AccountId>("\"not-an-address\"");
    assert!(err.is_err());
}

#[test]
fn default_session_is_disconnected_and_empty() {
    let session = WalletSession::default();
    assert_eq!(session.status, ConnectionStatus::Disconnected);
    assert!(session.account.is_none());
    assert!(session.balance.is_none());
    assert!(!session.is_connected());
}

#[test]
fn outcome_terminal_states() {
    let outcome = TransferOutcome {
        signature: TxSignature("5sig".to_owned()),
        status: ConfirmationStatus::Pending,
        error: None,
    };
    assert!(!outcome.status.is_terminal());
    assert!(ConfirmationStatus::Confirmed.is_terminal());
    assert!(ConfirmationStatus::Failed.is_terminal());
    let json = serde_json::to_value(&outcome).expect("serialize outcome");
    assert_eq!(json["status"], "Pending");
}
