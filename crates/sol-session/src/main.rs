//! sol-session: headless wallet session against a Solana cluster.
//!
//! Connects a local burner keypair, keeps its balance fresh, optionally sends
//! one transfer, and tears the session down on Ctrl-C.

use eyre::{eyre, WrapErr};
use tracing::{info, warn};

use sol_session_adapters::{
    BurnerWalletAdapter, SessionAdapterConfig, SolanaRpcAdapter, StaticNavigator,
};
use sol_session_core::{
    ConnectOutcome, ControllerConfig, TransferForm, TransferWorkflow, WalletSessionController,
};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cfg = SessionAdapterConfig::from_env();
    info!(rpc = %cfg.rpc_url, commitment = %cfg.commitment, "starting sol-session");

    let rpc = SolanaRpcAdapter::with_config(&cfg).wrap_err("rpc client")?;
    let wallet = match std::env::var("SOL_SESSION_BURNER_SECRET") {
        Ok(secret) => BurnerWalletAdapter::from_secret(&secret, rpc.clone())
            .wrap_err("SOL_SESSION_BURNER_SECRET")?,
        Err(_) => {
            let wallet = BurnerWalletAdapter::generate(rpc.clone());
            warn!(
                account = %wallet.account(),
                "no SOL_SESSION_BURNER_SECRET set, using a throwaway keypair"
            );
            wallet
        }
    };

    let controller_cfg = ControllerConfig {
        wallet_name: "Burner".to_owned(),
        ..cfg.controller_config()
    };
    let controller = WalletSessionController::mount(
        Some(wallet),
        rpc,
        StaticNavigator::from_config(&cfg),
        controller_cfg,
    );

    let mut updates = controller.subscribe();
    let watcher = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let s = updates.borrow_and_update().clone();
            info!(
                status = ?s.status,
                account = ?s.account.map(|a| a.to_string()),
                balance_sol = ?s.balance,
                message = %s.last_message,
                "session"
            );
        }
    });

    match controller.connect().await? {
        ConnectOutcome::Connected(account) => info!(%account, "connected"),
        other => return Err(eyre!("wallet did not connect: {other:?}")),
    }

    if let (Ok(recipient), Ok(amount)) = (
        std::env::var("SOL_SESSION_TRANSFER_TO"),
        std::env::var("SOL_SESSION_TRANSFER_AMOUNT"),
    ) {
        let workflow = TransferWorkflow::new(controller.clone());
        match workflow
            .submit_transfer(TransferForm::new(recipient, amount))
            .await
        {
            Ok(outcome) => info!(
                signature = %outcome.signature,
                status = ?outcome.status,
                error = ?outcome.error,
                "transfer finished"
            ),
            Err(e) => warn!(error = %e, "transfer rejected"),
        }
    }

    info!("watching balance, press Ctrl-C to exit");
    tokio::signal::ctrl_c().await.wrap_err("listen for ctrl-c")?;

    if let Err(e) = controller.disconnect().await {
        warn!(error = %e, "disconnect failed");
    }
    controller.teardown();
    drop(controller);
    if let Err(e) = watcher.await {
        warn!(error = %e, "session watcher ended abnormally");
    }
    info!("bye");
    Ok(())
}
