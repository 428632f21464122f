use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tiny_http::{Method, Response, Server, StatusCode};

use sol_session_adapters::{BurnerWalletAdapter, SessionAdapterConfig, SolanaRpcAdapter};
use sol_session_core::{
    AccountId, ConfirmationBound, ConfirmationStatus, PortError, RpcPort, TransferTransaction,
    TxSignature, WalletProviderPort,
};

type Handler = Box<dyn Fn(&str, &Value) -> (u16, Value) + Send>;

/// JSON-RPC stub: every POST is recorded and answered by `handler` with the
/// `result` (or a full envelope when the status is not 200).
fn spawn_rpc_server(handler: Handler) -> (String, Arc<Mutex<Vec<Value>>>) {
    let server = Server::http("127.0.0.1:0").expect("bind mock server");
    let url = format!("http://{}", server.server_addr());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);

    thread::spawn(move || loop {
        let Ok(mut request) = server.recv() else {
            break;
        };
        if request.method() != &Method::Post {
            let _ = request.respond(Response::from_string("").with_status_code(StatusCode(405)));
            continue;
        }
        let mut body = String::new();
        let _ = request.as_reader().read_to_string(&mut body);
        let payload: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        record.lock().expect("record lock").push(payload.clone());

        let method = payload["method"].as_str().unwrap_or_default().to_owned();
        let (code, reply) = handler(&method, &payload["params"]);
        let envelope = if code == 200 && reply.get("error").is_none() {
            json!({ "jsonrpc": "2.0", "id": payload["id"], "result": reply })
        } else {
            reply
        };
        let _ = request
            .respond(Response::from_string(envelope.to_string()).with_status_code(StatusCode(code)));
    });

    (url, seen)
}

fn adapter(url: &str) -> SolanaRpcAdapter {
    let cfg = SessionAdapterConfig {
        rpc_url: url.to_owned(),
        rpc_timeout_ms: 5_000,
        confirm_poll_interval_ms: 10,
        ..SessionAdapterConfig::default()
    };
    SolanaRpcAdapter::with_config(&cfg).expect("rpc adapter")
}

fn bound(last_valid_block_height: u64) -> ConfirmationBound {
    ConfirmationBound {
        blockhash: bs58::encode([4u8; 32]).into_string(),
        last_valid_block_height,
    }
}

#[tokio::test]
async fn get_balance_reads_context_value() {
    let (url, seen) = spawn_rpc_server(Box::new(|method, _| match method {
        "getBalance" => (200, json!({ "context": { "slot": 1 }, "value": 1_500_000_000u64 })),
        _ => (404, json!({})),
    }));
    let rpc = adapter(&url);
    let account = AccountId::new([7u8; 32]);

    let lamports = rpc.get_balance(&account).await.expect("balance");
    assert_eq!(lamports, 1_500_000_000);

    let requests = seen.lock().expect("requests").clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["jsonrpc"], "2.0");
    assert_eq!(requests[0]["params"][0], account.to_string());
    assert_eq!(requests[0]["params"][1]["commitment"], "confirmed");
}

#[tokio::test]
async fn latest_blockhash_maps_to_confirmation_bound() {
    let hash = bs58::encode([9u8; 32]).into_string();
    let reply = json!({
        "context": { "slot": 10 },
        "value": { "blockhash": hash, "lastValidBlockHeight": 3_090u64 }
    });
    let (url, _) = spawn_rpc_server(Box::new(move |method, _| match method {
        "getLatestBlockhash" => (200, reply.clone()),
        _ => (404, json!({})),
    }));
    let rpc = adapter(&url);

    let b = rpc.latest_confirmation_bound().await.expect("bound");
    assert_eq!(b.last_valid_block_height, 3_090);
    let (raw, height) = rpc.latest_blockhash().await.expect("raw blockhash");
    assert_eq!(raw, [9u8; 32]);
    assert_eq!(height, 3_090);
    assert_eq!(b.blockhash, bs58::encode(raw).into_string());
}

#[tokio::test]
async fn confirmation_waits_for_commitment() {
    let polls = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&polls);
    let (url, _) = spawn_rpc_server(Box::new(move |method, _| match method {
        "getSignatureStatuses" => {
            let mut n = counter.lock().expect("poll counter");
            *n += 1;
            let status = if *n < 3 {
                json!({ "slot": 5, "confirmations": 0, "err": null, "confirmationStatus": "processed" })
            } else {
                json!({ "slot": 5, "confirmations": 1, "err": null, "confirmationStatus": "confirmed" })
            };
            (200, json!({ "context": { "slot": 6 }, "value": [status] }))
        }
        "getBlockHeight" => (200, json!(100)),
        _ => (404, json!({})),
    }));
    let rpc = adapter(&url);

    let status = rpc
        .confirm_transaction(&TxSignature("5sig".to_owned()), &bound(150))
        .await
        .expect("confirmed");
    assert_eq!(status, ConfirmationStatus::Confirmed);
    assert_eq!(*polls.lock().expect("polls"), 3);
}

#[tokio::test]
async fn confirmation_gives_up_past_last_valid_height() {
    let (url, _) = spawn_rpc_server(Box::new(|method, _| match method {
        "getSignatureStatuses" => (200, json!({ "context": { "slot": 6 }, "value": [null] })),
        "getBlockHeight" => (200, json!(151)),
        _ => (404, json!({})),
    }));
    let rpc = adapter(&url);

    let err = rpc
        .confirm_transaction(&TxSignature("5sig".to_owned()), &bound(150))
        .await
        .expect_err("expired");
    assert!(matches!(err, PortError::Timeout(_)), "{err:?}");
}

#[tokio::test]
async fn on_chain_error_fails_confirmation() {
    let (url, _) = spawn_rpc_server(Box::new(|method, _| match method {
        "getSignatureStatuses" => (
            200,
            json!({ "context": { "slot": 6 }, "value": [{
                "slot": 5,
                "confirmations": null,
                "err": { "InstructionError": [0, { "Custom": 1 }] },
                "confirmationStatus": "finalized"
            }] }),
        ),
        _ => (404, json!({})),
    }));
    let rpc = adapter(&url);

    let err = rpc
        .confirm_transaction(&TxSignature("5sig".to_owned()), &bound(150))
        .await
        .expect_err("on-chain failure");
    assert!(matches!(err, PortError::Rpc(ref m) if m.contains("InstructionError")), "{err:?}");
}

#[tokio::test]
async fn rpc_error_object_and_http_failure_are_distinguished() {
    let (url, _) = spawn_rpc_server(Box::new(|method, _| match method {
        "getBalance" => (
            200,
            json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32602, "message": "Invalid param" } }),
        ),
        _ => (503, json!({ "message": "overloaded" })),
    }));
    let rpc = adapter(&url);

    let err = rpc
        .get_balance(&AccountId::new([1u8; 32]))
        .await
        .expect_err("rpc error");
    assert_eq!(err, PortError::Rpc("Invalid param (code -32602)".to_owned()));

    let err = rpc.latest_confirmation_bound().await.expect_err("http error");
    assert!(matches!(err, PortError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn burner_wallet_signs_and_submits_base64_wire() {
    let blockhash = bs58::encode([2u8; 32]).into_string();
    let (url, seen) = spawn_rpc_server(Box::new(move |method, _| match method {
        "getLatestBlockhash" => (
            200,
            json!({ "context": { "slot": 1 }, "value": { "blockhash": blockhash, "lastValidBlockHeight": 10 } }),
        ),
        "sendTransaction" => (200, json!("3xSignature")),
        _ => (404, json!({})),
    }));
    let wallet = BurnerWalletAdapter::from_seed([11u8; 32], adapter(&url));
    wallet.connect().await.expect("connect");

    let to = AccountId::new([12u8; 32]);
    let tx = TransferTransaction::system_transfer(wallet.account(), to, 2_000);
    let signature = wallet.sign_and_send(&tx).await.expect("send");
    assert_eq!(signature, TxSignature("3xSignature".to_owned()));

    let requests = seen.lock().expect("requests").clone();
    let send = requests
        .iter()
        .find(|r| r["method"] == "sendTransaction")
        .expect("sendTransaction request");
    assert_eq!(send["params"][1]["encoding"], "base64");
    let wire = STANDARD
        .decode(send["params"][0].as_str().expect("wire string"))
        .expect("base64 wire");
    let message = tx.compile([2u8; 32]).expect("compile").serialize();
    assert_eq!(wire.len(), 1 + 64 + message.len());
    assert_eq!(&wire[65..], message.as_slice());
}
