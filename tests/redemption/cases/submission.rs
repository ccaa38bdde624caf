//! Submission related end-to-end test cases

use crate::redemption::environment::{
    CHAIN_ID, Environment, NOW, PAYMASTER, SMART_ACCOUNT, request, signed_chain, transaction_hash,
    user_op_hash,
};
use alloy::{
    primitives::{Signature, U256},
    sol_types::SolCall,
};
use redeemer::{
    constants::{DELEGATION_MANAGER, ENTRYPOINT_V07},
    submitter::SubmitterConfig,
    types::contracts::ISmartAccount,
};
use std::{sync::atomic::Ordering, time::Duration};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn valid_chain_is_confirmed() -> eyre::Result<()> {
    let env = Environment::setup();
    let chain = signed_chain(1, SMART_ACCOUNT);

    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(result.success, "{}", result.error_message);

    let sent = env.bundler.sent();
    assert_eq!(sent.len(), 1);
    let op = &sent[0];
    assert_eq!(result.transaction_hash, Some(transaction_hash(user_op_hash(op))));
    assert_eq!(op.sender, SMART_ACCOUNT);

    // the account forwards the redemption to the delegation manager
    let call = ISmartAccount::executeCall::abi_decode(&op.call_data)?;
    assert_eq!(&call.executionCalldata[..20], DELEGATION_MANAGER.as_slice());

    let signature = Signature::try_from(op.signature.as_ref())?;
    let recovered = signature.recover_address_from_prehash(&op.hash(ENTRYPOINT_V07, CHAIN_ID))?;
    assert_eq!(recovered, env.signer.address());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn multi_link_chain_is_confirmed() {
    let env = Environment::setup();
    let chain = signed_chain(3, SMART_ACCOUNT);

    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(result.success, "{}", result.error_message);
    assert_eq!(env.bundler.sends(), 1);
}

#[tokio::test]
async fn tampered_signature_never_reaches_bundler() {
    let env = Environment::setup();
    let mut chain = signed_chain(1, SMART_ACCOUNT);
    let mut signature = chain[0].signature.to_vec();
    signature[10] ^= 0xff;
    chain[0].signature = signature.into();

    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(!result.success);
    assert!(result.transaction_hash.is_none());
    assert!(result.error_message.contains("InvalidSignature"), "{}", result.error_message);
    assert_eq!(env.bundler.calls(), 0);
    assert_eq!(env.chain.nonce_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn unreachable_bundler_fails_after_three_attempts() {
    let env = Environment::setup();
    env.bundler.failing_sends.store(usize::MAX, Ordering::SeqCst);
    let chain = signed_chain(1, SMART_ACCOUNT);

    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(!result.success);
    assert!(result.error_message.starts_with("SubmissionError: "), "{}", result.error_message);
    assert_eq!(env.bundler.sends(), 3);
    assert!(env.bundler.sent().is_empty());

    // the unused nonce is handed out again
    env.bundler.failing_sends.store(0, Ordering::SeqCst);
    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(result.success, "{}", result.error_message);
    assert_eq!(env.bundler.sent()[0].nonce, U256::ZERO);
}

#[tokio::test(start_paused = true)]
async fn abandoned_request_returns_its_nonce() {
    let env = Environment::setup();
    env.bundler.stalls.store(true, Ordering::SeqCst);
    let chain = signed_chain(1, SMART_ACCOUNT);

    // the caller gives up while gas estimation is still outstanding
    let abandoned = tokio::time::timeout(
        Duration::from_secs(1),
        env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(env.bundler.estimates.load(Ordering::SeqCst), 1);
    assert_eq!(env.bundler.sends(), 0);

    env.bundler.stalls.store(false, Ordering::SeqCst);
    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(result.success, "{}", result.error_message);
    assert_eq!(env.bundler.sent()[0].nonce, U256::ZERO);
    assert_eq!(env.chain.nonce_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let env = Environment::setup();
    env.bundler.failing_sends.store(2, Ordering::SeqCst);
    let chain = signed_chain(1, SMART_ACCOUNT);

    let started = tokio::time::Instant::now();
    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(result.success, "{}", result.error_message);
    assert_eq!(env.bundler.sends(), 3);
    // 100ms and 200ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn identical_requests_are_submitted_once() {
    let env = Environment::setup();
    let chain = signed_chain(1, SMART_ACCOUNT);

    let first = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    let second = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(first.success && second.success);
    assert_eq!(first.transaction_hash, second.transaction_hash);
    assert_eq!(env.bundler.sends(), 1);

    // a different marker is a different redemption
    let mut keyed = request(&chain);
    keyed.idempotency_key = Some("order-2".to_string());
    let third = env.service.redeem_at(keyed, NOW, &CancellationToken::new()).await;
    assert!(third.success, "{}", third.error_message);
    assert_ne!(third.transaction_hash, first.transaction_hash);
    assert_eq!(env.bundler.sends(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_requests_share_submission() {
    let env = Environment::setup();
    env.bundler.pending_polls.store(5, Ordering::SeqCst);
    let chain = signed_chain(1, SMART_ACCOUNT);

    let cancel = CancellationToken::new();
    let (a, b) = tokio::join!(
        env.service.redeem_at(request(&chain), NOW, &cancel),
        env.service.redeem_at(request(&chain), NOW, &cancel),
    );
    assert!(a.success && b.success);
    assert_eq!(a.transaction_hash, b.transaction_hash);
    assert_eq!(env.bundler.sends(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_distinct_requests_get_distinct_nonces() {
    let env = Environment::setup();
    env.bundler.pending_polls.store(3, Ordering::SeqCst);
    let chain = signed_chain(1, SMART_ACCOUNT);

    let mut first = request(&chain);
    first.idempotency_key = Some("a".to_string());
    let mut second = request(&chain);
    second.idempotency_key = Some("b".to_string());

    let cancel = CancellationToken::new();
    let (a, b) = tokio::join!(
        env.service.redeem_at(first, NOW, &cancel),
        env.service.redeem_at(second, NOW, &cancel),
    );
    assert!(a.success && b.success);

    let mut nonces = env.bundler.sent().iter().map(|op| op.nonce.to::<u64>()).collect::<Vec<_>>();
    nonces.sort();
    assert_eq!(nonces, vec![0, 1]);
    assert_eq!(env.chain.nonce_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_before_submission() {
    let env = Environment::setup();
    let chain = signed_chain(1, SMART_ACCOUNT);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = env.service.redeem_at(request(&chain), NOW, &cancel).await;
    assert!(result.error_message.starts_with("Cancelled: "), "{}", result.error_message);
    assert_eq!(env.bundler.sends(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_while_pending() {
    let env = Environment::setup();
    env.bundler.pending_polls.store(usize::MAX, Ordering::SeqCst);
    let chain = signed_chain(1, SMART_ACCOUNT);

    let cancel = CancellationToken::new();
    let redemption = {
        let service = env.service.clone();
        let cancel = cancel.clone();
        let request = request(&chain);
        tokio::spawn(async move { service.redeem_at(request, NOW, &cancel).await })
    };

    while env.bundler.polls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();

    let result = redemption.await.unwrap();
    assert!(result.error_message.starts_with("Cancelled: "), "{}", result.error_message);
    assert!(result.error_message.contains("while awaiting user operation"));
    assert_eq!(env.bundler.sends(), 1);
}

#[tokio::test(start_paused = true)]
async fn timed_out_submission_is_resumed() {
    let env = Environment::setup_with(
        SubmitterConfig { receipt_timeout: Duration::from_secs(1), ..Default::default() },
        false,
    );
    env.bundler.pending_polls.store(15, Ordering::SeqCst);
    let chain = signed_chain(1, SMART_ACCOUNT);

    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(result.error_message.starts_with("Timeout: "), "{}", result.error_message);
    assert_eq!(env.bundler.sends(), 1);

    // the retry waits for the operation already in flight
    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(result.success, "{}", result.error_message);
    assert_eq!(env.bundler.sends(), 1);
    let op = &env.bundler.sent()[0];
    assert_eq!(result.transaction_hash, Some(transaction_hash(user_op_hash(op))));
}

#[tokio::test(start_paused = true)]
async fn reverted_submission_can_be_retried() {
    let env = Environment::setup();
    env.bundler.reverts.store(true, Ordering::SeqCst);
    let chain = signed_chain(1, SMART_ACCOUNT);

    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(result.error_message.starts_with("SubmissionError: "), "{}", result.error_message);
    assert!(result.error_message.contains("TransferFailed()"));

    env.bundler.reverts.store(false, Ordering::SeqCst);
    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(result.success, "{}", result.error_message);
    assert_eq!(env.bundler.sends(), 2);
}

#[tokio::test(start_paused = true)]
async fn sponsored_operation_is_signed_with_paymaster() -> eyre::Result<()> {
    let env = Environment::setup_with(SubmitterConfig::default(), true);
    let chain = signed_chain(1, SMART_ACCOUNT);

    let result = env.service.redeem_at(request(&chain), NOW, &CancellationToken::new()).await;
    assert!(result.success, "{}", result.error_message);

    let paymaster = env.paymaster.as_ref().map(|p| p.sponsored.load(Ordering::SeqCst));
    assert_eq!(paymaster, Some(1));

    let op = &env.bundler.sent()[0];
    assert_eq!(op.paymaster, Some(PAYMASTER));
    let recovered = Signature::try_from(op.signature.as_ref())?
        .recover_address_from_prehash(&op.hash(ENTRYPOINT_V07, CHAIN_ID))?;
    assert_eq!(recovered, env.signer.address());
    Ok(())
}
