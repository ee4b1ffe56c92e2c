use alloy::primitives::{Address, Signature};

use crate::error::AppError;

/// Recovers the signer address from a worker heartbeat and checks it
/// against the worker's registered address.
///
/// Workers sign `keccak256(worker_id || monotonic_sequence || sampled_at)`
/// with the same key they registered on-chain, so the Telemetry Sink
/// never needs a separate login/session system (§4.5) — possession of the
/// chain key is the only credential.
pub fn verify_heartbeat_signature(
    message: &[u8],
    signature_bytes: &[u8],
    expected_address: Address,
) -> Result<(), AppError> {
    let signature = Signature::from_raw(signature_bytes)
        .map_err(|e| AppError::Input(format!("malformed heartbeat signature: {e}")))?;

    let recovered = signature
        .recover_address_from_msg(message)
        .map_err(|e| AppError::Input(format!("could not recover signer: {e}")))?;

    if recovered != expected_address {
        return Err(AppError::Input(format!(
            "heartbeat signed by {recovered}, expected {expected_address}"
        )));
    }

    Ok(())
}

/// Builds the canonical byte message a worker signs for a heartbeat,
/// binding the sequence number so a captured signature can't be replayed
/// with a lower sequence to roll back liveness state.
pub fn heartbeat_message(worker_id: &uuid::Uuid, monotonic_sequence: u64, sampled_at_unix: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + 8 + 8);
    buf.extend_from_slice(worker_id.as_bytes());
    buf.extend_from_slice(&monotonic_sequence.to_be_bytes());
    buf.extend_from_slice(&sampled_at_unix.to_be_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::{Signer, local::PrivateKeySigner};

    #[tokio::test]
    async fn accepts_signature_from_expected_signer() {
        let signer = PrivateKeySigner::random();
        let worker_id = uuid::Uuid::new_v4();
        let message = heartbeat_message(&worker_id, 1, 1_700_000_000);
        let signature = signer.sign_message(&message).await.unwrap();

        let result = verify_heartbeat_signature(&message, &signature.as_bytes(), signer.address());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn rejects_signature_from_wrong_signer() {
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let worker_id = uuid::Uuid::new_v4();
        let message = heartbeat_message(&worker_id, 1, 1_700_000_000);
        let signature = signer.sign_message(&message).await.unwrap();

        let result = verify_heartbeat_signature(&message, &signature.as_bytes(), other.address());
        assert!(result.is_err());
    }
}
