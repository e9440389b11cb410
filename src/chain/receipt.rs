//! Receipt waiting and settlement extraction

use super::gateway::{ChainGateway, ReceiptLogs};
use crate::events::topics;
use crate::events::words::{single_word, topic_to_address};
use alloy::primitives::{Address, B256, U256};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Bounded wait parameters
#[derive(Debug, Clone, Copy)]
pub struct ReceiptPolicy {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll: Duration::from_secs(3),
        }
    }
}

/// Poll for a receipt until it shows up or the budget runs out.
/// Lookup errors are treated like "not yet mined".
pub async fn wait_for_receipt(
    gateway: &dyn ChainGateway,
    hash: B256,
    policy: ReceiptPolicy,
) -> Option<ReceiptLogs> {
    let wait = async {
        loop {
            match gateway.receipt(hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => debug!("Receipt for {:#x} not available yet", hash),
                Err(e) => warn!("Receipt lookup for {:#x} failed: {}", hash, e),
            }
            sleep(policy.poll).await;
        }
    };

    match timeout(policy.timeout, wait).await {
        Ok(receipt) => Some(receipt),
        Err(_) => {
            warn!(
                "Timed out after {:?} waiting for receipt {:#x}",
                policy.timeout, hash
            );
            None
        }
    }
}

/// Amount of `token` moved `from` → `to` in a receipt
pub fn extract_transfer(
    receipt: &ReceiptLogs,
    token: Address,
    from: Option<Address>,
    to: Address,
) -> Option<U256> {
    receipt.logs.iter().find_map(|log| {
        if log.address != token || log.topics.len() < 3 || log.topics[0] != topics::TRANSFER {
            return None;
        }
        let log_from = topic_to_address(&log.topics[1]);
        let log_to = topic_to_address(&log.topics[2]);
        if log_to != to || from.map_or(false, |f| f != log_from) {
            return None;
        }
        single_word(&log.data)
    })
}

/// Tokens received by `wallet` from any of `sources`
pub fn extract_token_out(
    receipt: &ReceiptLogs,
    token: Address,
    sources: &[Address],
    wallet: Address,
) -> Option<U256> {
    sources
        .iter()
        .find_map(|src| extract_transfer(receipt, token, Some(*src), wallet))
        .or_else(|| extract_transfer(receipt, token, None, wallet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::{receipt_with, transfer_log, MockGateway};
    use crate::contracts::TOKEN_MANAGER_V2;

    #[test]
    fn test_extract_manager_to_wallet_transfer() {
        let token = Address::repeat_byte(1);
        let other_token = Address::repeat_byte(2);
        let wallet = Address::repeat_byte(3);
        let receipt = receipt_with(vec![
            transfer_log(other_token, TOKEN_MANAGER_V2, wallet, U256::from(999)),
            transfer_log(token, TOKEN_MANAGER_V2, wallet, U256::from(1234)),
        ]);
        assert_eq!(
            extract_transfer(&receipt, token, Some(TOKEN_MANAGER_V2), wallet),
            Some(U256::from(1234))
        );
        assert_eq!(
            extract_transfer(&receipt, token, Some(Address::repeat_byte(4)), wallet),
            None
        );
        assert_eq!(
            extract_token_out(&receipt, token, &[Address::repeat_byte(4)], wallet),
            Some(U256::from(1234))
        );
    }

    #[tokio::test]
    async fn test_wait_times_out_without_receipt() {
        let gateway = MockGateway::new();
        let policy = ReceiptPolicy {
            timeout: Duration::from_millis(50),
            poll: Duration::from_millis(10),
        };
        assert!(wait_for_receipt(&gateway, B256::repeat_byte(1), policy).await.is_none());
    }

    #[tokio::test]
    async fn test_wait_returns_receipt() {
        let gateway = MockGateway::new();
        let hash = B256::repeat_byte(5);
        let mut receipt = receipt_with(vec![]);
        receipt.tx_hash = hash;
        gateway.insert_receipt(receipt.clone());
        let got = wait_for_receipt(&gateway, hash, ReceiptPolicy::default()).await;
        assert_eq!(got, Some(receipt));
    }
}
