//! Key encoding utilities for `RocksDB`.
//!
//! This module provides functions for encoding and decoding keys used in
//! column families.

use vpn_billing_core::{AccountId, EarningId, TransactionId};

/// Create an account key from an account ID.
#[must_use]
pub fn account_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Create a subscription key. Subscriptions are keyed by their owning account.
#[must_use]
pub fn subscription_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create an account-transaction index key.
///
/// Format: `account_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for an account are sorted by
/// time within the prefix.
#[must_use]
pub fn account_transaction_key(account_id: &AccountId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Create a prefix for iterating all transactions for an account.
#[must_use]
pub fn account_transactions_prefix(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Extract the transaction ID from an account-transaction index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_transaction_id(key: &[u8]) -> TransactionId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    TransactionId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Create an external idempotency key for the transaction index.
#[must_use]
pub fn external_id_key(external_id: &str) -> Vec<u8> {
    external_id.as_bytes().to_vec()
}

/// Create a promo code key from a normalized code string.
#[must_use]
pub fn promocode_key(code: &str) -> Vec<u8> {
    code.as_bytes().to_vec()
}

/// Create a redemption record key.
///
/// Format: `promocode_id (16 bytes) || account_id (16 bytes)`, one record
/// per (code, account) pair.
#[must_use]
pub fn promocode_use_key(
    promocode_id: &vpn_billing_core::PromoCodeId,
    account_id: &AccountId,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(promocode_id.as_bytes());
    key.extend_from_slice(account_id.as_bytes());
    key
}

/// Create a referral earning key from an earning ID.
#[must_use]
pub fn earning_key(earning_id: &EarningId) -> Vec<u8> {
    earning_id.to_bytes().to_vec()
}

/// Create a beneficiary-earning index key.
///
/// Format: `account_id (16 bytes) || earning_id (16 bytes)`
#[must_use]
pub fn account_earning_key(account_id: &AccountId, earning_id: &EarningId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(account_id.as_bytes());
    key.extend_from_slice(&earning_id.to_bytes());
    key
}

/// Create a prefix for iterating all earnings for a beneficiary.
#[must_use]
pub fn account_earnings_prefix(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Extract the earning ID from a beneficiary-earning index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_earning_id(key: &[u8]) -> EarningId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    EarningId::from_bytes(bytes).expect("valid ULID bytes")
}
