//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//!
//! Every compound operation follows the same shape: take the relevant locks
//! (promo code before account), read and validate, then commit all affected
//! rows through one `WriteBatch`. Failed validation never writes anything.

use std::path::Path;
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use vpn_billing_core::{
    normalize_code, Account, AccountId, PromoCode, PromoCodeKind, PromoCodeUse, ReferralEarning,
    Subscription, Transaction, TransactionId, TransactionKind,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::locks::LockTable;
use crate::schema::{all_column_families, cf};
use crate::{
    DepositOutcome, DepositRequest, ExpiryOutcome, RedeemedEffect, RenewalOutcome, Store,
    TrialParams, WithdrawOutcome,
};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    account_locks: LockTable,
    promocode_locks: LockTable,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            account_locks: LockTable::new(),
            promocode_locks: LockTable::new(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_cf_value<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn require_account(&self, account_id: &AccountId) -> Result<Account> {
        self.get_account(account_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account_id.to_string(),
        })
    }

    fn require_subscription(&self, account_id: &AccountId) -> Result<Subscription> {
        self.get_subscription(account_id)?
            .ok_or_else(|| StoreError::SubscriptionNotFound {
                account_id: account_id.to_string(),
            })
    }

    /// Stage an account row into a batch.
    fn stage_account(&self, batch: &mut WriteBatch, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        batch.put_cf(&cf, keys::account_key(&account.id), Self::serialize(account)?);
        Ok(())
    }

    /// Stage a subscription row into a batch.
    fn stage_subscription(&self, batch: &mut WriteBatch, sub: &Subscription) -> Result<()> {
        let cf = self.cf(cf::SUBSCRIPTIONS)?;
        batch.put_cf(
            &cf,
            keys::subscription_key(&sub.account_id),
            Self::serialize(sub)?,
        );
        Ok(())
    }

    /// Stage a transaction and its indexes into a batch.
    fn stage_transaction(&self, batch: &mut WriteBatch, tx: &Transaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_account = self.cf(cf::TRANSACTIONS_BY_ACCOUNT)?;

        batch.put_cf(&cf_tx, keys::transaction_key(&tx.id), Self::serialize(tx)?);
        batch.put_cf(
            &cf_by_account,
            keys::account_transaction_key(&tx.account_id, &tx.id),
            [], // Index entry (empty value)
        );

        if let Some(external_id) = &tx.external_id {
            let cf_by_external = self.cf(cf::TRANSACTIONS_BY_EXTERNAL_ID)?;
            batch.put_cf(
                &cf_by_external,
                keys::external_id_key(external_id),
                tx.id.to_bytes(),
            );
        }

        Ok(())
    }

    fn build_credit_transaction(request: &DepositRequest) -> Transaction {
        match request.kind {
            TransactionKind::Refund => Transaction::refund(
                request.account_id,
                request.amount_kopeks,
                request.description.clone(),
            ),
            TransactionKind::ReferralReward => Transaction::referral_reward(
                request.account_id,
                request.amount_kopeks,
                request.description.clone(),
            ),
            // Withdrawal kinds are rejected by callers; treat anything else
            // as a plain deposit so the ledger stays consistent.
            _ => Transaction::deposit(
                request.account_id,
                request.amount_kopeks,
                request.description.clone(),
                request.external_id.clone(),
            ),
        }
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn create_account(&self, account: &Account) -> Result<()> {
        let lock = self.account_locks.lock_for(account.id.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.get_account(&account.id)?.is_some() {
            return Err(StoreError::AccountAlreadyExists {
                account_id: account.id.to_string(),
            });
        }

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, account)?;
        self.write(batch)
    }

    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.get_cf_value(cf::ACCOUNTS, &keys::account_key(account_id))
    }

    fn update_account(
        &self,
        account_id: &AccountId,
        update: &mut dyn FnMut(&mut Account),
    ) -> Result<Account> {
        let lock = self.account_locks.lock_for(account_id.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.require_account(account_id)?;
        update(&mut account);
        account.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.write(batch)?;
        Ok(account)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    fn deposit(&self, request: &DepositRequest) -> Result<DepositOutcome> {
        let lock = self.account_locks.lock_for(request.account_id.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Idempotency: a key that already settled is absorbed, not an error.
        if let Some(external_id) = &request.external_id {
            if let Some(existing) = self.find_transaction_by_external_id(external_id)? {
                let account = self.require_account(&request.account_id)?;
                return Ok(DepositOutcome {
                    transaction: existing,
                    new_balance_kopeks: account.balance_kopeks,
                    duplicate: true,
                    first_topup: false,
                });
            }
        }

        let mut account = self.require_account(&request.account_id)?;

        let transaction = Self::build_credit_transaction(request);
        account.balance_kopeks += request.amount_kopeks;
        account.updated_at = Utc::now();

        // The flag flip is part of the same batch as the balance write, so
        // exactly one deposit can ever observe it.
        let first_topup = request.kind == TransactionKind::Deposit
            && !account.has_made_first_topup
            && request
                .first_topup_threshold_kopeks
                .is_some_and(|threshold| request.amount_kopeks >= threshold);
        if first_topup {
            account.has_made_first_topup = true;
        }

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.stage_transaction(&mut batch, &transaction)?;
        self.write(batch)?;

        Ok(DepositOutcome {
            transaction,
            new_balance_kopeks: account.balance_kopeks,
            duplicate: false,
            first_topup,
        })
    }

    fn withdraw(
        &self,
        account_id: &AccountId,
        amount_kopeks: i64,
        kind: TransactionKind,
        description: String,
    ) -> Result<WithdrawOutcome> {
        let lock = self.account_locks.lock_for(account_id.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.require_account(account_id)?;

        if account.balance_kopeks < amount_kopeks {
            return Err(StoreError::InsufficientFunds {
                balance: account.balance_kopeks,
                required: amount_kopeks,
            });
        }

        let transaction = match kind {
            TransactionKind::SubscriptionPayment => {
                Transaction::subscription_payment(*account_id, amount_kopeks, description)
            }
            _ => Transaction::withdrawal(*account_id, amount_kopeks, description),
        };

        account.balance_kopeks -= amount_kopeks;
        account.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.stage_transaction(&mut batch, &transaction)?;
        self.write(batch)?;

        Ok(WithdrawOutcome {
            transaction,
            new_balance_kopeks: account.balance_kopeks,
        })
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        self.get_cf_value(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    fn find_transaction_by_external_id(&self, external_id: &str) -> Result<Option<Transaction>> {
        let cf = self.cf(cf::TRANSACTIONS_BY_EXTERNAL_ID)?;
        let Some(id_bytes) = self
            .db
            .get_cf(&cf, keys::external_id_key(external_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        if id_bytes.len() != 16 {
            return Err(StoreError::Serialization(
                "malformed external id index entry".into(),
            ));
        }
        bytes.copy_from_slice(&id_bytes);
        let transaction_id = TransactionId::from_bytes(bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.get_transaction(&transaction_id)
    }

    fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let cf_by_account = self.cf(cf::TRANSACTIONS_BY_ACCOUNT)?;
        let prefix = keys::account_transactions_prefix(account_id);

        let iter = self.db.iterator_cf(
            &cf_by_account,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        // ULIDs sort chronologically within the prefix; collect and reverse
        // for newest-first.
        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }
        all_keys.reverse();

        let mut transactions = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if transactions.len() >= limit {
                break;
            }
            let tx_id = keys::extract_transaction_id(&key);
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    fn create_subscription(&self, subscription: &Subscription) -> Result<()> {
        let lock = self
            .account_locks
            .lock_for(subscription.account_id.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.require_account(&subscription.account_id)?;

        if self.get_subscription(&subscription.account_id)?.is_some() {
            return Err(StoreError::SubscriptionAlreadyExists {
                account_id: subscription.account_id.to_string(),
            });
        }

        let mut batch = WriteBatch::default();
        self.stage_subscription(&mut batch, subscription)?;
        self.write(batch)
    }

    fn get_subscription(&self, account_id: &AccountId) -> Result<Option<Subscription>> {
        self.get_cf_value(cf::SUBSCRIPTIONS, &keys::subscription_key(account_id))
    }

    fn update_subscription(
        &self,
        account_id: &AccountId,
        update: &mut dyn FnMut(&mut Subscription),
    ) -> Result<Subscription> {
        let lock = self.account_locks.lock_for(account_id.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut subscription = self.require_subscription(account_id)?;
        update(&mut subscription);
        subscription.updated_at = Utc::now();

        let mut batch = WriteBatch::default();
        self.stage_subscription(&mut batch, &subscription)?;
        self.write(batch)?;
        Ok(subscription)
    }

    fn resolve_expiry(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<ExpiryOutcome>> {
        let lock = self.account_locks.lock_for(account_id.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(mut subscription) = self.get_subscription(account_id)? else {
            return Ok(None);
        };

        let transitioned = subscription.resolve_expiry(now);
        if transitioned {
            let mut batch = WriteBatch::default();
            self.stage_subscription(&mut batch, &subscription)?;
            self.write(batch)?;
        }

        Ok(Some(ExpiryOutcome {
            subscription,
            transitioned,
        }))
    }

    fn renew_subscription(
        &self,
        account_id: &AccountId,
        price_kopeks: i64,
        period_days: u32,
        now: DateTime<Utc>,
    ) -> Result<RenewalOutcome> {
        let lock = self.account_locks.lock_for(account_id.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut subscription = self.require_subscription(account_id)?;

        // Re-check under the lock. A concurrent pass that already renewed
        // pushed the end date out of the window, so this pass backs off
        // instead of charging twice.
        if !subscription.is_autopay_due(now) {
            return Ok(RenewalOutcome::NotDue);
        }

        let mut account = self.require_account(account_id)?;
        if account.balance_kopeks < price_kopeks {
            return Err(StoreError::InsufficientFunds {
                balance: account.balance_kopeks,
                required: price_kopeks,
            });
        }

        let transaction = Transaction::subscription_payment(
            *account_id,
            price_kopeks,
            format!("Subscription renewal, {period_days} days"),
        );

        account.balance_kopeks -= price_kopeks;
        account.has_had_paid_subscription = true;
        account.updated_at = now;

        subscription.extend(now, period_days);
        subscription.mark_paid();

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.stage_subscription(&mut batch, &subscription)?;
        self.stage_transaction(&mut batch, &transaction)?;
        self.write(batch)?;

        Ok(RenewalOutcome::Renewed {
            subscription,
            transaction,
            new_balance_kopeks: account.balance_kopeks,
        })
    }

    fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let cf = self.cf(cf::SUBSCRIPTIONS)?;
        let mut subscriptions = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            subscriptions.push(Self::deserialize(&value)?);
        }

        Ok(subscriptions)
    }

    // =========================================================================
    // Promo Code Operations
    // =========================================================================

    fn create_promocode(&self, promocode: &PromoCode) -> Result<()> {
        let lock = self.promocode_locks.lock_for(promocode.code.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.get_promocode(&promocode.code)?.is_some() {
            return Err(StoreError::Conflict(format!(
                "promo code already exists: {}",
                promocode.code
            )));
        }

        let cf = self.cf(cf::PROMOCODES)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf,
            keys::promocode_key(&promocode.code),
            Self::serialize(promocode)?,
        );
        self.write(batch)
    }

    fn get_promocode(&self, code: &str) -> Result<Option<PromoCode>> {
        let normalized = normalize_code(code);
        self.get_cf_value(cf::PROMOCODES, &keys::promocode_key(&normalized))
    }

    fn update_promocode(
        &self,
        code: &str,
        update: &mut dyn FnMut(&mut PromoCode),
    ) -> Result<PromoCode> {
        let normalized = normalize_code(code);
        let lock = self.promocode_locks.lock_for(normalized.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut promocode =
            self.get_promocode(&normalized)?
                .ok_or_else(|| StoreError::PromoCodeNotFound {
                    code: normalized.clone(),
                })?;
        update(&mut promocode);
        promocode.updated_at = Utc::now();

        let cf = self.cf(cf::PROMOCODES)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf,
            keys::promocode_key(&promocode.code),
            Self::serialize(&promocode)?,
        );
        self.write(batch)?;
        Ok(promocode)
    }

    fn list_promocodes(&self) -> Result<Vec<PromoCode>> {
        let cf = self.cf(cf::PROMOCODES)?;
        let mut promocodes = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            promocodes.push(Self::deserialize(&value)?);
        }

        Ok(promocodes)
    }

    #[allow(clippy::too_many_lines)]
    fn redeem_promocode(
        &self,
        account_id: &AccountId,
        code: &str,
        now: DateTime<Utc>,
        trial: &TrialParams,
    ) -> Result<RedeemedEffect> {
        let normalized = normalize_code(code);

        // Lock order: code first, then account.
        let code_lock = self.promocode_locks.lock_for(normalized.as_bytes());
        let _code_guard = code_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut promocode =
            self.get_promocode(&normalized)?
                .ok_or_else(|| StoreError::PromoCodeNotFound {
                    code: normalized.clone(),
                })?;

        if !promocode.is_valid_at(now) {
            return Err(StoreError::PromoCodeExpired {
                code: normalized.clone(),
            });
        }

        if promocode.is_exhausted() {
            return Err(StoreError::PromoCodeExhausted {
                code: normalized.clone(),
            });
        }

        let account_lock = self.account_locks.lock_for(account_id.as_bytes());
        let _account_guard = account_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let use_key = keys::promocode_use_key(&promocode.id, account_id);
        let cf_uses = self.cf(cf::PROMOCODE_USES)?;
        let already_used = self
            .db
            .get_cf(&cf_uses, &use_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if already_used {
            return Err(StoreError::PromoCodeAlreadyUsed {
                code: normalized.clone(),
            });
        }

        let mut account = self.require_account(account_id)?;

        // Stage the use record, the counter increment, and the effect, then
        // commit everything in one batch.
        let mut batch = WriteBatch::default();

        promocode.current_uses += 1;
        promocode.updated_at = now;
        let cf_codes = self.cf(cf::PROMOCODES)?;
        batch.put_cf(
            &cf_codes,
            keys::promocode_key(&promocode.code),
            Self::serialize(&promocode)?,
        );

        let use_record = PromoCodeUse {
            promocode_id: promocode.id,
            account_id: *account_id,
            used_at: now,
        };
        batch.put_cf(&cf_uses, &use_key, Self::serialize(&use_record)?);

        let effect = match &promocode.kind {
            PromoCodeKind::Balance { bonus_kopeks } => {
                let transaction = Transaction::deposit(
                    *account_id,
                    *bonus_kopeks,
                    format!("Promo code {normalized}"),
                    None,
                );
                account.balance_kopeks += bonus_kopeks;
                account.updated_at = now;

                self.stage_account(&mut batch, &account)?;
                self.stage_transaction(&mut batch, &transaction)?;

                RedeemedEffect::BalanceCredited {
                    transaction,
                    new_balance_kopeks: account.balance_kopeks,
                }
            }
            PromoCodeKind::SubscriptionDays { days } => {
                // Extends the current subscription, or starts a paid one with
                // the configured default allowances when the account has none.
                let subscription = match self.get_subscription(account_id)? {
                    Some(mut subscription) => {
                        subscription.extend(now, *days);
                        subscription
                    }
                    None => Subscription::paid(
                        *account_id,
                        *days,
                        trial.traffic_limit_gb,
                        trial.device_limit,
                        trial.group.into_iter().collect(),
                        trial.autopay_days_before,
                    ),
                };
                self.stage_subscription(&mut batch, &subscription)?;

                RedeemedEffect::SubscriptionExtended { subscription }
            }
            PromoCodeKind::TrialSubscription => {
                if self.get_subscription(account_id)?.is_some() {
                    return Err(StoreError::SubscriptionAlreadyExists {
                        account_id: account_id.to_string(),
                    });
                }

                let subscription = Subscription::trial(
                    *account_id,
                    trial.duration_days,
                    trial.traffic_limit_gb,
                    trial.device_limit,
                    trial.group,
                    trial.autopay_days_before,
                );
                self.stage_subscription(&mut batch, &subscription)?;

                RedeemedEffect::TrialGranted { subscription }
            }
        };

        self.write(batch)?;
        Ok(effect)
    }

    // =========================================================================
    // Referral Operations
    // =========================================================================

    fn record_referral_payout(
        &self,
        earning: &ReferralEarning,
        description: String,
    ) -> Result<DepositOutcome> {
        let lock = self
            .account_locks
            .lock_for(earning.beneficiary_id.as_bytes());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut account = self.require_account(&earning.beneficiary_id)?;

        let transaction = Transaction::referral_reward(
            earning.beneficiary_id,
            earning.amount_kopeks,
            description,
        );

        account.balance_kopeks += earning.amount_kopeks;
        account.updated_at = Utc::now();

        let cf_earnings = self.cf(cf::REFERRAL_EARNINGS)?;
        let cf_by_account = self.cf(cf::EARNINGS_BY_ACCOUNT)?;

        let mut batch = WriteBatch::default();
        self.stage_account(&mut batch, &account)?;
        self.stage_transaction(&mut batch, &transaction)?;
        batch.put_cf(
            &cf_earnings,
            keys::earning_key(&earning.id),
            Self::serialize(earning)?,
        );
        batch.put_cf(
            &cf_by_account,
            keys::account_earning_key(&earning.beneficiary_id, &earning.id),
            [],
        );
        self.write(batch)?;

        Ok(DepositOutcome {
            transaction,
            new_balance_kopeks: account.balance_kopeks,
            duplicate: false,
            first_topup: false,
        })
    }

    fn list_referral_earnings(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ReferralEarning>> {
        let cf_by_account = self.cf(cf::EARNINGS_BY_ACCOUNT)?;
        let cf_earnings = self.cf(cf::REFERRAL_EARNINGS)?;
        let prefix = keys::account_earnings_prefix(account_id);

        let iter = self.db.iterator_cf(
            &cf_by_account,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut all_keys: Vec<Vec<u8>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            all_keys.push(key.to_vec());
        }
        all_keys.reverse();

        let mut earnings = Vec::new();
        for key in all_keys.into_iter().skip(offset) {
            if earnings.len() >= limit {
                break;
            }
            let earning_id = keys::extract_earning_id(&key);
            if let Some(data) = self
                .db
                .get_cf(&cf_earnings, keys::earning_key(&earning_id))
                .map_err(|e| StoreError::Database(e.to_string()))?
            {
                earnings.push(Self::deserialize(&data)?);
            }
        }

        Ok(earnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;
    use vpn_billing_core::SubscriptionStatus;

    fn create_test_store() -> (Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (Arc::new(store), dir)
    }

    fn create_funded_account(store: &RocksStore, balance: i64) -> AccountId {
        let account = Account::new(AccountId::generate(), None);
        store.create_account(&account).unwrap();
        if balance > 0 {
            store
                .deposit(&DepositRequest {
                    account_id: account.id,
                    amount_kopeks: balance,
                    kind: TransactionKind::Deposit,
                    description: "seed".into(),
                    external_id: None,
                    first_topup_threshold_kopeks: None,
                })
                .unwrap();
        }
        account.id
    }

    fn trial_params() -> TrialParams {
        TrialParams {
            duration_days: 3,
            traffic_limit_gb: 10,
            device_limit: 2,
            group: None,
            autopay_days_before: 3,
        }
    }

    /// Balance must equal the signed sum of completed transactions.
    fn assert_ledger_conserved(store: &RocksStore, account_id: &AccountId) {
        let account = store.get_account(account_id).unwrap().unwrap();
        let transactions = store.list_transactions(account_id, 10_000, 0).unwrap();
        let sum: i64 = transactions
            .iter()
            .filter(|t| t.is_completed)
            .map(Transaction::signed_amount)
            .sum();
        assert_eq!(account.balance_kopeks, sum);
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    #[test]
    fn account_crud() {
        let (store, _dir) = create_test_store();
        let account = Account::new(AccountId::generate(), None);

        store.create_account(&account).unwrap();
        let retrieved = store.get_account(&account.id).unwrap().unwrap();
        assert_eq!(retrieved.balance_kopeks, 0);

        let result = store.create_account(&account);
        assert!(matches!(
            result,
            Err(StoreError::AccountAlreadyExists { .. })
        ));

        let updated = store
            .update_account(&account.id, &mut |a| {
                a.status = vpn_billing_core::AccountStatus::Blocked;
            })
            .unwrap();
        assert_eq!(updated.status, vpn_billing_core::AccountStatus::Blocked);
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    #[test]
    fn deposit_and_withdraw() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 50_000);

        let outcome = store
            .withdraw(
                &account_id,
                20_000,
                TransactionKind::SubscriptionPayment,
                "30 day subscription".into(),
            )
            .unwrap();
        assert_eq!(outcome.new_balance_kopeks, 30_000);

        assert_ledger_conserved(&store, &account_id);
    }

    #[test]
    fn withdraw_insufficient_funds_leaves_no_trace() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 10_000);

        let result = store.withdraw(
            &account_id,
            15_000,
            TransactionKind::Withdrawal,
            "too much".into(),
        );
        assert!(matches!(
            result,
            Err(StoreError::InsufficientFunds {
                balance: 10_000,
                required: 15_000
            })
        ));

        let account = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(account.balance_kopeks, 10_000);
        // Only the seed deposit is in the log.
        assert_eq!(store.list_transactions(&account_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn deposit_idempotent_on_external_id() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        let request = DepositRequest {
            account_id,
            amount_kopeks: 50_000,
            kind: TransactionKind::Deposit,
            description: "gateway payment".into(),
            external_id: Some("pay_abc".into()),
            first_topup_threshold_kopeks: None,
        };

        let first = store.deposit(&request).unwrap();
        assert!(!first.duplicate);
        assert_eq!(first.new_balance_kopeks, 50_000);

        let second = store.deposit(&request).unwrap();
        assert!(second.duplicate);
        assert_eq!(second.new_balance_kopeks, 50_000);
        assert_eq!(second.transaction.id, first.transaction.id);

        assert_ledger_conserved(&store, &account_id);
    }

    #[test]
    fn first_topup_flag_flips_exactly_once() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        let mut request = DepositRequest {
            account_id,
            amount_kopeks: 5_000,
            kind: TransactionKind::Deposit,
            description: "small topup".into(),
            external_id: None,
            first_topup_threshold_kopeks: Some(10_000),
        };

        // Below the threshold: no flip.
        let outcome = store.deposit(&request).unwrap();
        assert!(!outcome.first_topup);

        // At the threshold: flips.
        request.amount_kopeks = 10_000;
        let outcome = store.deposit(&request).unwrap();
        assert!(outcome.first_topup);

        // Never flips again.
        request.amount_kopeks = 100_000;
        let outcome = store.deposit(&request).unwrap();
        assert!(!outcome.first_topup);

        let account = store.get_account(&account_id).unwrap().unwrap();
        assert!(account.has_made_first_topup);
    }

    #[test]
    fn concurrent_first_topup_single_observer() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .deposit(&DepositRequest {
                            account_id,
                            amount_kopeks: 20_000,
                            kind: TransactionKind::Deposit,
                            description: format!("topup {i}"),
                            external_id: None,
                            first_topup_threshold_kopeks: Some(10_000),
                        })
                        .unwrap()
                })
            })
            .collect();

        let flips = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| o.first_topup)
            .count();
        assert_eq!(flips, 1);
    }

    #[test]
    fn concurrent_mixed_traffic_conserves_ledger() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 100_000);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for j in 0..10 {
                        if i % 2 == 0 {
                            store
                                .deposit(&DepositRequest {
                                    account_id,
                                    amount_kopeks: 1_000,
                                    kind: TransactionKind::Deposit,
                                    description: format!("deposit {i}-{j}"),
                                    external_id: None,
                                    first_topup_threshold_kopeks: None,
                                })
                                .unwrap();
                        } else {
                            // May legitimately fail when drained.
                            let _ = store.withdraw(
                                &account_id,
                                1_500,
                                TransactionKind::Withdrawal,
                                format!("debit {i}-{j}"),
                            );
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let account = store.get_account(&account_id).unwrap().unwrap();
        assert!(account.balance_kopeks >= 0);
        assert_ledger_conserved(&store, &account_id);
    }

    #[test]
    fn concurrent_withdrawals_never_go_negative() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 10_000);

        // 3_000 each; only 3 of 5 can succeed.
        let handles: Vec<_> = (0..5)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .withdraw(
                            &account_id,
                            3_000,
                            TransactionKind::Withdrawal,
                            format!("debit {i}"),
                        )
                        .is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .filter(|h| *h.join().as_ref().unwrap())
            .count();
        assert_eq!(successes, 3);

        let account = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(account.balance_kopeks, 1_000);
        assert_ledger_conserved(&store, &account_id);
    }

    #[test]
    fn list_transactions_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        for i in 0..3 {
            store
                .deposit(&DepositRequest {
                    account_id,
                    amount_kopeks: 1_000 * (i + 1),
                    kind: TransactionKind::Deposit,
                    description: format!("deposit {i}"),
                    external_id: None,
                    first_topup_threshold_kopeks: None,
                })
                .unwrap();
            thread::sleep(std::time::Duration::from_millis(2)); // Distinct ULID timestamps
        }

        let all = store.list_transactions(&account_id, 10, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].description, "deposit 2");
        assert_eq!(all[2].description, "deposit 0");

        let page = store.list_transactions(&account_id, 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].description, "deposit 1");
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    #[test]
    fn subscription_lifecycle() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        let sub = Subscription::paid(account_id, 30, 100, 1, Vec::new(), 3);
        store.create_subscription(&sub).unwrap();

        let result = store.create_subscription(&sub);
        assert!(matches!(
            result,
            Err(StoreError::SubscriptionAlreadyExists { .. })
        ));

        let updated = store
            .update_subscription(&account_id, &mut |s| s.device_limit = 5)
            .unwrap();
        assert_eq!(updated.device_limit, 5);
    }

    #[test]
    fn resolve_expiry_transitions_once() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        let sub = Subscription::paid(account_id, 30, 100, 1, Vec::new(), 3);
        store.create_subscription(&sub).unwrap();

        let future = Utc::now() + chrono::Duration::days(40);

        let outcome = store.resolve_expiry(&account_id, future).unwrap().unwrap();
        assert!(outcome.transitioned);
        assert_eq!(outcome.subscription.status, SubscriptionStatus::Expired);

        let outcome = store.resolve_expiry(&account_id, future).unwrap().unwrap();
        assert!(!outcome.transitioned);
    }

    #[test]
    fn resolve_expiry_without_subscription() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        assert!(store
            .resolve_expiry(&account_id, Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn renew_subscription_charges_and_extends() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 200_000);

        let mut sub = Subscription::paid(account_id, 30, 100, 1, Vec::new(), 3);
        sub.autopay_enabled = true;
        sub.end_date = Utc::now() + chrono::Duration::days(2);
        store.create_subscription(&sub).unwrap();

        let now = Utc::now();
        let outcome = store
            .renew_subscription(&account_id, 99_000, 30, now)
            .unwrap();

        match outcome {
            RenewalOutcome::Renewed {
                subscription,
                new_balance_kopeks,
                ..
            } => {
                assert_eq!(new_balance_kopeks, 101_000);
                assert!(subscription.end_date > now + chrono::Duration::days(30));
            }
            RenewalOutcome::NotDue => panic!("expected renewal"),
        }

        // Extended out of the window now: a second pass backs off.
        let outcome = store
            .renew_subscription(&account_id, 99_000, 30, now)
            .unwrap();
        assert!(matches!(outcome, RenewalOutcome::NotDue));

        assert_ledger_conserved(&store, &account_id);
    }

    #[test]
    fn renew_subscription_revives_expired() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 200_000);

        let mut sub = Subscription::paid(account_id, 30, 100, 1, Vec::new(), 3);
        sub.autopay_enabled = true;
        sub.end_date = Utc::now() - chrono::Duration::days(2);
        store.create_subscription(&sub).unwrap();

        // Persist the expiry first, the way the sweep does when the balance
        // was still empty.
        let outcome = store
            .resolve_expiry(&account_id, Utc::now())
            .unwrap()
            .unwrap();
        assert!(outcome.transitioned);

        let now = Utc::now();
        let outcome = store
            .renew_subscription(&account_id, 99_000, 30, now)
            .unwrap();

        match outcome {
            RenewalOutcome::Renewed { subscription, .. } => {
                assert_eq!(subscription.status, SubscriptionStatus::Active);
                assert!(subscription.end_date > now + chrono::Duration::days(29));
            }
            RenewalOutcome::NotDue => panic!("expected renewal"),
        }

        assert_ledger_conserved(&store, &account_id);
    }

    #[test]
    fn renew_subscription_insufficient_funds() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 5_000);

        let mut sub = Subscription::paid(account_id, 30, 100, 1, Vec::new(), 3);
        sub.autopay_enabled = true;
        sub.end_date = Utc::now() + chrono::Duration::days(1);
        store.create_subscription(&sub).unwrap();

        let result = store.renew_subscription(&account_id, 99_000, 30, Utc::now());
        assert!(matches!(result, Err(StoreError::InsufficientFunds { .. })));

        // Nothing moved.
        let account = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(account.balance_kopeks, 5_000);
    }

    #[test]
    fn concurrent_renewals_charge_once() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 500_000);

        let mut sub = Subscription::paid(account_id, 30, 100, 1, Vec::new(), 3);
        sub.autopay_enabled = true;
        sub.end_date = Utc::now() + chrono::Duration::days(1);
        store.create_subscription(&sub).unwrap();

        let now = Utc::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.renew_subscription(&account_id, 99_000, 30, now))
            })
            .collect();

        let renewed = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .filter(|o| matches!(o, RenewalOutcome::Renewed { .. }))
            .count();
        assert_eq!(renewed, 1);

        let account = store.get_account(&account_id).unwrap().unwrap();
        assert_eq!(account.balance_kopeks, 401_000);
    }

    // =========================================================================
    // Promo codes
    // =========================================================================

    #[test]
    fn redeem_balance_code() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        let code = PromoCode::new(
            "BONUS100",
            PromoCodeKind::Balance {
                bonus_kopeks: 10_000,
            },
            5,
            None,
            None,
        );
        store.create_promocode(&code).unwrap();

        // Lookup is case-insensitive.
        let effect = store
            .redeem_promocode(&account_id, "bonus100", Utc::now(), &trial_params())
            .unwrap();

        match effect {
            RedeemedEffect::BalanceCredited {
                new_balance_kopeks, ..
            } => assert_eq!(new_balance_kopeks, 10_000),
            other => panic!("unexpected effect: {other:?}"),
        }

        let stored = store.get_promocode("BONUS100").unwrap().unwrap();
        assert_eq!(stored.current_uses, 1);
        assert_ledger_conserved(&store, &account_id);
    }

    #[test]
    fn redeem_checks_run_in_order() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);
        let now = Utc::now();

        assert!(matches!(
            store.redeem_promocode(&account_id, "MISSING", now, &trial_params()),
            Err(StoreError::PromoCodeNotFound { .. })
        ));

        let expired = PromoCode::new(
            "OLD",
            PromoCodeKind::Balance { bonus_kopeks: 1000 },
            5,
            None,
            Some(now - chrono::Duration::days(1)),
        );
        store.create_promocode(&expired).unwrap();
        assert!(matches!(
            store.redeem_promocode(&account_id, "OLD", now, &trial_params()),
            Err(StoreError::PromoCodeExpired { .. })
        ));

        let mut exhausted = PromoCode::new(
            "GONE",
            PromoCodeKind::Balance { bonus_kopeks: 1000 },
            1,
            None,
            None,
        );
        exhausted.current_uses = 1;
        store.create_promocode(&exhausted).unwrap();
        assert!(matches!(
            store.redeem_promocode(&account_id, "GONE", now, &trial_params()),
            Err(StoreError::PromoCodeExhausted { .. })
        ));
    }

    #[test]
    fn redeem_twice_fails_per_account() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        let code = PromoCode::new(
            "ONCE",
            PromoCodeKind::Balance { bonus_kopeks: 1000 },
            10,
            None,
            None,
        );
        store.create_promocode(&code).unwrap();

        store
            .redeem_promocode(&account_id, "ONCE", Utc::now(), &trial_params())
            .unwrap();
        let result = store.redeem_promocode(&account_id, "ONCE", Utc::now(), &trial_params());
        assert!(matches!(result, Err(StoreError::PromoCodeAlreadyUsed { .. })));

        // The failed attempt must not consume a use.
        let stored = store.get_promocode("ONCE").unwrap().unwrap();
        assert_eq!(stored.current_uses, 1);
    }

    #[test]
    fn concurrent_redemptions_respect_max_uses() {
        let (store, _dir) = create_test_store();

        let code = PromoCode::new(
            "SCARCE",
            PromoCodeKind::Balance { bonus_kopeks: 1000 },
            3,
            None,
            None,
        );
        store.create_promocode(&code).unwrap();

        let accounts: Vec<AccountId> =
            (0..7).map(|_| create_funded_account(&store, 0)).collect();

        let handles: Vec<_> = accounts
            .into_iter()
            .map(|account_id| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .redeem_promocode(&account_id, "SCARCE", Utc::now(), &trial_params())
                        .is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .filter(|h| *h.join().as_ref().unwrap())
            .count();
        assert_eq!(successes, 3);

        let stored = store.get_promocode("SCARCE").unwrap().unwrap();
        assert_eq!(stored.current_uses, 3);
    }

    #[test]
    fn days_code_grants_subscription_when_none_exists() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        let code = PromoCode::new("WEEK", PromoCodeKind::SubscriptionDays { days: 7 }, 5, None, None);
        store.create_promocode(&code).unwrap();

        let now = Utc::now();
        let effect = store
            .redeem_promocode(&account_id, "WEEK", now, &trial_params())
            .unwrap();

        let granted = match effect {
            RedeemedEffect::SubscriptionExtended { subscription } => subscription,
            other => panic!("unexpected effect: {other:?}"),
        };
        assert_eq!(granted.status, SubscriptionStatus::Active);
        assert!(!granted.is_trial);
        assert_eq!(granted.traffic_limit_gb, trial_params().traffic_limit_gb);
        assert_eq!(granted.device_limit, trial_params().device_limit);
        let days_left = (granted.end_date - now).num_days();
        assert!((6..=7).contains(&days_left), "days_left = {days_left}");

        let stored = store.get_subscription(&account_id).unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
    }

    #[test]
    fn days_code_extends_existing_subscription() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        let code = PromoCode::new("WEEK", PromoCodeKind::SubscriptionDays { days: 7 }, 5, None, None);
        store.create_promocode(&code).unwrap();

        let sub = Subscription::paid(account_id, 30, 100, 1, Vec::new(), 3);
        store.create_subscription(&sub).unwrap();

        let effect = store
            .redeem_promocode(&account_id, "WEEK", Utc::now(), &trial_params())
            .unwrap();
        match effect {
            RedeemedEffect::SubscriptionExtended { subscription } => {
                assert!(subscription.end_date > sub.end_date);
                // The existing allowances are untouched.
                assert_eq!(subscription.traffic_limit_gb, 100);
                assert_eq!(subscription.device_limit, 1);
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn trial_code_rejects_existing_subscription() {
        let (store, _dir) = create_test_store();
        let account_id = create_funded_account(&store, 0);

        let code = PromoCode::new("TRYIT", PromoCodeKind::TrialSubscription, 5, None, None);
        store.create_promocode(&code).unwrap();

        let effect = store
            .redeem_promocode(&account_id, "TRYIT", Utc::now(), &trial_params())
            .unwrap();
        assert!(matches!(effect, RedeemedEffect::TrialGranted { .. }));

        let sub = store.get_subscription(&account_id).unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Trial);

        let other = create_funded_account(&store, 0);
        let code2 = PromoCode::new("TRYIT2", PromoCodeKind::TrialSubscription, 5, None, None);
        store.create_promocode(&code2).unwrap();
        let sub2 = Subscription::paid(other, 30, 100, 1, Vec::new(), 3);
        store.create_subscription(&sub2).unwrap();

        let result = store.redeem_promocode(&other, "TRYIT2", Utc::now(), &trial_params());
        assert!(matches!(
            result,
            Err(StoreError::SubscriptionAlreadyExists { .. })
        ));
        // No use consumed by the failed trial grant.
        let stored = store.get_promocode("TRYIT2").unwrap().unwrap();
        assert_eq!(stored.current_uses, 0);
    }

    // =========================================================================
    // Referrals
    // =========================================================================

    #[test]
    fn referral_payout_credits_and_records() {
        let (store, _dir) = create_test_store();
        let inviter = create_funded_account(&store, 0);
        let referred = create_funded_account(&store, 0);

        let earning = ReferralEarning::new(
            inviter,
            referred,
            12_500,
            vpn_billing_core::EarningReason::TopupCommission,
            None,
        );

        let outcome = store
            .record_referral_payout(&earning, "Referral commission".into())
            .unwrap();
        assert_eq!(outcome.new_balance_kopeks, 12_500);
        assert_eq!(
            outcome.transaction.kind,
            TransactionKind::ReferralReward
        );

        let earnings = store.list_referral_earnings(&inviter, 10, 0).unwrap();
        assert_eq!(earnings.len(), 1);
        assert_eq!(earnings[0].amount_kopeks, 12_500);

        assert_ledger_conserved(&store, &inviter);
    }
}
