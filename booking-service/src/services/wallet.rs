//! Wallet ledger: the single choke point for money movement.
//!
//! Every wallet mutation goes through here and is mirrored by a ledger
//! entry. Balance updates are atomic `$inc` operations so concurrent
//! settlements against the same wallet cannot drop an update; entry
//! resolution filters on `status: pending` so a terminal entry can never be
//! re-applied.

use anyhow::anyhow;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    AccountKind, Customer, EntryStatus, Gateway, LedgerEntry, Partner, TransactionType,
};

#[derive(Clone)]
pub struct WalletLedger {
    customers: Collection<Customer>,
    partners: Collection<Partner>,
    transactions: Collection<LedgerEntry>,
    partner_transactions: Collection<LedgerEntry>,
}

/// Everything needed to mint one ledger entry.
#[derive(Debug, Clone)]
pub struct PostEntry {
    pub account_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount_paise: i64,
    pub gateway: Gateway,
    pub provider_order_id: Option<String>,
    pub idempotency_key: Option<String>,
}

impl WalletLedger {
    pub fn new(db: &Database) -> Self {
        Self {
            customers: db.collection("customers"),
            partners: db.collection("partners"),
            transactions: db.collection("transactions"),
            partner_transactions: db.collection("partner_transactions"),
        }
    }

    pub async fn init_indexes(&self) -> anyhow::Result<()> {
        for entries in [&self.transactions, &self.partner_transactions] {
            // Unique sparse idempotency key: a retried settlement side can
            // never double-post.
            let idempotency_index = IndexModel::builder()
                .keys(doc! { "idempotency_key": 1 })
                .options(
                    IndexOptions::builder()
                        .name("idempotency_key_idx".to_string())
                        .unique(true)
                        .sparse(true)
                        .build(),
                )
                .build();

            let account_index = IndexModel::builder()
                .keys(doc! { "account_id": 1, "created_at": -1 })
                .options(
                    IndexOptions::builder()
                        .name("account_entries_idx".to_string())
                        .build(),
                )
                .build();

            let provider_order_index = IndexModel::builder()
                .keys(doc! { "provider_order_id": 1 })
                .options(
                    IndexOptions::builder()
                        .name("provider_order_idx".to_string())
                        .sparse(true)
                        .build(),
                )
                .build();

            entries
                .create_indexes(
                    [idempotency_index, account_index, provider_order_index],
                    None,
                )
                .await?;
        }

        tracing::info!("Wallet ledger indexes initialized");
        Ok(())
    }

    fn entries(&self, kind: AccountKind) -> &Collection<LedgerEntry> {
        match kind {
            AccountKind::Customer => &self.transactions,
            AccountKind::Partner => &self.partner_transactions,
        }
    }

    /// Post a ledger entry. A `Completed` entry applies its wallet effect
    /// atomically; a `Pending` one waits for `resolve`.
    pub async fn post(
        &self,
        kind: AccountKind,
        input: PostEntry,
        status: EntryStatus,
    ) -> Result<LedgerEntry, AppError> {
        if input.amount_paise <= 0 {
            return Err(AppError::BadRequest(anyhow!(
                "ledger amounts must be positive"
            )));
        }

        let now = mongodb::bson::DateTime::now();
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            account_id: input.account_id,
            booking_id: input.booking_id,
            transaction_type: input.transaction_type,
            amount_paise: input.amount_paise,
            gateway: input.gateway,
            status,
            provider_order_id: input.provider_order_id,
            provider_payment_id: None,
            idempotency_key: input.idempotency_key,
            created_at: now,
            updated_at: now,
        };

        self.entries(kind)
            .insert_one(&entry, None)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    AppError::Conflict(anyhow!("ledger entry already posted"))
                } else {
                    AppError::from(e)
                }
            })?;

        if status == EntryStatus::Completed {
            self.apply_balance(kind, entry.account_id, entry.signed_wallet_amount())
                .await?;
        }

        tracing::info!(
            entry_id = %entry.id,
            account_id = %entry.account_id,
            transaction_type = entry.transaction_type.as_str(),
            amount_paise = entry.amount_paise,
            status = status.as_str(),
            "Ledger entry posted"
        );

        Ok(entry)
    }

    /// Resolve a pending entry to `Completed` or `Failed`, exactly once.
    ///
    /// The filter carries `status: pending`, so an entry that is already
    /// terminal (or absent) does not match and the caller gets a conflict;
    /// the wallet is left untouched either way.
    pub async fn resolve(
        &self,
        kind: AccountKind,
        entry_id: Uuid,
        outcome: EntryStatus,
        provider_payment_id: Option<String>,
    ) -> Result<LedgerEntry, AppError> {
        if !outcome.is_terminal() {
            return Err(AppError::BadRequest(anyhow!(
                "ledger entries resolve to completed or failed"
            )));
        }

        let filter = doc! {
            "_id": entry_id.to_string(),
            "status": EntryStatus::Pending.as_str(),
        };
        let mut set = doc! {
            "status": outcome.as_str(),
            "updated_at": mongodb::bson::DateTime::now(),
        };
        if let Some(ref payment_id) = provider_payment_id {
            set.insert("provider_payment_id", payment_id.as_str());
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let entry = self
            .entries(kind)
            .find_one_and_update(filter, doc! { "$set": set }, options)
            .await?
            .ok_or_else(|| AppError::Conflict(anyhow!("transaction is not pending")))?;

        if outcome == EntryStatus::Completed {
            self.apply_balance(kind, entry.account_id, entry.signed_wallet_amount())
                .await?;
        }

        tracing::info!(
            entry_id = %entry.id,
            account_id = %entry.account_id,
            outcome = outcome.as_str(),
            "Ledger entry resolved"
        );

        Ok(entry)
    }

    /// Debit a wallet only if the balance stays at or above `floor_paise`
    /// after the debit. Solvency check and decrement are one conditional
    /// update, so two concurrent debits cannot both pass the check.
    pub async fn debit_guarded(
        &self,
        kind: AccountKind,
        input: PostEntry,
        floor_paise: i64,
    ) -> Result<LedgerEntry, AppError> {
        if input.amount_paise <= 0 {
            return Err(AppError::BadRequest(anyhow!(
                "ledger amounts must be positive"
            )));
        }
        debug_assert_eq!(
            input.transaction_type.wallet_effect(),
            Some(crate::models::Direction::Debit)
        );

        let filter = doc! {
            "_id": input.account_id.to_string(),
            "is_active": true,
            "is_deleted": false,
            "wallet_balance_paise": { "$gte": input.amount_paise + floor_paise },
        };
        let update = doc! {
            "$inc": { "wallet_balance_paise": -input.amount_paise },
            "$set": { "updated_at": mongodb::bson::DateTime::now() },
        };

        let matched = match kind {
            AccountKind::Customer => {
                self.customers
                    .update_one(filter, update, None)
                    .await?
                    .matched_count
            }
            AccountKind::Partner => {
                self.partners
                    .update_one(filter, update, None)
                    .await?
                    .matched_count
            }
        };
        if matched == 0 {
            return Err(AppError::Conflict(anyhow!("insufficient wallet balance")));
        }

        // Balance already moved; mint the matching entry without touching it
        // again.
        let now = mongodb::bson::DateTime::now();
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            account_id: input.account_id,
            booking_id: input.booking_id,
            transaction_type: input.transaction_type,
            amount_paise: input.amount_paise,
            gateway: input.gateway,
            status: EntryStatus::Completed,
            provider_order_id: input.provider_order_id,
            provider_payment_id: None,
            idempotency_key: input.idempotency_key,
            created_at: now,
            updated_at: now,
        };
        self.entries(kind)
            .insert_one(&entry, None)
            .await
            .map_err(|e| {
                tracing::error!(
                    account_id = %input.account_id,
                    amount_paise = input.amount_paise,
                    error = %e,
                    "Wallet debited but ledger entry insert failed"
                );
                AppError::from(e)
            })?;

        tracing::info!(
            entry_id = %entry.id,
            account_id = %entry.account_id,
            transaction_type = entry.transaction_type.as_str(),
            amount_paise = entry.amount_paise,
            "Guarded wallet debit applied"
        );

        Ok(entry)
    }

    pub async fn find_entry(
        &self,
        kind: AccountKind,
        entry_id: Uuid,
    ) -> Result<Option<LedgerEntry>, AppError> {
        let entry = self
            .entries(kind)
            .find_one(doc! { "_id": entry_id.to_string() }, None)
            .await?;
        Ok(entry)
    }

    /// Look up a customer entry by the gateway's order id (webhook path).
    pub async fn find_by_provider_order(
        &self,
        order_id: &str,
    ) -> Result<Option<LedgerEntry>, AppError> {
        let entry = self
            .transactions
            .find_one(doc! { "provider_order_id": order_id }, None)
            .await?;
        Ok(entry)
    }

    pub async fn list_for_account(
        &self,
        kind: AccountKind,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .limit(limit)
            .build();
        let cursor = self
            .entries(kind)
            .find(doc! { "account_id": account_id.to_string() }, options)
            .await?;
        let entries = cursor.try_collect().await?;
        Ok(entries)
    }

    pub async fn balance(&self, kind: AccountKind, account_id: Uuid) -> Result<i64, AppError> {
        let filter = doc! { "_id": account_id.to_string() };
        let balance = match kind {
            AccountKind::Customer => self
                .customers
                .find_one(filter, None)
                .await?
                .map(|c| c.wallet_balance_paise),
            AccountKind::Partner => self
                .partners
                .find_one(filter, None)
                .await?
                .map(|p| p.wallet_balance_paise),
        };
        balance.ok_or_else(|| AppError::NotFound(anyhow!("account not found")))
    }

    /// Credit a wallet unconditionally (refunds, compensation).
    pub async fn credit(
        &self,
        kind: AccountKind,
        input: PostEntry,
    ) -> Result<LedgerEntry, AppError> {
        debug_assert_eq!(
            input.transaction_type.wallet_effect(),
            Some(crate::models::Direction::Credit)
        );
        self.post(kind, input, EntryStatus::Completed).await
    }

    async fn apply_balance(
        &self,
        kind: AccountKind,
        account_id: Uuid,
        signed_delta_paise: i64,
    ) -> Result<(), AppError> {
        if signed_delta_paise == 0 {
            return Ok(());
        }
        let filter = doc! { "_id": account_id.to_string() };
        let update = doc! {
            "$inc": { "wallet_balance_paise": signed_delta_paise },
            "$set": { "updated_at": mongodb::bson::DateTime::now() },
        };
        let matched = match kind {
            AccountKind::Customer => {
                self.customers
                    .update_one(filter, update, None)
                    .await?
                    .matched_count
            }
            AccountKind::Partner => {
                self.partners
                    .update_one(filter, update, None)
                    .await?
                    .matched_count
            }
        };
        if matched == 0 {
            return Err(AppError::NotFound(anyhow!("account not found")));
        }
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        &*err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(e))
            if e.code == 11000
    )
}
