//! `SqliteDatabase` is the SQLite implementation of the [`PaymentStore`] trait.
//!
//! Every method delegates to the free functions in [`super::db`]. Writes run inside a transaction that is committed
//! before the method returns, so the change is visible to every other pooled connection. Settlement also does its
//! follow-up read inside that transaction.
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{new_pool, payments, recycled_indices};
use crate::{
    config::database_url_from_env,
    db_types::{NewPayment, Payment, PaymentId, PaymentStatus, SettlementResult, TxInfo},
    traits::{PaymentStore, PaymentStoreError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

#[async_trait]
impl PaymentStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::insert_payment(payment, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(id, &mut conn).await
    }

    async fn fetch_payment_by_address(&self, address: &str) -> Result<Option<Payment>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_by_address(address, &mut conn).await
    }

    async fn fetch_payments(&self) -> Result<Vec<Payment>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payments(&mut conn).await
    }

    async fn fetch_open_payments(&self) -> Result<Vec<Payment>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payments_with_status(PaymentStatus::Open, &mut conn).await
    }

    async fn mark_payment_paid(
        &self,
        id: &PaymentId,
        early_accepted: bool,
    ) -> Result<SettlementResult, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let result = payments::mark_payment_paid(id, early_accepted, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn mark_payment_timed_out(&self, id: &PaymentId) -> Result<Option<Payment>, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let result = payments::mark_payment_timed_out(id, &mut tx).await?;
        tx.commit().await?;
        if result.is_some() {
            debug!("🗃️ Payment {id} has timed out");
        }
        Ok(result)
    }

    async fn record_tx_info(&self, id: &PaymentId, tx_info: &TxInfo) -> Result<Option<Payment>, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let result = payments::record_tx_info(id, tx_info, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn touch_last_checked(&self, ids: &[PaymentId], at: DateTime<Utc>) -> Result<u64, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let count = payments::touch_last_checked(ids, at, &mut tx).await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn add_recycled_index(&self, index: u64) -> Result<bool, PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let added = recycled_indices::add_index(index, &mut tx).await?;
        tx.commit().await?;
        Ok(added)
    }

    async fn fetch_recycled_indices(&self) -> Result<Vec<u64>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        recycled_indices::fetch_indices(&mut conn).await
    }

    async fn close(&mut self) -> Result<(), PaymentStoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database connection pool using the URL in `LPG_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = database_url_from_env();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Applies any outstanding schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Payment store migrations are up to date");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
