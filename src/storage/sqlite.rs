//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    Availability, IdentifierRecord, NewOffer, NewProduct, OfferRecord, ProductRecord,
    ReplaceSummary, RunCounters, RunRecord, RunStatus,
};
use crate::TideError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

const PRODUCT_COLUMNS: &str = "id, title, brand, model, image_url, created_at, updated_at";

const OFFER_COLUMNS: &str = "id, product_id, source, seller, price_cents, currency, \
     shipping_cents, fee_cents, tax_cents, total_cents, availability, url, \
     est_delivery_days_min, est_delivery_days_max, fetched_at, price_updated_at, \
     created_at, updated_at";

const RUN_COLUMNS: &str = "id, selector, config_hash, started_at, finished_at, status, \
     providers, candidates, products_created, products_matched, offers_written, errors";

const UPSERT_OFFER_SQL: &str = "
    INSERT INTO offers (
        product_id, source, seller, price_cents, currency, shipping_cents, fee_cents,
        tax_cents, total_cents, availability, url, url_key, est_delivery_days_min,
        est_delivery_days_max, fetched_at, price_updated_at, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?15, ?15)
    ON CONFLICT(product_id, source, seller, url_key) DO UPDATE SET
        price_cents = excluded.price_cents,
        currency = excluded.currency,
        shipping_cents = excluded.shipping_cents,
        fee_cents = excluded.fee_cents,
        tax_cents = excluded.tax_cents,
        total_cents = excluded.total_cents,
        availability = excluded.availability,
        url = excluded.url,
        est_delivery_days_min = excluded.est_delivery_days_min,
        est_delivery_days_max = excluded.est_delivery_days_max,
        fetched_at = excluded.fetched_at,
        price_updated_at = excluded.price_updated_at,
        updated_at = excluded.updated_at
";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(TideError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, TideError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, TideError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<ProductRecord> {
    Ok(ProductRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        brand: row.get(2)?,
        model: row.get(3)?,
        image_url: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn offer_from_row(row: &Row<'_>) -> rusqlite::Result<OfferRecord> {
    Ok(OfferRecord {
        id: row.get(0)?,
        product_id: row.get(1)?,
        source: row.get(2)?,
        seller: row.get(3)?,
        price_cents: row.get(4)?,
        currency: row.get(5)?,
        shipping_cents: row.get(6)?,
        fee_cents: row.get(7)?,
        tax_cents: row.get(8)?,
        total_cents: row.get(9)?,
        availability: Availability::from_db_string(&row.get::<_, String>(10)?)
            .unwrap_or(Availability::Unknown),
        url: row.get(11)?,
        est_delivery_days_min: row.get(12)?,
        est_delivery_days_max: row.get(13)?,
        fetched_at: row.get(14)?,
        price_updated_at: row.get(15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        selector: row.get(1)?,
        config_hash: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Failed),
        counters: RunCounters {
            providers: row.get(6)?,
            candidates: row.get(7)?,
            products_created: row.get(8)?,
            products_matched: row.get(9)?,
            offers_written: row.get(10)?,
            errors: row.get(11)?,
        },
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, selector: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (selector, config_hash, started_at, status) VALUES (?1, ?2, ?3, ?4)",
            params![selector, config_hash, now, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn complete_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, providers = ?3, candidates = ?4,
             products_created = ?5, products_matched = ?6, offers_written = ?7, errors = ?8
             WHERE id = ?9",
            params![
                status.to_db_string(),
                now,
                counters.providers,
                counters.candidates,
                counters.products_created,
                counters.products_matched,
                counters.offers_written,
                counters.errors,
                run_id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Products =====

    fn insert_product(&mut self, product: &NewProduct) -> StorageResult<ProductRecord> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO products (title, brand, model, image_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                product.title,
                product.brand,
                product.model,
                product.image_url,
                now
            ],
        )?;

        Ok(ProductRecord {
            id: self.conn.last_insert_rowid(),
            title: product.title.clone(),
            brand: product.brand.clone(),
            model: product.model.clone(),
            image_url: product.image_url.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    fn get_product(&self, product_id: i64) -> StorageResult<Option<ProductRecord>> {
        let product = self
            .conn
            .query_row(
                &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS),
                params![product_id],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    fn update_product(&mut self, product: &ProductRecord) -> StorageResult<ProductRecord> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE products SET title = ?1, brand = ?2, model = ?3, image_url = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                product.title,
                product.brand,
                product.model,
                product.image_url,
                now,
                product.id
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::ProductNotFound(product.id));
        }

        Ok(ProductRecord {
            updated_at: now,
            ..product.clone()
        })
    }

    fn find_product_by_title(&self, title: &str) -> StorageResult<Option<ProductRecord>> {
        let product = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM products WHERE title = ?1 ORDER BY id LIMIT 1",
                    PRODUCT_COLUMNS
                ),
                params![title],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    fn find_product_by_identifier(
        &self,
        kind: &str,
        value: &str,
    ) -> StorageResult<Option<ProductRecord>> {
        let product = self
            .conn
            .query_row(
                "SELECT p.id, p.title, p.brand, p.model, p.image_url, p.created_at, p.updated_at
                 FROM products p
                 JOIN product_identifiers i ON i.product_id = p.id
                 WHERE i.kind = ?1 AND i.value = ?2",
                params![kind, value],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    // ===== Identifiers =====

    fn insert_identifier(
        &mut self,
        product_id: i64,
        kind: &str,
        value: &str,
    ) -> StorageResult<()> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT product_id FROM product_identifiers WHERE kind = ?1 AND value = ?2",
                params![kind, value],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(owner) if owner == product_id => Ok(()),
            Some(owner) => Err(StorageError::IdentifierConflict {
                kind: kind.to_string(),
                value: value.to_string(),
                product_id: owner,
            }),
            None => {
                let now = Utc::now().to_rfc3339();
                self.conn.execute(
                    "INSERT INTO product_identifiers (product_id, kind, value, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![product_id, kind, value, now],
                )?;
                Ok(())
            }
        }
    }

    fn identifiers_for_product(&self, product_id: i64) -> StorageResult<Vec<IdentifierRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, product_id, kind, value, created_at FROM product_identifiers
             WHERE product_id = ?1 ORDER BY id",
        )?;

        let records = stmt
            .query_map(params![product_id], |row| {
                Ok(IdentifierRecord {
                    id: row.get(0)?,
                    product_id: row.get(1)?,
                    kind: row.get(2)?,
                    value: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ===== Offers =====

    fn replace_offers(
        &mut self,
        product_id: i64,
        source: &str,
        offers: &[NewOffer],
    ) -> StorageResult<ReplaceSummary> {
        let now = Utc::now().to_rfc3339();
        let keep: HashSet<(String, String)> = offers.iter().map(NewOffer::key).collect();

        let tx = self.conn.transaction()?;

        let existing: Vec<(i64, String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT id, seller, url_key FROM offers WHERE product_id = ?1 AND source = ?2",
            )?;
            let rows = stmt
                .query_map(params![product_id, source], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut summary = ReplaceSummary::default();

        for (id, seller, url_key) in existing {
            if !keep.contains(&(seller, url_key)) {
                summary.deleted += tx.execute("DELETE FROM offers WHERE id = ?1", params![id])?;
            }
        }

        for offer in offers {
            let (seller, url_key) = offer.key();
            tx.execute(
                UPSERT_OFFER_SQL,
                params![
                    product_id,
                    source,
                    seller,
                    offer.price_cents,
                    offer.currency,
                    offer.shipping_cents,
                    offer.fee_cents,
                    offer.tax_cents,
                    offer.total_cents,
                    offer.availability.to_db_string(),
                    offer.url,
                    url_key,
                    offer.est_delivery_days_min,
                    offer.est_delivery_days_max,
                    now,
                    offer.price_updated_at,
                ],
            )?;
            summary.upserted += 1;
        }

        tx.commit()?;
        Ok(summary)
    }

    fn offers_for_product(&self, product_id: i64) -> StorageResult<Vec<OfferRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM offers WHERE product_id = ?1 ORDER BY total_cents, id",
            OFFER_COLUMNS
        ))?;

        let offers = stmt
            .query_map(params![product_id], offer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(offers)
    }

    // ===== Statistics =====

    fn count_products(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_identifiers(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM product_identifiers", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    fn count_offers(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM offers", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_offers_by_source(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source, COUNT(*) FROM offers GROUP BY source ORDER BY source")?;

        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    // ===== Key-Value Cache =====

    fn cache_get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let now = Utc::now().timestamp_millis();
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_cache WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn cache_set(&mut self, key: &str, value: &[u8], ttl: Duration) -> StorageResult<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        self.conn.execute(
            "INSERT INTO kv_cache (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> SqliteStorage {
        SqliteStorage::new_in_memory().unwrap()
    }

    fn product(storage: &mut SqliteStorage, title: &str) -> ProductRecord {
        storage
            .insert_product(&NewProduct {
                title: title.to_string(),
                ..NewProduct::default()
            })
            .unwrap()
    }

    fn offer(seller: &str, price: i64) -> NewOffer {
        NewOffer::new("demo", seller, price, "USD")
    }

    #[test]
    fn test_create_and_complete_run() {
        let mut storage = storage();
        let run_id = storage.create_run("all", "test_hash").unwrap();
        assert!(run_id > 0);

        let counters = RunCounters {
            providers: 2,
            candidates: 7,
            products_created: 3,
            products_matched: 4,
            offers_written: 9,
            errors: 1,
        };
        storage
            .complete_run(run_id, RunStatus::Completed, &counters)
            .unwrap();

        let run = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.selector, "all");
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
        assert_eq!(run.counters, counters);
    }

    #[test]
    fn test_complete_unknown_run() {
        let mut storage = storage();
        let result = storage.complete_run(99, RunStatus::Completed, &RunCounters::default());
        assert!(matches!(result, Err(StorageError::RunNotFound(99))));
    }

    #[test]
    fn test_find_product_by_title_is_exact() {
        let mut storage = storage();
        let created = product(&mut storage, "Wireless Headphones");

        let found = storage
            .find_product_by_title("Wireless Headphones")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
        assert!(storage
            .find_product_by_title("wireless headphones")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_update_product_persists_fields() {
        let mut storage = storage();
        let mut record = product(&mut storage, "Smart Watch");
        record.brand = Some("Acme".to_string());

        storage.update_product(&record).unwrap();

        let stored = storage.get_product(record.id).unwrap().unwrap();
        assert_eq!(stored.brand.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_identifier_maps_to_one_product() {
        let mut storage = storage();
        let a = product(&mut storage, "A");
        let b = product(&mut storage, "B");

        storage.insert_identifier(a.id, "itemId", "123").unwrap();
        storage.insert_identifier(a.id, "itemId", "123").unwrap();

        let conflict = storage.insert_identifier(b.id, "itemId", "123");
        assert!(matches!(
            conflict,
            Err(StorageError::IdentifierConflict { product_id, .. }) if product_id == a.id
        ));

        let found = storage
            .find_product_by_identifier("itemId", "123")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, a.id);
        assert_eq!(storage.identifiers_for_product(a.id).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_offers_removes_missing_sellers() {
        let mut storage = storage();
        let p = product(&mut storage, "Cable");

        let first = storage
            .replace_offers(p.id, "demo", &[offer("Store A", 4999), offer("Store B", 5499)])
            .unwrap();
        assert_eq!(first, ReplaceSummary { upserted: 2, deleted: 0 });

        let second = storage
            .replace_offers(p.id, "demo", &[offer("Store A", 4899)])
            .unwrap();
        assert_eq!(second, ReplaceSummary { upserted: 1, deleted: 1 });

        let offers = storage.offers_for_product(p.id).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].seller, "Store A");
        assert_eq!(offers[0].price_cents, 4899);
    }

    #[test]
    fn test_replace_offers_is_source_scoped() {
        let mut storage = storage();
        let p = product(&mut storage, "Laptop");

        storage
            .replace_offers(p.id, "demo", &[offer("Store A", 100000)])
            .unwrap();
        let mut other = offer("Store Z", 99000);
        other.source = "live".to_string();
        storage.replace_offers(p.id, "live", &[other]).unwrap();

        storage.replace_offers(p.id, "demo", &[]).unwrap();

        let offers = storage.offers_for_product(p.id).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].source, "live");
    }

    #[test]
    fn test_same_seller_different_urls_are_distinct() {
        let mut storage = storage();
        let p = product(&mut storage, "Tablet");

        let mut a = offer("Store A", 100);
        a.url = Some("https://a.example.com/1".to_string());
        let mut b = offer("Store A", 200);
        b.url = Some("https://a.example.com/2".to_string());

        storage.replace_offers(p.id, "demo", &[a, b]).unwrap();
        let offers = storage.offers_for_product(p.id).unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].price_cents, 100);
    }

    #[test]
    fn test_upsert_keeps_created_at() {
        let mut storage = storage();
        let p = product(&mut storage, "Book");

        storage.replace_offers(p.id, "demo", &[offer("Store A", 1000)]).unwrap();
        let before = storage.offers_for_product(p.id).unwrap().remove(0);

        storage.replace_offers(p.id, "demo", &[offer("Store A", 900)]).unwrap();
        let after = storage.offers_for_product(p.id).unwrap().remove(0);

        assert_eq!(before.id, after.id);
        assert_eq!(before.created_at, after.created_at);
        assert_eq!(after.price_cents, 900);
    }

    #[test]
    fn test_statistics_counts() {
        let mut storage = storage();
        let p = product(&mut storage, "Toy");
        storage.insert_identifier(p.id, "ASIN", "B000").unwrap();
        storage
            .replace_offers(p.id, "demo", &[offer("A", 1), offer("B", 2)])
            .unwrap();

        assert_eq!(storage.count_products().unwrap(), 1);
        assert_eq!(storage.count_identifiers().unwrap(), 1);
        assert_eq!(storage.count_offers().unwrap(), 2);
        assert_eq!(
            storage.count_offers_by_source().unwrap(),
            vec![("demo".to_string(), 2)]
        );
    }

    #[test]
    fn test_cache_roundtrip_and_expiry() {
        let mut storage = storage();

        storage
            .cache_set("robots:https://a.example.com", b"User-agent: *", Duration::from_secs(60))
            .unwrap();
        assert_eq!(
            storage.cache_get("robots:https://a.example.com").unwrap(),
            Some(b"User-agent: *".to_vec())
        );

        storage
            .cache_set("expired", b"x", Duration::ZERO)
            .unwrap();
        assert_eq!(storage.cache_get("expired").unwrap(), None);
        assert_eq!(storage.cache_get("missing").unwrap(), None);
    }
}
