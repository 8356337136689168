//! Storage access for the inventory collection.

use std::sync::Mutex;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use prometheus::Histogram;
use sqlx::PgPool;
use tracing::info;

use crate::models::{Item, ItemDraft};
use crate::query::{ListQuery, PagedResult};

/// Capability interface for inventory storage.
///
/// Handlers depend on this trait, never on a concrete backend. Updates
/// replace every client-supplied field wholesale; update and delete report
/// a missing id as `None` without touching storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    async fn create(&self, draft: ItemDraft) -> Result<Item>;
    async fn get_by_id(&self, id: i32) -> Result<Option<Item>>;
    async fn list(&self, query: ListQuery) -> Result<PagedResult<Item>>;
    async fn update(&self, id: i32, draft: ItemDraft) -> Result<Option<Item>>;
    async fn delete(&self, id: i32) -> Result<Option<Item>>;
    async fn exists(&self, id: i32) -> Result<bool>;
}

/// Creates the inventory table when it does not exist yet.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inventory_items (
            id SERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            price NUMERIC(10, 2) NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Postgres-backed repository.
///
/// List queries materialize the full item set in id order and run the
/// filter/sort/paginate pipeline in memory, so both backends share one
/// code path for the query semantics.
pub struct PgInventoryRepository {
    pool: PgPool,
    db_duration_histogram: Histogram,
}

impl PgInventoryRepository {
    pub fn new(pool: PgPool, db_duration_histogram: Histogram) -> Self {
        PgInventoryRepository {
            pool,
            db_duration_histogram,
        }
    }
}

#[async_trait]
impl InventoryRepository for PgInventoryRepository {
    async fn create(&self, draft: ItemDraft) -> Result<Item> {
        let start = Instant::now();
        let item = sqlx::query_as::<_, Item>(
            r#"
            INSERT INTO inventory_items (name, quantity, price)
            VALUES ($1, $2, $3)
            RETURNING id, name, quantity, price
            "#,
        )
        .bind(&draft.name)
        .bind(draft.quantity)
        .bind(draft.price.round_dp(2))
        .fetch_one(&self.pool)
        .await?;
        self.db_duration_histogram
            .observe(start.elapsed().as_secs_f64());

        info!(item_id = item.id, item_name = %item.name, "Created inventory item");
        Ok(item)
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<Item>> {
        let start = Instant::now();
        let item = sqlx::query_as::<_, Item>(
            "SELECT id, name, quantity, price FROM inventory_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.db_duration_histogram
            .observe(start.elapsed().as_secs_f64());
        Ok(item)
    }

    async fn list(&self, query: ListQuery) -> Result<PagedResult<Item>> {
        let start = Instant::now();
        let items = sqlx::query_as::<_, Item>(
            "SELECT id, name, quantity, price FROM inventory_items ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        self.db_duration_histogram
            .observe(start.elapsed().as_secs_f64());
        Ok(query.execute(items))
    }

    async fn update(&self, id: i32, draft: ItemDraft) -> Result<Option<Item>> {
        let start = Instant::now();
        let item = sqlx::query_as::<_, Item>(
            r#"
            UPDATE inventory_items
            SET name = $2, quantity = $3, price = $4
            WHERE id = $1
            RETURNING id, name, quantity, price
            "#,
        )
        .bind(id)
        .bind(&draft.name)
        .bind(draft.quantity)
        .bind(draft.price.round_dp(2))
        .fetch_optional(&self.pool)
        .await?;
        self.db_duration_histogram
            .observe(start.elapsed().as_secs_f64());

        if let Some(item) = &item {
            info!(item_id = item.id, "Updated inventory item");
        }
        Ok(item)
    }

    async fn delete(&self, id: i32) -> Result<Option<Item>> {
        let start = Instant::now();
        let item = sqlx::query_as::<_, Item>(
            r#"
            DELETE FROM inventory_items
            WHERE id = $1
            RETURNING id, name, quantity, price
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.db_duration_histogram
            .observe(start.elapsed().as_secs_f64());

        if let Some(item) = &item {
            info!(item_id = item.id, "Deleted inventory item");
        }
        Ok(item)
    }

    async fn exists(&self, id: i32) -> Result<bool> {
        let start = Instant::now();
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM inventory_items WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        self.db_duration_histogram
            .observe(start.elapsed().as_secs_f64());
        Ok(found)
    }
}

/// In-memory repository with the same observable semantics as Postgres.
/// Backs the hermetic API tests; items live in insertion (id) order.
#[derive(Default)]
pub struct InMemoryInventoryRepository {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    items: Vec<Item>,
    next_id: i32,
}

impl InMemoryInventoryRepository {
    fn with_state<T>(&self, f: impl FnOnce(&mut InMemoryState) -> T) -> Result<T> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("inventory state poisoned"))?;
        Ok(f(&mut state))
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventoryRepository {
    async fn create(&self, draft: ItemDraft) -> Result<Item> {
        self.with_state(|state| {
            state.next_id += 1;
            let item = Item {
                id: state.next_id,
                name: draft.name,
                quantity: draft.quantity,
                price: draft.price.round_dp(2),
            };
            state.items.push(item.clone());
            item
        })
    }

    async fn get_by_id(&self, id: i32) -> Result<Option<Item>> {
        self.with_state(|state| state.items.iter().find(|item| item.id == id).cloned())
    }

    async fn list(&self, query: ListQuery) -> Result<PagedResult<Item>> {
        self.with_state(|state| query.execute(state.items.clone()))
    }

    async fn update(&self, id: i32, draft: ItemDraft) -> Result<Option<Item>> {
        self.with_state(|state| {
            let item = state.items.iter_mut().find(|item| item.id == id)?;
            item.name = draft.name;
            item.quantity = draft.quantity;
            item.price = draft.price.round_dp(2);
            Some(item.clone())
        })
    }

    async fn delete(&self, id: i32) -> Result<Option<Item>> {
        self.with_state(|state| {
            let position = state.items.iter().position(|item| item.id == id)?;
            Some(state.items.remove(position))
        })
    }

    async fn exists(&self, id: i32) -> Result<bool> {
        self.with_state(|state| state.items.iter().any(|item| item.id == id))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn draft(name: &str, quantity: i32, price_cents: i64) -> ItemDraft {
        ItemDraft {
            name: name.to_string(),
            quantity,
            price: Decimal::new(price_cents, 2),
        }
    }

    #[tokio::test]
    async fn test_ids_are_assigned_sequentially() {
        let repo = InMemoryInventoryRepository::default();
        let first = repo.create(draft("Bolt", 5, 100)).await.unwrap();
        let second = repo.create(draft("Nut", 2, 50)).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn test_deleted_ids_are_not_reused() {
        let repo = InMemoryInventoryRepository::default();
        let first = repo.create(draft("Bolt", 5, 100)).await.unwrap();
        repo.delete(first.id).await.unwrap();
        let second = repo.create(draft("Nut", 2, 50)).await.unwrap();
        assert_eq!(second.id, 2);
    }

    #[tokio::test]
    async fn test_update_replaces_fields_wholesale() {
        let repo = InMemoryInventoryRepository::default();
        let item = repo.create(draft("Bolt", 5, 100)).await.unwrap();
        let updated = repo
            .update(item.id, draft("Bolt M8", 7, 150))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, item.id);
        assert_eq!(updated.name, "Bolt M8");
        assert_eq!(updated.quantity, 7);
        assert_eq!(updated.price, Decimal::new(150, 2));
    }

    #[tokio::test]
    async fn test_update_missing_id_leaves_storage_untouched() {
        let repo = InMemoryInventoryRepository::default();
        repo.create(draft("Bolt", 5, 100)).await.unwrap();
        assert!(repo.update(42, draft("Nut", 1, 50)).await.unwrap().is_none());
        let page = repo.list(ListQuery::default()).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].name, "Bolt");
    }

    #[tokio::test]
    async fn test_delete_missing_id_leaves_storage_untouched() {
        let repo = InMemoryInventoryRepository::default();
        repo.create(draft("Bolt", 5, 100)).await.unwrap();
        assert!(repo.delete(42).await.unwrap().is_none());
        assert_eq!(repo.list(ListQuery::default()).await.unwrap().total_count, 1);
    }

    #[tokio::test]
    async fn test_exists() {
        let repo = InMemoryInventoryRepository::default();
        let item = repo.create(draft("Bolt", 5, 100)).await.unwrap();
        assert!(repo.exists(item.id).await.unwrap());
        assert!(!repo.exists(item.id + 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_price_is_rounded_to_two_digits() {
        let repo = InMemoryInventoryRepository::default();
        let item = repo
            .create(ItemDraft {
                name: "Bolt".to_string(),
                quantity: 1,
                price: Decimal::new(12345, 4),
            })
            .await
            .unwrap();
        assert_eq!(item.price, Decimal::new(123, 2));
    }
}
