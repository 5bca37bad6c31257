use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{Event, NewOrder, NewSocial, NewTicket, NewUser, Order, Social, Ticket, User};
use crate::store::Store;

// Postgres caps a statement at 65535 bind parameters; orders bind 12 per row.
const BULK_CHUNK: usize = 1000;

const USER_COLUMNS: &str = "id, name, phone, email, country_id, created_at";
const ORDER_COLUMNS: &str = "id, user_id, ticket_id, quantity, price, currency, payment_status, \
                             reference, qr_code, ticket_type, assigned_table, created_at";

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("connect to database")
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_user(&self, user: &NewUser) -> anyhow::Result<User> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users ({USER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (phone) DO UPDATE
               SET email = COALESCE(users.email, EXCLUDED.email)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.email)
        .bind(user.country_id)
        .bind(user.created_at)
        .fetch_one(&self.db)
        .await
        .context("upsert user")?;
        Ok(row)
    }

    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user")?;
        Ok(row)
    }

    async fn find_user_by_phone(&self, phone: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone = $1"
        ))
        .bind(phone)
        .fetch_optional(&self.db)
        .await
        .context("find user by phone")?;
        Ok(row)
    }

    async fn find_event(&self, id: Uuid) -> anyhow::Result<Option<Event>> {
        let row = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, name, coordinates, starts_at, ends_at, description, default_ticket_quantity
              FROM events
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find event")?;
        Ok(row)
    }

    async fn find_event_by_name(&self, name: &str) -> anyhow::Result<Option<Event>> {
        let row = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, name, coordinates, starts_at, ends_at, description, default_ticket_quantity
              FROM events
             WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await
        .context("find event by name")?;
        Ok(row)
    }

    async fn upsert_ticket(&self, ticket: &NewTicket) -> anyhow::Result<Ticket> {
        let row = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets (id, title, event_id, price, quantity, entries_allowed_per_ticket)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT tickets_natural_key DO UPDATE
               SET title = EXCLUDED.title
            RETURNING id, title, event_id, price, quantity, entries_allowed_per_ticket
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.title)
        .bind(ticket.event_id)
        .bind(ticket.price)
        .bind(ticket.quantity)
        .bind(ticket.entries_allowed_per_ticket)
        .fetch_one(&self.db)
        .await
        .context("upsert ticket")?;
        Ok(row)
    }

    async fn upsert_social(&self, social: &NewSocial) -> anyhow::Result<Social> {
        let row = sqlx::query_as::<_, Social>(
            r#"
            INSERT INTO socials (id, platform, user_id, handle)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (platform, user_id) DO UPDATE
               SET handle = EXCLUDED.handle
            RETURNING id, platform, user_id, handle
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&social.platform)
        .bind(social.user_id)
        .bind(&social.handle)
        .fetch_one(&self.db)
        .await
        .context("upsert social")?;
        Ok(row)
    }

    async fn insert_order(&self, order: &NewOrder) -> anyhow::Result<Order> {
        let row = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders ({ORDER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.ticket_id)
        .bind(order.quantity)
        .bind(order.price)
        .bind(&order.currency)
        .bind(&order.payment_status)
        .bind(&order.reference)
        .bind(&order.qr_code)
        .bind(&order.ticket_type)
        .bind(&order.assigned_table)
        .bind(order.created_at)
        .fetch_one(&self.db)
        .await
        .context("insert order")?;
        Ok(row)
    }

    async fn bulk_insert(&self, users: &[NewUser], orders: &[NewOrder]) -> anyhow::Result<()> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        for chunk in users.chunks(BULK_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO users ({USER_COLUMNS}) "));
            qb.push_values(chunk, |mut b, u| {
                b.push_bind(u.id)
                    .push_bind(u.name.clone())
                    .push_bind(u.phone.clone())
                    .push_bind(u.email.clone())
                    .push_bind(u.country_id)
                    .push_bind(u.created_at);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .context("bulk insert users")?;
        }

        for chunk in orders.chunks(BULK_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO orders ({ORDER_COLUMNS}) "));
            qb.push_values(chunk, |mut b, o| {
                b.push_bind(o.id)
                    .push_bind(o.user_id)
                    .push_bind(o.ticket_id)
                    .push_bind(o.quantity)
                    .push_bind(o.price)
                    .push_bind(o.currency.clone())
                    .push_bind(o.payment_status.clone())
                    .push_bind(o.reference.clone())
                    .push_bind(o.qr_code.clone())
                    .push_bind(o.ticket_type.clone())
                    .push_bind(o.assigned_table.clone())
                    .push_bind(o.created_at);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .context("bulk insert orders")?;
        }

        tx.commit().await.context("commit tx")?;
        Ok(())
    }

    async fn list_orders(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
              FROM orders
             ORDER BY created_at DESC, id
             LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list orders")?;
        Ok(rows)
    }

    async fn count_orders(&self) -> anyhow::Result<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.db)
            .await
            .context("count orders")?;
        Ok(n)
    }

    async fn orders_for_event(&self, event_id: Uuid) -> anyhow::Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, Order>(
            r#"
            SELECT o.id, o.user_id, o.ticket_id, o.quantity, o.price, o.currency,
                   o.payment_status, o.reference, o.qr_code, o.ticket_type,
                   o.assigned_table, o.created_at
              FROM orders o
              JOIN tickets t ON t.id = o.ticket_id
             WHERE t.event_id = $1
             ORDER BY o.created_at ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.db)
        .await
        .context("list orders for event")?;
        Ok(rows)
    }
}
