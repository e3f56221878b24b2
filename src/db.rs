use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{RepairOrder, Shop, StatusHistoryEntry};
use crate::status::Status;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let shops = vec![
        (
            Uuid::parse_str("7c1a3a80-4a7d-4f2e-9ab1-02f3a5a1b9d4")?,
            "Aerotech Accessories",
            Some("NET 30"),
        ),
        (
            Uuid::parse_str("f0b2c6de-11f2-4f4e-9c0f-5cf3f8e6a2b1")?,
            "Turbine Works",
            Some("NET 45"),
        ),
        (
            Uuid::parse_str("9e5d2b44-6c83-4c29-8d11-74b0c92f6a37")?,
            "Pacific Avionics",
            Some("COD"),
        ),
    ];

    for (id, name, payment_terms) in shops {
        sqlx::query(
            r#"
            INSERT INTO repair_tracking.shops (id, name, payment_terms)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET payment_terms = EXCLUDED.payment_terms
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(payment_terms)
        .execute(pool)
        .await?;
    }

    let events: Vec<(&str, &str, &str, &str, NaiveDate)> = vec![
        (
            "seed-001",
            "RO-2026-001",
            "Aerotech Accessories",
            "TO SEND",
            NaiveDate::from_ymd_opt(2026, 6, 1).context("invalid date")?,
        ),
        (
            "seed-002",
            "RO-2026-001",
            "Aerotech Accessories",
            "WAITING QUOTE",
            NaiveDate::from_ymd_opt(2026, 6, 4).context("invalid date")?,
        ),
        (
            "seed-003",
            "RO-2026-001",
            "Aerotech Accessories",
            "BEING REPAIRED",
            NaiveDate::from_ymd_opt(2026, 6, 12).context("invalid date")?,
        ),
        (
            "seed-004",
            "RO-2026-001",
            "Aerotech Accessories",
            "SHIPPING",
            NaiveDate::from_ymd_opt(2026, 6, 24).context("invalid date")?,
        ),
        (
            "seed-005",
            "RO-2026-001",
            "Aerotech Accessories",
            "PAYMENT SENT",
            NaiveDate::from_ymd_opt(2026, 6, 27).context("invalid date")?,
        ),
        (
            "seed-006",
            "RO-2026-002",
            "Aerotech Accessories",
            "TO SEND",
            NaiveDate::from_ymd_opt(2026, 7, 10).context("invalid date")?,
        ),
        (
            "seed-007",
            "RO-2026-002",
            "Aerotech Accessories",
            "BEING REPAIRED",
            NaiveDate::from_ymd_opt(2026, 7, 18).context("invalid date")?,
        ),
        (
            "seed-008",
            "RO-2026-003",
            "Turbine Works",
            "TO SEND",
            NaiveDate::from_ymd_opt(2026, 7, 1).context("invalid date")?,
        ),
        (
            "seed-009",
            "RO-2026-003",
            "Turbine Works",
            "WAITING QUOTE",
            NaiveDate::from_ymd_opt(2026, 7, 6).context("invalid date")?,
        ),
        (
            "seed-010",
            "RO-2026-004",
            "Pacific Avionics",
            "BER",
            NaiveDate::from_ymd_opt(2026, 7, 20).context("invalid date")?,
        ),
    ];

    for (source_key, ro_number, shop, status, occurred) in events {
        append_event(
            pool,
            &EventRow {
                ro_number: ro_number.to_string(),
                shop: shop.to_string(),
                status: status.to_string(),
                occurred_at: occurred,
                entered_by: "seed".to_string(),
                cost: None,
                delivery_date: None,
                note: None,
                payment_terms: None,
                source_key: Some(source_key.to_string()),
            },
        )
        .await?;
    }

    Ok(())
}

pub async fn fetch_shops(pool: &PgPool) -> anyhow::Result<Vec<Shop>> {
    let rows = sqlx::query("SELECT name, payment_terms FROM repair_tracking.shops ORDER BY name")
        .fetch_all(pool)
        .await?;

    let mut shops = Vec::new();
    for row in rows {
        shops.push(Shop {
            name: row.get("name"),
            payment_terms: row.get("payment_terms"),
        });
    }
    Ok(shops)
}

/// Loads the full RO snapshot, each order carrying its chronologically
/// ordered history, optionally scoped to one shop. Orders without payment
/// terms of their own inherit the shop's.
pub async fn fetch_repair_orders(
    pool: &PgPool,
    shop: Option<&str>,
) -> anyhow::Result<Vec<RepairOrder>> {
    let mut query = String::from(
        "SELECT ro.id, ro.ro_number, s.name AS shop_name, ro.current_status, \
         ro.current_status_date, \
         COALESCE(ro.payment_terms, s.payment_terms) AS payment_terms, \
         ro.estimated_cost, ro.actual_cost \
         FROM repair_tracking.repair_orders ro \
         JOIN repair_tracking.shops s ON s.id = ro.shop_id",
    );
    if shop.is_some() {
        query.push_str(" WHERE s.name = $1");
    }
    query.push_str(" ORDER BY ro.ro_number");

    let mut rows = sqlx::query(&query);
    if let Some(value) = shop {
        rows = rows.bind(value);
    }
    let records = rows.fetch_all(pool).await?;

    let mut orders = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    for row in records {
        let id: Uuid = row.get("id");
        index.insert(id, orders.len());
        orders.push(RepairOrder {
            ro_number: row.get("ro_number"),
            shop_name: row.get("shop_name"),
            current_status: Status::parse(row.get::<String, _>("current_status").as_str()),
            current_status_date: row.get("current_status_date"),
            payment_terms: row.get("payment_terms"),
            estimated_cost: row.get("estimated_cost"),
            actual_cost: row.get("actual_cost"),
            status_history: Vec::new(),
        });
    }

    let mut history_query = String::from(
        "SELECT h.ro_id, h.status, h.occurred_at, h.entered_by, h.cost, \
         h.delivery_date, h.note \
         FROM repair_tracking.status_history h",
    );
    if shop.is_some() {
        history_query.push_str(
            " JOIN repair_tracking.repair_orders ro ON ro.id = h.ro_id \
             JOIN repair_tracking.shops s ON s.id = ro.shop_id \
             WHERE s.name = $1",
        );
    }
    history_query.push_str(" ORDER BY h.occurred_at, h.id");

    let mut history_rows = sqlx::query(&history_query);
    if let Some(value) = shop {
        history_rows = history_rows.bind(value);
    }

    for row in history_rows.fetch_all(pool).await? {
        let ro_id: Uuid = row.get("ro_id");
        if let Some(&position) = index.get(&ro_id) {
            orders[position].status_history.push(StatusHistoryEntry {
                status: Status::parse(row.get::<String, _>("status").as_str()),
                occurred_at: row.get("occurred_at"),
                entered_by: row.get("entered_by"),
                cost: row.get("cost"),
                delivery_date: row.get("delivery_date"),
                note: row.get("note"),
            });
        }
    }

    Ok(orders)
}

struct EventRow {
    ro_number: String,
    shop: String,
    status: String,
    occurred_at: NaiveDate,
    entered_by: String,
    cost: Option<f64>,
    delivery_date: Option<NaiveDate>,
    note: Option<String>,
    payment_terms: Option<String>,
    source_key: Option<String>,
}

/// Upserts the shop and RO for one status event and appends it to the
/// history. Returns true when the event was new to this database.
async fn append_event(pool: &PgPool, event: &EventRow) -> anyhow::Result<bool> {
    let occurred_at: DateTime<Utc> = Utc.from_utc_datetime(
        &event
            .occurred_at
            .and_hms_opt(0, 0, 0)
            .context("invalid time")?,
    );
    let status_label = Status::parse(&event.status).label().to_string();

    let shop_id: Uuid = sqlx::query(
        r#"
        INSERT INTO repair_tracking.shops (id, name, payment_terms)
        VALUES ($1, $2, $3)
        ON CONFLICT (name) DO UPDATE
        SET payment_terms = COALESCE(EXCLUDED.payment_terms, repair_tracking.shops.payment_terms)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&event.shop)
    .bind(&event.payment_terms)
    .fetch_one(pool)
    .await?
    .get("id");

    // The RO's mutable head only moves forward in time; replayed or stale
    // events never rewind it.
    let ro_id: Uuid = sqlx::query(
        r#"
        INSERT INTO repair_tracking.repair_orders
        (id, ro_number, shop_id, current_status, current_status_date, payment_terms)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (ro_number) DO UPDATE
        SET current_status = CASE
                WHEN EXCLUDED.current_status_date >= repair_tracking.repair_orders.current_status_date
                THEN EXCLUDED.current_status
                ELSE repair_tracking.repair_orders.current_status
            END,
            current_status_date = GREATEST(
                EXCLUDED.current_status_date,
                repair_tracking.repair_orders.current_status_date
            ),
            payment_terms = COALESCE(EXCLUDED.payment_terms, repair_tracking.repair_orders.payment_terms)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&event.ro_number)
    .bind(shop_id)
    .bind(&status_label)
    .bind(occurred_at)
    .bind(&event.payment_terms)
    .fetch_one(pool)
    .await?
    .get("id");

    let source_key = event
        .source_key
        .clone()
        .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

    let result = sqlx::query(
        r#"
        INSERT INTO repair_tracking.status_history
        (id, ro_id, status, occurred_at, entered_by, cost, delivery_date, note, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(ro_id)
    .bind(&status_label)
    .bind(occurred_at)
    .bind(&event.entered_by)
    .bind(event.cost)
    .bind(event.delivery_date)
    .bind(&event.note)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        ro_number: String,
        shop: String,
        status: String,
        occurred_at: NaiveDate,
        entered_by: String,
        cost: Option<f64>,
        delivery_date: Option<NaiveDate>,
        note: Option<String>,
        payment_terms: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let appended = append_event(
            pool,
            &EventRow {
                ro_number: row.ro_number,
                shop: row.shop,
                status: row.status,
                occurred_at: row.occurred_at,
                entered_by: row.entered_by,
                cost: row.cost,
                delivery_date: row.delivery_date,
                note: row.note,
                payment_terms: row.payment_terms,
                source_key: row.source_key,
            },
        )
        .await?;

        if appended {
            inserted += 1;
        }
    }

    Ok(inserted)
}
