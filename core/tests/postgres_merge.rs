//! Runs against a real PostgreSQL 17+ server. Every test returns early when
//! `DATABASE_URL` is not set.

use std::error::Error as StdError;

use bulkmerge::{
    connection_string, impl_entity, Assignments, BulkConfig, BulkExecutor, BulkWriter, Filter,
    PostgresClient, Repository, SqlType,
};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Default, PartialEq)]
struct ItOrder {
    id: i64,
    customer: String,
    quantity: i32,
    total: Option<Decimal>,
}

impl_entity!(ItOrder, "public.bulkmerge_it_orders", {
    id: SqlType::BigInt => identity_key,
    customer: SqlType::Text => column,
    quantity: SqlType::Integer => column,
    total: SqlType::Numeric => computed,
});

#[derive(Debug, Clone, Default, PartialEq)]
struct ItMember {
    team_id: i64,
    code: String,
    name: String,
}

impl_entity!(ItMember, "public.bulkmerge_it_members", {
    team_id: SqlType::BigInt => explicit_key,
    code: SqlType::Text => explicit_key,
    name: SqlType::Text => column,
});

#[derive(Debug, Clone, Default, PartialEq)]
struct ItScore {
    player: String,
    points: i32,
}

impl_entity!(ItScore, "public.bulkmerge_it_scores", {
    player: SqlType::Text => explicit_key,
    points: SqlType::Integer => column,
});

#[derive(Debug, Clone, Default, PartialEq)]
struct ItLedger {
    account: String,
    entry: i32,
    note: String,
}

impl_entity!(ItLedger, "public.bulkmerge_it_ledger", {
    account: SqlType::Text => explicit_key,
    entry: SqlType::Integer => explicit_key,
    note: SqlType::Text => column,
});

fn member(team_id: i64, code: &str, name: &str) -> ItMember {
    ItMember { team_id, code: code.to_string(), name: name.to_string() }
}

/// Connects and recreates `table`, or `None` when no database is configured or
/// the server has no MERGE ... RETURNING.
async fn setup(table: &str, columns: &str) -> Option<PostgresClient> {
    if connection_string().is_err() {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    }

    let client = PostgresClient::new().await.expect("failed to connect");
    if !client.capabilities().bulk_merge {
        eprintln!("server does not support MERGE ... RETURNING, skipping");
        return None;
    }

    client
        .batch_execute(&format!("DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({columns});"))
        .await
        .expect("failed to create table");

    Some(client)
}

#[tokio::test]
async fn test_insert_populates_generated_columns() {
    let Some(client) = setup(
        "public.bulkmerge_it_orders",
        "id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY, \
         customer TEXT NOT NULL, \
         quantity INTEGER NOT NULL, \
         total NUMERIC GENERATED ALWAYS AS (quantity * 2.5) STORED",
    )
    .await
    else {
        return;
    };

    let mut orders: Vec<ItOrder> = (1..=5)
        .map(|i| ItOrder { customer: format!("customer-{i}"), quantity: i, ..Default::default() })
        .collect();

    // two records per statement
    let writer = BulkWriter::new(BulkConfig { max_parameters: 4, ..Default::default() });
    let result = writer.insert(&client, &mut orders).await.unwrap();

    assert_eq!(result.inserted, 5);
    assert_eq!(result.batches, 3);
    assert!(orders.iter().all(|order| order.id > 0));
    assert_eq!(orders[1].total, Some(Decimal::new(50, 1)));

    let repository = Repository::<ItOrder>::default();
    let mut stored = repository.find_where(&client, &Filter::match_all()).await.unwrap();
    stored.sort_by_key(|order| order.id);

    assert_eq!(stored.len(), 5);
    for (stored, order) in stored.iter().zip(&orders) {
        assert_eq!(stored.id, order.id);
        assert_eq!(stored.customer, order.customer);
        assert_eq!(stored.total, order.total);
    }
}

#[tokio::test]
async fn test_composite_key_update() {
    let Some(client) = setup(
        "public.bulkmerge_it_members",
        "team_id BIGINT NOT NULL, code TEXT NOT NULL, name TEXT NOT NULL, PRIMARY KEY (team_id, code)",
    )
    .await
    else {
        return;
    };

    let writer = BulkWriter::default();
    let mut members = vec![member(1, "A", "A"), member(2, "B", "B"), member(3, "C", "C")];
    writer.insert(&client, &mut members).await.unwrap();

    let mut renamed = vec![member(1, "A", "A2"), member(2, "B", "B2"), member(3, "C", "C2")];
    let result = writer.update(&client, &mut renamed).await.unwrap();
    assert_eq!(result.affected, 3);

    let mut stored = Repository::<ItMember>::default()
        .find_where(&client, &Filter::match_all())
        .await
        .unwrap();
    stored.sort_by_key(|member| member.team_id);
    assert_eq!(stored, renamed);

    // only key-matched rows that also pass the filter are removed
    let mut targets = vec![member(1, "A", ""), member(2, "B", "")];
    let result = writer
        .delete_matching(&client, &mut targets, &Filter::new().eq("name", "B2"))
        .await
        .unwrap();
    assert_eq!(result.deleted, 1);

    let remaining = Repository::<ItMember>::default()
        .update_where(&client, &Assignments::new().set("name", "kept"), &Filter::match_all())
        .await
        .unwrap();
    assert_eq!(remaining, 2);
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let Some(client) = setup(
        "public.bulkmerge_it_scores",
        "player TEXT PRIMARY KEY, points INTEGER NOT NULL",
    )
    .await
    else {
        return;
    };

    let writer = BulkWriter::default();
    let mut scores: Vec<ItScore> =
        (0..10).map(|i| ItScore { player: format!("p{i}"), points: i }).collect();

    let first = writer.upsert(&client, &mut scores).await.unwrap();
    assert_eq!((first.inserted, first.updated), (10, 0));

    let second = writer.upsert(&client, &mut scores).await.unwrap();
    assert_eq!((second.inserted, second.updated), (0, 10));

    let stored = Repository::<ItScore>::default()
        .find_where(&client, &Filter::match_all())
        .await
        .unwrap();
    assert_eq!(stored.len(), 10);
}

#[tokio::test]
async fn test_failed_batch_rolls_back_with_the_transaction() {
    let Some(client) = setup(
        "public.bulkmerge_it_ledger",
        "account TEXT NOT NULL, entry INTEGER NOT NULL, note TEXT NOT NULL, PRIMARY KEY (account, entry)",
    )
    .await
    else {
        return;
    };

    // one record per statement, the third collides with the first
    let writer = BulkWriter::new(BulkConfig { max_parameters: 3, ..Default::default() });
    let records = vec![
        ItLedger { account: "a".to_string(), entry: 1, note: "first".to_string() },
        ItLedger { account: "a".to_string(), entry: 2, note: "second".to_string() },
        ItLedger { account: "a".to_string(), entry: 1, note: "duplicate".to_string() },
    ];

    let outcome = client
        .with_transaction::<_, _, Box<dyn StdError + Send + Sync>>(move |transaction| {
            Box::pin(async move {
                let mut records = records;
                Ok(writer.insert(transaction, &mut records).await?)
            })
        })
        .await;

    let err = outcome.unwrap_err();
    let err = err.downcast_ref::<bulkmerge::BulkError>().expect("bulk error");
    assert!(matches!(err, bulkmerge::BulkError::Execution { batch: 2, .. }));
    assert!(err.execution_error::<tokio_postgres::Error>().is_some());

    let stored = Repository::<ItLedger>::default()
        .find_where(&client, &Filter::match_all())
        .await
        .unwrap();
    assert!(stored.is_empty());
}
