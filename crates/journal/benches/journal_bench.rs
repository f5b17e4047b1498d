use common::AggregateId;
use criterion::{Criterion, criterion_group, criterion_main};
use journal::{AppendOptions, InMemoryJournal, Journal, JournalQuery, JournalRecord};

fn make_record(aggregate_id: AggregateId) -> JournalRecord {
    JournalRecord::builder()
        .table("stock_transaction_history")
        .aggregate_type("Sellable")
        .aggregate_id(aggregate_id)
        .payload_raw(serde_json::json!({
            "quantity": "-1",
            "reason": "SALE"
        }))
        .build()
        .unwrap()
}

fn bench_append_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("journal/append_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let journal = InMemoryJournal::new();
                let id = AggregateId::new();
                let records = (0..10).map(|_| make_record(id)).collect();
                journal.append(records, AppendOptions::new()).await.unwrap();
            });
        });
    });
}

fn bench_query_table(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let journal = InMemoryJournal::new();

    rt.block_on(async {
        for _ in 0..100 {
            let records = (0..10).map(|_| make_record(AggregateId::new())).collect();
            journal.append(records, AppendOptions::new()).await.unwrap();
        }
    });

    c.bench_function("journal/query_table_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                journal
                    .query(JournalQuery::for_table("stock_transaction_history").limit(50))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_append_batch_10, bench_query_table);
criterion_main!(benches);
