//! Integration tests for `BatchUpserter` flushing and loss accounting.

mod common;

use erpsync_store::{BatchUpserter, FlushReport};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{sku_rows, store};

#[tokio::test]
async fn flushes_at_threshold_and_remainder_at_finish() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/produtos"))
        .respond_with(ResponseTemplate::new(201))
        .expect(3)
        .mount(&server)
        .await;

    let store = store(&server);
    let mut upserter = BatchUpserter::new(&store, "produtos", "sku", 2);
    for row in sku_rows(5) {
        upserter.push(row).await;
    }
    assert_eq!(upserter.pending(), 1);

    let report = upserter.finish().await;
    assert_eq!(
        report,
        FlushReport {
            batches: 3,
            rows_written: 5,
            rows_lost: 0,
        }
    );
}

#[tokio::test]
async fn rejected_batch_is_lost_and_the_run_continues() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("deadlock detected"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let store = store(&server);
    let mut upserter = BatchUpserter::new(&store, "estoque", "sku,canal", 3);
    upserter.write(&sku_rows(3)).await;
    upserter.write(&sku_rows(2)).await;

    let report = upserter.finish().await;
    assert_eq!(report.batches, 2);
    assert_eq!(report.rows_lost, 3);
    assert_eq!(report.rows_written, 2);
}

#[tokio::test]
async fn dry_run_counts_rows_without_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let store = store(&server);
    let mut upserter = BatchUpserter::new(&store, "produtos", "sku", 50).dry_run(true);
    for row in sku_rows(3) {
        upserter.push(row).await;
    }
    let report = upserter.finish().await;
    assert_eq!(report.rows_written, 3);
    assert_eq!(report.batches, 1);
}
