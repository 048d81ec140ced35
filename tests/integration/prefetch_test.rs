//! Scheduler, HTTP fetcher and rowset parser wired together over loopback.

use crate::common::{ChunkServer, Route, rowset};
use rf_arena::{ArenaConfig, ArenaPools, OverflowPolicy};
use rf_error::{ArenaError, ErrorCategory, ParseError, RfError, TransportError, classify_error};
use rf_fetch_http::{HttpChunkFetcher, HttpFetcherConfig};
use rf_prefetch::{ChunkPipeline, PrefetchConfig, PrefetchScheduler};
use rf_reader_rowset::RowsetParser;
use rf_types::{ChunkDescriptor, ChunkHeaders};
use std::sync::Arc;
use std::time::Duration;

const COLS: usize = 3;

fn chunk_rows(chunk: usize, rows: usize) -> Vec<Vec<Option<String>>> {
    (0..rows)
        .map(|row| {
            (0..COLS)
                .map(|col| {
                    if (row + col) % 4 == 3 {
                        None
                    } else {
                        Some(format!("c{}r{}v{}-\u{e9}\"\\", chunk, row, col))
                    }
                })
                .collect()
        })
        .collect()
}

fn scheduler(
    server: &ChunkServer,
    descriptors: Vec<(usize, usize, String, u64)>,
    config: PrefetchConfig,
    headers: ChunkHeaders,
) -> PrefetchScheduler {
    let descriptors = descriptors
        .into_iter()
        .map(|(index, rows, path, estimate)| {
            ChunkDescriptor::new(index, rows, COLS, server.url(&path), estimate)
        })
        .collect();
    let fetcher = HttpChunkFetcher::new(&HttpFetcherConfig::new()).unwrap();
    let pipeline = ChunkPipeline::new(
        Arc::new(fetcher),
        Arc::new(RowsetParser::new()),
        ArenaPools::shared(&config.arena),
    )
    .with_headers(headers);
    PrefetchScheduler::new(descriptors, &config, pipeline).unwrap()
}

#[tokio::test]
async fn test_chunks_arrive_in_order_over_http() {
    let chunk_count = 6;
    let rows = 5;
    let routes = (0..chunk_count)
        .map(|i| {
            let delay = Duration::from_millis(((chunk_count - i) * 20) as u64);
            let body = rowset(&chunk_rows(i, rows));
            (format!("/chunk/{}", i), Route::ok(body).with_delay(delay).in_pieces(4))
        })
        .collect();
    let server = ChunkServer::start(routes).await;

    let descriptors = (0..chunk_count)
        .map(|i| (i, rows, format!("/chunk/{}?sig=secret", i), 4096))
        .collect();
    let headers =
        ChunkHeaders::new().with_header("x-amz-server-side-encryption-customer-key", "k3y");
    let mut scheduler = scheduler(
        &server,
        descriptors,
        PrefetchConfig::new().with_prefetch_width(3),
        headers,
    );

    let mut delivered = 0;
    while let Some(chunk) = scheduler.next_chunk().await.unwrap() {
        assert_eq!(chunk.chunk_index(), delivered);
        let expected = chunk_rows(delivered, rows);
        for (row, cells) in expected.iter().enumerate() {
            assert_eq!(&chunk.row(row).unwrap(), cells);
        }
        assert!(chunk.release());
        delivered += 1;
    }

    assert_eq!(delivered, chunk_count);
    let stats = scheduler.stats();
    assert!(stats.peak_in_flight <= 3);
    assert_eq!(stats.delivered, chunk_count as u64);

    let requests = server.requests();
    assert_eq!(requests.len(), chunk_count);
    assert!(requests.iter().all(|r| {
        r.headers
            .get("x-amz-server-side-encryption-customer-key")
            .map(String::as_str)
            == Some("k3y")
    }));
}

#[tokio::test]
async fn test_missing_chunk_fails_at_its_position() {
    let server = ChunkServer::start(vec![
        ("/chunk/0".to_string(), Route::ok(rowset(&chunk_rows(0, 2)))),
        ("/chunk/2".to_string(), Route::ok(rowset(&chunk_rows(2, 2)))),
    ])
    .await;

    let descriptors = (0..3).map(|i| (i, 2, format!("/chunk/{}", i), 1024)).collect();
    let mut scheduler = scheduler(
        &server,
        descriptors,
        PrefetchConfig::new().with_prefetch_width(2),
        ChunkHeaders::new(),
    );

    let first = scheduler.next_chunk().await.unwrap().unwrap();
    assert_eq!(first.chunk_index(), 0);
    first.release();

    let err = scheduler.next_chunk().await.unwrap_err();
    match &err {
        RfError::Transport(TransportError::Status { status, locator }) => {
            assert_eq!(*status, 404);
            assert!(locator.ends_with("/chunk/1"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(classify_error(&err), ErrorCategory::Permanent);

    scheduler.cancel();
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = ChunkServer::start(vec![("/chunk/0".to_string(), Route::status(503))]).await;
    let mut scheduler = scheduler(
        &server,
        vec![(0, 1, "/chunk/0".to_string(), 0)],
        PrefetchConfig::new(),
        ChunkHeaders::new(),
    );

    let err = scheduler.next_chunk().await.unwrap_err();
    assert_eq!(classify_error(&err), ErrorCategory::Transient);
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server =
        ChunkServer::start(vec![("/chunk/0".to_string(), Route::ok(r#"[["a","b",]]"#))]).await;
    let mut scheduler = scheduler(
        &server,
        vec![(0, 1, "/chunk/0".to_string(), 0)],
        PrefetchConfig::new(),
        ChunkHeaders::new(),
    );

    let err = scheduler.next_chunk().await.unwrap_err();
    assert!(matches!(err, RfError::Parse(ParseError::Syntax { .. })), "{err:?}");
}

#[tokio::test]
async fn test_short_body_is_truncated() {
    let server = ChunkServer::start(vec![(
        "/chunk/0".to_string(),
        Route::ok(rowset(&chunk_rows(0, 2))),
    )])
    .await;
    let mut scheduler = scheduler(
        &server,
        vec![(0, 4, "/chunk/0".to_string(), 0)],
        PrefetchConfig::new(),
        ChunkHeaders::new(),
    );

    let err = scheduler.next_chunk().await.unwrap_err();
    assert!(matches!(
        err,
        RfError::Parse(ParseError::Truncated { written: 6, expected: 12 })
    ));
}

fn wide_rows() -> Vec<Vec<Option<String>>> {
    (0..2)
        .map(|row| {
            (0..COLS)
                .map(|col| Some(format!("{}{}", row * COLS + col, "\u{4e2d}x".repeat(50_000))))
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn test_cells_straddling_blocks_read_back_intact() {
    let rows = wide_rows();
    let server = ChunkServer::start(vec![(
        "/chunk/0".to_string(),
        Route::ok(rowset(&rows)).in_pieces(16),
    )])
    .await;

    // Six cells of ~200 KB span two 1 MiB blocks.
    let mut scheduler = scheduler(
        &server,
        vec![(0, 2, "/chunk/0".to_string(), 2 * 1024 * 1024)],
        PrefetchConfig::new(),
        ChunkHeaders::new(),
    );

    let chunk = scheduler.next_chunk().await.unwrap().unwrap();
    assert_eq!(chunk.arena().block_count(), 2);
    for (row, cells) in rows.iter().enumerate() {
        assert_eq!(&chunk.row(row).unwrap(), cells);
    }
    chunk.release();
}

#[tokio::test]
async fn test_underestimated_chunk_obeys_overflow_policy() {
    let rows = wide_rows();
    let server = ChunkServer::start(vec![("/chunk/0".to_string(), Route::ok(rowset(&rows)))]).await;
    let descriptor = || vec![(0, 2, "/chunk/0".to_string(), 1024)];

    let mut failing = scheduler(&server, descriptor(), PrefetchConfig::new(), ChunkHeaders::new());
    let err = failing.next_chunk().await.unwrap_err();
    assert!(matches!(err, RfError::Arena(ArenaError::Overflow { .. })), "{err:?}");

    let grow = PrefetchConfig::new()
        .with_arena(ArenaConfig::new().with_overflow_policy(OverflowPolicy::Grow));
    let mut growing = scheduler(&server, descriptor(), grow, ChunkHeaders::new());
    let chunk = growing.next_chunk().await.unwrap().unwrap();
    assert!(chunk.arena().block_count() >= 2);
    assert_eq!(chunk.get_cell(1, 2).unwrap(), rows[1][2]);
}

#[tokio::test]
async fn test_cancel_during_slow_download() {
    let server = ChunkServer::start(vec![(
        "/chunk/0".to_string(),
        Route::ok(rowset(&chunk_rows(0, 1))).with_delay(Duration::from_secs(30)),
    )])
    .await;
    let mut scheduler = scheduler(
        &server,
        vec![(0, 1, "/chunk/0".to_string(), 0)],
        PrefetchConfig::new(),
        ChunkHeaders::new(),
    );

    let token = scheduler.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), scheduler.next_chunk())
        .await
        .expect("cancellation should resolve the pending chunk")
        .unwrap_err();
    assert!(matches!(err, RfError::Cancelled));
}
