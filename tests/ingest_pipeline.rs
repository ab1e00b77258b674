//! End-to-end ingestion tests: mocked subreddit feeds in, SQLite rows out.
//!
//! Each test runs its own wiremock server and in-memory database. Sources
//! are `stocks` and `investing` unless a test says otherwise.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tickerpulse::config::Config;
use tickerpulse::enrich::{
    CashtagExtractor, LexiconSentiment, Sentiment, SentimentService, ServiceError,
    StaticClassifier,
};
use tickerpulse::feed::FeedFetcher;
use tickerpulse::ingest::{Collaborators, DateRange, IngestError, Ingestor, Stage};
use tickerpulse::storage::Database;

// ============================================================================
// Fixtures
// ============================================================================

struct Entry<'a> {
    id: &'a str,
    title: &'a str,
    body: &'a str,
    updated: &'a str,
}

fn entry<'a>(id: &'a str, title: &'a str, body: &'a str) -> Entry<'a> {
    Entry {
        id,
        title,
        body,
        updated: "2024-01-02T09:30:00+00:00",
    }
}

fn atom(source: &str, entries: &[Entry<'_>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><feed xmlns="http://www.w3.org/2005/Atom"><title>search results</title>"#,
    );
    for e in entries {
        xml.push_str(&format!(
            r#"<entry><author><name>/u/trader</name></author><content type="html">&lt;p&gt;{body}&lt;/p&gt;</content><id>t3_{id}</id><link href="https://www.reddit.com/r/{source}/comments/{id}/post/"/><updated>{updated}</updated><title>{title}</title></entry>"#,
            body = e.body,
            id = e.id,
            source = source,
            updated = e.updated,
            title = e.title,
        ));
    }
    xml.push_str("</feed>");
    xml
}

async fn mount_feed(server: &MockServer, source: &str, body: String, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/r/{}/search.rss", source)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.feeds.base_url = server.uri();
    config.feeds.sources = vec!["stocks".to_string(), "investing".to_string()];
    config.feeds.timeout_secs = 5;
    config.feeds.max_retries = 0;
    config.feeds.retry_base_delay_ms = 1;
    config
}

fn services(db: &Database) -> Collaborators {
    let classifier = StaticClassifier::default();
    Collaborators {
        sentiment: Arc::new(LexiconSentiment::new()),
        tickers: Arc::new(CashtagExtractor::with_known_symbols(classifier.symbols())),
        classifier: Arc::new(classifier),
        store: Arc::new(db.clone()),
    }
}

fn ingestor(config: &Config, services: Collaborators) -> Ingestor {
    let fetcher = FeedFetcher::new(&config.feeds).unwrap();
    Ingestor::new(config, fetcher, services).unwrap()
}

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

/// Fails on any text containing "FAIL", otherwise defers to the lexicon.
struct FlakySentiment;

impl SentimentService for FlakySentiment {
    fn analyze(&self, text: &str) -> Result<Sentiment, ServiceError> {
        if text.contains("FAIL") {
            return Err(ServiceError::new("sentiment", "model unavailable"));
        }
        LexiconSentiment::new().analyze(text)
    }
}

// ============================================================================
// Happy Path
// ============================================================================

#[tokio::test]
async fn test_ingest_filters_enriches_and_persists() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "stocks",
        atom(
            "stocks",
            &[
                entry("a1", "$AAPL earnings beat estimates", "Strong services growth"),
                entry("a2", "Daily Discussion Thread - Jan 2", "Talk here"),
            ],
        ),
        1,
    )
    .await;
    mount_feed(
        &server,
        "investing",
        atom("investing", &[entry("b1", "MSFT guidance cut", "Shares drop")]),
        1,
    )
    .await;

    let db = test_db().await;
    let config = test_config(&server);
    let report = ingestor(&config, services(&db))
        .ingest(None, 10, None)
        .await
        .unwrap();

    assert_eq!(report.count, 2);
    let ids: Vec<&str> = report.posts.iter().map(|p| p.post.id.as_str()).collect();
    assert_eq!(ids, vec!["reddit_t3_a1", "reddit_t3_b1"]);

    let apple = &report.posts[0];
    assert_eq!(apple.tickers, vec!["AAPL"]);
    assert_eq!(apple.sectors, vec!["Technology"]);
    assert_eq!(apple.post.source, "stocks");
    assert_eq!(apple.post.author, "/u/trader");

    assert_eq!(db.count_posts().await.unwrap(), 2);
    assert_eq!(db.tickers_for_post("reddit_t3_a1").await.unwrap(), vec!["AAPL"]);
    assert_eq!(
        db.industries_for_post("reddit_t3_a1").await.unwrap(),
        vec!["Consumer Electronics"]
    );
    let record = db.get_ticker("AAPL").await.unwrap().unwrap();
    assert_eq!(record.company_name.as_deref(), Some("Apple Inc."));
    assert_eq!(db.tickers_for_post("reddit_t3_b1").await.unwrap(), vec!["MSFT"]);
}

#[tokio::test]
async fn test_search_request_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/stocks/search.rss"))
        .and(query_param("q", "earnings"))
        .and(query_param("restrict_sr", "on"))
        .and(query_param("sort", "new"))
        .and(query_param("limit", "6"))
        .respond_with(ResponseTemplate::new(200).set_body_string(atom("stocks", &[])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/investing/search.rss"))
        .and(query_param("limit", "6"))
        .respond_with(ResponseTemplate::new(200).set_body_string(atom("investing", &[])))
        .expect(1)
        .mount(&server)
        .await;

    let db = test_db().await;
    let config = test_config(&server);
    // 10 over 2 sources -> 6 per source
    let report = ingestor(&config, services(&db))
        .ingest(Some("earnings"), 10, None)
        .await
        .unwrap();
    assert_eq!(report.count, 0);
}

#[tokio::test]
async fn test_report_serializes_rest_fields() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "stocks",
        atom("stocks", &[entry("a1", "$NVDA rally", "Record quarter")]),
        1,
    )
    .await;
    mount_feed(&server, "investing", atom("investing", &[]), 1).await;

    let db = test_db().await;
    let config = test_config(&server);
    let report = ingestor(&config, services(&db))
        .ingest(None, 10, None)
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["count"], 1);
    let post = &json["posts"][0];
    for key in [
        "id",
        "text",
        "title",
        "url",
        "source",
        "author",
        "created_at",
        "timezone",
        "sentiment",
        "tickers",
    ] {
        assert!(post.get(key).is_some(), "missing {}", key);
    }
    assert!(post.get("native_id").is_none());
    assert_eq!(post["created_at"], "2024-01-02T09:30:00+00:00");
    assert_eq!(post["timezone"], "UTC");
    assert_eq!(post["text"], "$NVDA rally\n\n<p>Record quarter</p>");
    assert_eq!(post["sentiment"]["label"], "positive");
}

// ============================================================================
// Idempotence & Deduplication
// ============================================================================

#[tokio::test]
async fn test_repeated_ingestion_is_idempotent() {
    let server = MockServer::start().await;
    let stocks = atom(
        "stocks",
        &[
            entry("a1", "$AAPL earnings beat estimates", "Strong growth"),
            entry("a2", "$TSLA deliveries", "Numbers out"),
        ],
    );
    mount_feed(&server, "stocks", stocks, 2).await;
    mount_feed(&server, "investing", atom("investing", &[]), 2).await;

    let db = test_db().await;
    let config = test_config(&server);
    let ingestor = ingestor(&config, services(&db));

    let first = ingestor.ingest(None, 10, None).await.unwrap();
    let second = ingestor.ingest(None, 10, None).await.unwrap();

    let first_ids: Vec<_> = first.posts.iter().map(|p| p.post.id.clone()).collect();
    let second_ids: Vec<_> = second.posts.iter().map(|p| p.post.id.clone()).collect();
    assert_eq!(first_ids, second_ids);
    assert_eq!(db.count_posts().await.unwrap(), 2);
    assert_eq!(db.tickers_for_post("reddit_t3_a1").await.unwrap(), vec!["AAPL"]);
}

#[tokio::test]
async fn test_same_post_in_two_sources_kept_once() {
    let server = MockServer::start().await;
    let shared = [entry("dup", "$AMZN cloud growth", "Strong quarter")];
    mount_feed(&server, "stocks", atom("stocks", &shared), 1).await;
    mount_feed(&server, "investing", atom("investing", &shared), 1).await;

    let db = test_db().await;
    let config = test_config(&server);
    let report = ingestor(&config, services(&db))
        .ingest(None, 10, None)
        .await
        .unwrap();

    assert_eq!(report.count, 1);
    assert_eq!(report.posts[0].post.source, "stocks");
}

// ============================================================================
// Caps & Early Exit
// ============================================================================

#[tokio::test]
async fn test_stops_fetching_once_cap_reached() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "stocks",
        atom(
            "stocks",
            &[
                entry("a1", "$AAPL up", "one"),
                entry("a2", "$MSFT up", "two"),
                entry("a3", "$NVDA up", "three"),
            ],
        ),
        1,
    )
    .await;
    // Never requested: the cap is filled by the first source
    mount_feed(&server, "investing", atom("investing", &[]), 0).await;

    let db = test_db().await;
    let config = test_config(&server);
    let report = ingestor(&config, services(&db))
        .ingest(None, 2, None)
        .await
        .unwrap();

    assert_eq!(report.count, 2);
    assert_eq!(db.count_posts().await.unwrap(), 2);
}

#[tokio::test]
async fn test_non_positive_cap_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let db = test_db().await;
    let config = test_config(&server);
    let ingestor = ingestor(&config, services(&db));
    for cap in [0, -5] {
        let report = ingestor.ingest(None, cap, None).await.unwrap();
        assert_eq!(report.count, 0);
        assert!(report.posts.is_empty());
    }
}

#[tokio::test]
async fn test_cap_clamped_to_max_results() {
    let server = MockServer::start().await;
    let entries: Vec<String> = (0..5).map(|i| format!("p{}", i)).collect();
    let feed: Vec<Entry<'_>> = entries
        .iter()
        .map(|id| entry(id, "$JPM dividend", "Bank news"))
        .collect();
    mount_feed(&server, "stocks", atom("stocks", &feed), 1).await;
    mount_feed(&server, "investing", atom("investing", &[]), 0).await;

    let db = test_db().await;
    let mut config = test_config(&server);
    config.feeds.max_results = 3;
    let report = ingestor(&config, services(&db))
        .ingest(None, 1000, None)
        .await
        .unwrap();
    assert_eq!(report.count, 3);
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn test_failing_source_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/stocks/search.rss"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    mount_feed(
        &server,
        "investing",
        atom("investing", &[entry("b1", "$XOM oil prices", "Energy")]),
        1,
    )
    .await;

    let db = test_db().await;
    let config = test_config(&server);
    let report = ingestor(&config, services(&db))
        .ingest(None, 10, None)
        .await
        .unwrap();

    assert_eq!(report.count, 1);
    assert_eq!(report.posts[0].post.source, "investing");
}

#[tokio::test]
async fn test_malformed_feed_contributes_nothing() {
    let server = MockServer::start().await;
    mount_feed(&server, "stocks", "<feed><entry><title>x</wrong>".to_string(), 1).await;
    mount_feed(
        &server,
        "investing",
        atom("investing", &[entry("b1", "$JNJ filing", "Healthcare")]),
        1,
    )
    .await;

    let db = test_db().await;
    let config = test_config(&server);
    let report = ingestor(&config, services(&db))
        .ingest(None, 10, None)
        .await
        .unwrap();
    assert_eq!(report.count, 1);
}

#[tokio::test]
async fn test_all_sources_failing_yields_empty_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let db = test_db().await;
    let config = test_config(&server);
    let report = ingestor(&config, services(&db))
        .ingest(None, 10, None)
        .await
        .unwrap();
    assert_eq!(report.count, 0);
    assert_eq!(db.count_posts().await.unwrap(), 0);
}

#[tokio::test]
async fn test_deadline_cuts_off_slow_source() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "stocks",
        atom("stocks", &[entry("a1", "$AAPL earnings beat", "Strong quarter")]),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/r/investing/search.rss"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(atom("investing", &[entry("b1", "$MSFT cloud", "Azure")]))
                .set_delay(std::time::Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let db = test_db().await;
    let mut config = test_config(&server);
    config.feeds.timeout_secs = 30;
    config.feeds.ingest_timeout_secs = Some(1);

    let started = std::time::Instant::now();
    let report = ingestor(&config, services(&db))
        .ingest(None, 10, None)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < std::time::Duration::from_secs(4), "took {:?}", elapsed);
    assert_eq!(report.count, 1);
    assert_eq!(report.posts[0].post.id, "reddit_t3_a1");
    assert_eq!(db.count_posts().await.unwrap(), 1);
}

#[tokio::test]
async fn test_collaborator_failure_aborts_but_keeps_earlier_posts() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "stocks",
        atom(
            "stocks",
            &[
                entry("a1", "$AAPL beat", "fine"),
                entry("a2", "$MSFT FAIL", "broken"),
                entry("a3", "$NVDA beat", "fine"),
            ],
        ),
        1,
    )
    .await;
    mount_feed(&server, "investing", atom("investing", &[]), 1).await;

    let db = test_db().await;
    let config = test_config(&server);
    let mut services = services(&db);
    services.sentiment = Arc::new(FlakySentiment);

    let err = ingestor(&config, services)
        .ingest(None, 10, None)
        .await
        .unwrap_err();
    match err {
        IngestError::Collaborator { stage, post_id, .. } => {
            assert_eq!(stage, Stage::Sentiment);
            assert_eq!(post_id, "reddit_t3_a2");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(db.count_posts().await.unwrap(), 1);
    assert!(db.get_post("reddit_t3_a1").await.unwrap().is_some());
    assert!(db.get_post("reddit_t3_a3").await.unwrap().is_none());
}

// ============================================================================
// Date Range
// ============================================================================

#[tokio::test]
async fn test_date_range_drops_posts_outside_window() {
    let server = MockServer::start().await;
    let mut early = entry("old", "$AAPL old news", "stale");
    early.updated = "2023-12-31T23:00:00+00:00";
    let mut inside = entry("new", "$AAPL new news", "fresh");
    // 09:30 at UTC-05:00 is 14:30 UTC
    inside.updated = "2024-01-02T09:30:00-05:00";
    mount_feed(&server, "stocks", atom("stocks", &[early, inside]), 1).await;
    mount_feed(&server, "investing", atom("investing", &[]), 1).await;

    let db = test_db().await;
    let config = test_config(&server);
    let range = DateRange::new(
        Utc.with_ymd_and_hms(2024, 1, 2, 14, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
    )
    .unwrap();
    let report = ingestor(&config, services(&db))
        .ingest(None, 10, Some(range))
        .await
        .unwrap();

    assert_eq!(report.count, 1);
    let post = &report.posts[0].post;
    assert_eq!(post.id, "reddit_t3_new");
    assert_eq!(post.timezone, "UTC-05:00");
    assert_eq!(db.count_posts().await.unwrap(), 1);
}

// ============================================================================
// Ticker Metadata
// ============================================================================

#[tokio::test]
async fn test_unknown_ticker_linked_without_metadata() {
    let server = MockServer::start().await;
    mount_feed(
        &server,
        "stocks",
        atom("stocks", &[entry("a1", "$GME and $AAPL", "meme season")]),
        1,
    )
    .await;
    mount_feed(&server, "investing", atom("investing", &[]), 1).await;

    let db = test_db().await;
    let config = test_config(&server);
    let report = ingestor(&config, services(&db))
        .ingest(None, 10, None)
        .await
        .unwrap();

    let tickers: BTreeSet<&str> = report.posts[0].tickers.iter().map(String::as_str).collect();
    assert_eq!(tickers, BTreeSet::from(["AAPL", "GME"]));
    let gme = db.get_ticker("GME").await.unwrap().unwrap();
    assert_eq!(gme.company_name, None);
    assert_eq!(gme.sector, None);
}
