use chrono::NaiveDate;
use mockito::Matcher;
use purchase_core::ports::{RateSource, RateSourceError};
use purchase_core::treasury::TreasuryClient;
use serde_json::json;

const PATH: &str = "/services/api/fiscal_service/v1/accounting/od/rates_of_exchange";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn page(size: &str) -> Matcher {
    Matcher::UrlEncoded("page[size]".into(), size.into())
}

#[tokio::test]
async fn test_range_query_parses_rates() {
    let mut server = mockito::Server::new_async().await;
    let body = json!({
        "data": [
            {"country_currency_desc": "Euro Zone-Euro", "exchange_rate": "0.85", "record_date": "2024-01-09"},
            {"country_currency_desc": "Euro Zone-Euro", "exchange_rate": "0.91", "record_date": "2023-09-30"}
        ],
        "meta": {"count": 2}
    });

    let mock = server
        .mock("GET", PATH)
        .match_query(Matcher::AllOf(vec![
            page("1000"),
            Matcher::UrlEncoded("sort".into(), "-record_date".into()),
            Matcher::UrlEncoded(
                "filter".into(),
                "country_currency_desc:eq:Euro Zone-Euro,record_date:gte:2023-07-10,record_date:lte:2024-01-10".into(),
            ),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;

    let client = TreasuryClient::new(format!("{}{}", server.url(), PATH));
    let rates = client
        .rates_in_range("Euro Zone-Euro", date(2023, 7, 10), date(2024, 1, 10))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(rates.len(), 2);
    assert_eq!(rates[0].effective_date, date(2024, 1, 9));
    assert_eq!(rates[0].rate.to_string(), "0.85");
}

#[tokio::test]
async fn test_malformed_rows_are_skipped() {
    let mut server = mockito::Server::new_async().await;
    let body = json!({
        "data": [
            {"country_currency_desc": "Euro Zone-Euro", "exchange_rate": "n/a", "record_date": "2024-01-09"},
            {"country_currency_desc": "Euro Zone-Euro", "exchange_rate": "0.91", "record_date": "not-a-date"},
            {"country_currency_desc": "Euro Zone-Euro", "exchange_rate": "0.90", "record_date": "2023-12-31"}
        ]
    });

    let _mock = server
        .mock("GET", PATH)
        .match_query(page("1000"))
        .with_status(200)
        .with_body(body.to_string())
        .create_async()
        .await;

    let client = TreasuryClient::new(format!("{}{}", server.url(), PATH));
    let rates = client
        .rates_in_range("Euro Zone-Euro", date(2023, 7, 10), date(2024, 1, 10))
        .await
        .unwrap();

    assert_eq!(rates.len(), 1);
    assert_eq!(rates[0].effective_date, date(2023, 12, 31));
}

#[tokio::test]
async fn test_empty_window_for_known_currency_is_empty() {
    let mut server = mockito::Server::new_async().await;
    let _range = server
        .mock("GET", PATH)
        .match_query(page("1000"))
        .with_status(200)
        .with_body(json!({"data": []}).to_string())
        .create_async()
        .await;
    let probe = server
        .mock("GET", PATH)
        .match_query(Matcher::AllOf(vec![
            page("1"),
            Matcher::UrlEncoded(
                "filter".into(),
                "country_currency_desc:eq:Euro Zone-Euro".into(),
            ),
        ]))
        .with_status(200)
        .with_body(
            json!({"data": [
                {"country_currency_desc": "Euro Zone-Euro", "exchange_rate": "0.93", "record_date": "2022-03-31"}
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let client = TreasuryClient::new(format!("{}{}", server.url(), PATH));
    let rates = client
        .rates_in_range("Euro Zone-Euro", date(2023, 7, 10), date(2024, 1, 10))
        .await
        .unwrap();

    probe.assert_async().await;
    assert!(rates.is_empty());
}

#[tokio::test]
async fn test_currency_without_any_record_is_unknown() {
    let mut server = mockito::Server::new_async().await;
    let _any = server
        .mock("GET", PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"data": []}).to_string())
        .expect(2)
        .create_async()
        .await;

    let client = TreasuryClient::new(format!("{}{}", server.url(), PATH));
    let result = client
        .rates_in_range("Atlantis-Shell", date(2023, 7, 10), date(2024, 1, 10))
        .await;

    assert!(matches!(result, Err(RateSourceError::UnknownCurrency(c)) if c == "Atlantis-Shell"));
}

#[tokio::test]
async fn test_server_error_is_transport_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", PATH)
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let client = TreasuryClient::new(format!("{}{}", server.url(), PATH));
    let result = client
        .rates_in_range("Euro Zone-Euro", date(2023, 7, 10), date(2024, 1, 10))
        .await;

    assert!(matches!(result, Err(RateSourceError::Transport(_))));
}

#[tokio::test]
async fn test_circuit_breaker_opens_after_failures() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", PATH)
        .match_query(Matcher::Any)
        .with_status(500)
        .expect(3)
        .create_async()
        .await;

    let client = TreasuryClient::with_circuit_breaker(format!("{}{}", server.url(), PATH), 3, 60);

    for _ in 0..3 {
        let _ = client
            .rates_in_range("Euro Zone-Euro", date(2023, 7, 10), date(2024, 1, 10))
            .await;
    }
    assert_eq!(client.circuit_state(), "open");

    let result = client
        .rates_in_range("Euro Zone-Euro", date(2023, 7, 10), date(2024, 1, 10))
        .await;
    match result {
        Err(RateSourceError::Transport(msg)) => assert!(msg.contains("circuit breaker")),
        other => panic!("expected an open breaker, got {:?}", other),
    }
    mock.assert_async().await;
}
