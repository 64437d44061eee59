//! Lazy pagination over mocked result pages.

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use rustscholarly::author::AuthorListing;
use rustscholarly::navigator::{Navigator, NavigatorOptions, RetryPolicy};
use rustscholarly::pagination::PageIterator;
use rustscholarly::publication::PublicationListing;
use rustscholarly::ScholarError;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn navigator(server: &MockServer, retries: u32) -> Arc<Navigator> {
    Arc::new(Navigator::with_options(NavigatorOptions {
        base_url: server.uri(),
        timeout: Duration::from_millis(500),
        max_retries: retries,
        policy: RetryPolicy {
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            ..RetryPolicy::default()
        },
    }))
}

/// Results page with `rows` entries numbered from `first`
fn results_page(first: usize, rows: usize, next: Option<&str>) -> String {
    let mut html = String::from(r#"<html><body><div class="gs_ab_mdw">About 24 results (0.03 sec)</div>"#);
    for i in first..first + rows {
        html.push_str(&format!(
            r#"<div class="gs_r gs_or gs_scl" data-cid="c{i}" data-rp="{i}"><div class="gs_ri"><h3 class="gs_rt"><a href="/paper/{i}">Paper {i}</a></h3><div class="gs_a">A Author - Venue, 2020 - host</div></div></div>"#
        ));
    }
    if let Some(next) = next {
        html.push_str(&format!(
            r#"<a href="{next}"><span class="gs_ico gs_ico_nav_next"></span></a>"#
        ));
    }
    html.push_str("</body></html>");
    html
}

async fn mount_three_pages(server: &MockServer) {
    let pages = [
        ("p1", results_page(0, 10, Some("/scholar?q=p2")), 1),
        ("p2", results_page(10, 10, Some("/scholar?q=p3")), 1),
        ("p3", results_page(20, 4, None), 1),
    ];
    for (q, body, times) in pages {
        Mock::given(method("GET"))
            .and(path("/scholar"))
            .and(query_param("q", q))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(times)
            .mount(server)
            .await;
    }
}

fn search(nav: Arc<Navigator>) -> PageIterator<PublicationListing> {
    let target = "/scholar?q=p1";
    PageIterator::new(nav, target, PublicationListing::for_target(target))
}

#[tokio::test]
async fn walks_every_page_once_in_order() {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;

    let mut iter = search(navigator(&server, 2));
    assert_eq!(iter.total_results(), None);
    let received = server.received_requests().await.unwrap_or_default();
    assert!(received.is_empty(), "no request before the first next()");

    let first = iter.next().await.expect("first").expect("some item");
    assert_eq!(first.title(), "Paper 0");
    assert_eq!(iter.total_results(), Some(24));

    let mut titles = vec![first.title().to_string()];
    while let Some(publication) = iter.next().await.expect("next") {
        titles.push(publication.title().to_string());
    }
    let expected: Vec<String> = (0..24).map(|i| format!("Paper {i}")).collect();
    assert_eq!(titles, expected);
    assert_eq!(iter.pages_loaded(), 3);

    // stays finished without further requests
    assert!(iter.next().await.expect("after end").is_none());
    assert_eq!(iter.total_results(), Some(24));
}

#[tokio::test]
async fn next_and_stream_share_the_cursor() {
    let server = MockServer::start().await;
    mount_three_pages(&server).await;

    let mut iter = search(navigator(&server, 2));
    let mut titles = Vec::new();
    for _ in 0..12 {
        let item = iter.next().await.expect("next").expect("item");
        titles.push(item.title().to_string());
    }

    let streamed: Vec<_> = iter.stream().take(5).try_collect().await.expect("stream");
    titles.extend(streamed.iter().map(|p| p.title().to_string()));

    while let Some(item) = iter.next().await.expect("next") {
        titles.push(item.title().to_string());
    }

    let expected: Vec<String> = (0..24).map(|i| format!("Paper {i}")).collect();
    assert_eq!(titles, expected);
}

#[tokio::test]
async fn page_limit_bounds_the_walk() {
    let server = MockServer::start().await;
    for (q, body) in [
        ("p1", results_page(0, 10, Some("/scholar?q=p2"))),
        ("p2", results_page(10, 10, Some("/scholar?q=p3"))),
    ] {
        Mock::given(method("GET"))
            .and(query_param("q", q))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let mut iter = search(navigator(&server, 2)).with_page_limit(2);
    let all: Vec<_> = iter.stream().try_collect().await.expect("walk");
    assert_eq!(all.len(), 20);
    assert_eq!(iter.pages_loaded(), 2);
}

#[tokio::test]
async fn failed_page_ends_the_walk_and_keeps_earlier_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "p1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(results_page(0, 10, Some("/scholar?q=p2"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("q", "p2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let mut iter = search(navigator(&server, 2));
    let mut kept = Vec::new();
    let err = loop {
        match iter.next().await {
            Ok(Some(item)) => kept.push(item),
            Ok(None) => panic!("walk should fail on the second page"),
            Err(e) => break e,
        }
    };
    assert_eq!(kept.len(), 10);
    assert_eq!(kept[9].title(), "Paper 9");
    assert!(matches!(err, ScholarError::RetrievalExhausted { attempts: 2, .. }));
    assert!(iter.next().await.expect("ended").is_none());
}

#[tokio::test]
async fn author_listing_follows_encoded_next_button() {
    let server = MockServer::start().await;
    let row = |id: &str| {
        format!(
            r#"<div class="gsc_1usr"><a href="/citations?hl=en&amp;user={id}"></a><h3 class="gs_ai_name">{id}</h3></div>"#
        )
    };
    let first = format!(
        r#"<html><body>{}{}<button onclick="window.location='/citations?view_op\x3dsearch_authors\x26hl\x3den\x26mauthors\x3drust\x26astart\x3d10'" class="gs_btnPR gs_in_ib gs_btn_half gs_btn_lsb gs_btn_srt gsc_pgn_pnx"></button></body></html>"#,
        row("A1"),
        row("A2")
    );
    let second = format!(
        r#"<html><body>{}<button disabled class="gs_btnPR gs_in_ib gs_btn_half gs_btn_lsb gs_btn_srt gsc_pgn_pnx"></button></body></html>"#,
        row("A3")
    );

    Mock::given(method("GET"))
        .and(path("/citations"))
        .and(query_param("astart", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_string(second))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/citations"))
        .respond_with(ResponseTemplate::new(200).set_body_string(first))
        .expect(1)
        .mount(&server)
        .await;

    let mut iter = PageIterator::new(
        navigator(&server, 2),
        "/citations?hl=en&view_op=search_authors&mauthors=rust",
        AuthorListing,
    );
    let ids: Vec<String> = iter
        .stream()
        .map(|a| a.map(|a| a.scholar_id))
        .try_collect()
        .await
        .expect("walk");
    assert_eq!(ids, vec!["A1", "A2", "A3"]);
}
