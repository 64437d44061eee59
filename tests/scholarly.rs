//! Search operations end to end against a mocked Scholar frontend.

use std::time::Duration;

use rustscholarly::navigator::{NavigatorOptions, RetryPolicy};
use rustscholarly::types::{AuthorSection, AuthorSortBy};
use rustscholarly::{Scholarly, ScholarError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scholarly(server: &MockServer) -> Scholarly {
    Scholarly::with_options(NavigatorOptions {
        base_url: server.uri(),
        timeout: Duration::from_millis(500),
        max_retries: 2,
        policy: RetryPolicy {
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            ..RetryPolicy::default()
        },
    })
}

fn publication_row(id: &str, title: &str) -> String {
    format!(
        r#"<tr class="gsc_a_tr"><td class="gsc_a_t"><a class="gsc_a_at" href="/citations?view_op=view_citation&amp;hl=en&amp;user=ADA&amp;citation_for_view=ADA:{id}">{title}</a><div class="gs_gray">A Lovelace</div><div class="gs_gray">Notes, 1843</div></td><td class="gsc_a_c"><a class="gsc_a_ac gs_ibl" href="/scholar?cites=77">3</a></td><td class="gsc_a_y"><span class="gsc_a_h">1843</span></td></tr>"#
    )
}

#[tokio::test]
async fn filled_author_profile_pages_through_publications() {
    let server = MockServer::start().await;
    let first = format!(
        r#"<html><body><div id="gsc_prf_in">Ada Lovelace</div>
<table class="gsc_rsb_st"><tr><td class="gsc_rsb_std">120</td><td class="gsc_rsb_std">40</td></tr>
<tr><td class="gsc_rsb_std">3</td><td class="gsc_rsb_std">2</td></tr>
<tr><td class="gsc_rsb_std">1</td><td class="gsc_rsb_std">1</td></tr></table>
<table>{}{}</table><button id="gsc_bpf_more"></button></body></html>"#,
        publication_row("p1", "Sketch of the Analytical Engine"),
        publication_row("p2", "Notes on the engine")
    );
    let second = format!(
        r#"<html><body><table>{}</table><button id="gsc_bpf_more" disabled></button></body></html>"#,
        publication_row("p3", "Letters")
    );

    Mock::given(method("GET"))
        .and(path("/citations"))
        .and(query_param("user", "ADA"))
        .and(query_param("cstart", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_string(second))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/citations"))
        .and(query_param("user", "ADA"))
        .respond_with(ResponseTemplate::new(200).set_body_string(first))
        .expect(1)
        .mount(&server)
        .await;

    let scholarly = scholarly(&server);
    let author = scholarly
        .search_author_id("ADA", true, AuthorSortBy::CitedBy, 0)
        .await
        .expect("author");

    assert_eq!(author.name.as_deref(), Some("Ada Lovelace"));
    assert_eq!(author.citedby, Some(120));
    assert_eq!(author.hindex, Some(3));
    let titles: Vec<&str> = author.publications.iter().map(|p| p.title()).collect();
    assert_eq!(
        titles,
        vec!["Sketch of the Analytical Engine", "Notes on the engine", "Letters"]
    );
    for section in AuthorSection::ALL {
        assert!(author.is_filled(section), "{section:?} should be filled");
    }
}

#[tokio::test]
async fn unfilled_author_fetches_basics_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/citations"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<div id="gsc_prf_in">Ada Lovelace</div><table>{}</table><button id="gsc_bpf_more"></button>"#,
            publication_row("p1", "Sketch")
        )))
        .expect(1)
        .mount(&server)
        .await;

    let author = scholarly(&server)
        .search_author_id("ADA", false, AuthorSortBy::Year, 0)
        .await
        .expect("author");
    assert_eq!(author.name.as_deref(), Some("Ada Lovelace"));
    assert!(author.is_filled(AuthorSection::Basics));
    assert!(!author.is_filled(AuthorSection::Publications));
    assert!(author.publications.is_empty());
}

const RESULTS: &str = r#"<html><body>
<div class="gs_ab_mdw">About 2 results</div>
<div class="gs_r gs_or gs_scl" data-cid="CID1" data-rp="0"><div class="gs_ri">
<h3 class="gs_rt"><a href="https://example.org/engine">The Analytical Engine</a></h3>
<div class="gs_a">A Lovelace - Notes, 1843 - example.org</div>
<div class="gs_fl"><a href="/scholar?cites=555&amp;hl=en">Cited by 7</a></div>
</div></div>
</body></html>"#;

#[tokio::test]
async fn single_pub_and_its_citations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("cites", "555"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<div class="gs_r gs_or gs_scl" data-cid="C2" data-rp="0"><div class="gs_ri"><h3 class="gs_rt">Citing work</h3></div></div>"#,
        ))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/scholar"))
        .and(query_param("q", "analytical engine"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RESULTS))
        .expect(1)
        .mount(&server)
        .await;

    let scholarly = scholarly(&server);
    let mut found = scholarly
        .search_single_pub("analytical engine", true)
        .await
        .expect("publication");
    assert_eq!(found.title(), "The Analytical Engine");
    assert_eq!(found.num_citations, 7);
    assert!(found.filled);

    let mut citing = scholarly.citedby(&mut found).await.expect("citedby");
    let first = citing.next().await.expect("page").expect("item");
    assert_eq!(first.title(), "Citing work");
    assert!(citing.next().await.expect("end").is_none());
}

#[tokio::test]
async fn single_pub_without_results_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .mount(&server)
        .await;

    let err = scholarly(&server)
        .search_single_pub("nothing", false)
        .await
        .expect_err("no rows");
    assert!(matches!(err, ScholarError::Parse(_)));
}

#[tokio::test]
async fn organizations_from_author_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/citations"))
        .and(query_param("view_op", "search_authors"))
        .and(query_param("mauthors", "Princeton"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<div class="gsc_inst_res"><a href="/citations?view_op=view_org&amp;hl=en&amp;org=4836318610601440500">Princeton University</a></div>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let orgs = scholarly(&server).search_org("Princeton").await.expect("orgs");
    assert_eq!(orgs.len(), 1);
    assert_eq!(orgs[0].name, "Princeton University");
    assert_eq!(orgs[0].id, "4836318610601440500");
}
