//! Publication rows: search snippets, author profile entries and detail pages.

use crate::error::{Result, ScholarError};
use crate::html::{
    first_attr, first_number, first_text, parse_count, regex, selector, strip_abstract_label,
    text_of, text_without,
};
use crate::navigator::{Navigator, DEFAULT_SCHOLAR_URL};
use crate::pagination::{Listing, ParsedPage};
use crate::types::{Publication, PublicationSource};
use scraper::{ElementRef, Html};
use tracing::{debug, info};

const CITATION_PUB: &str = "/citations?hl=en&view_op=view_citation&citation_for_view=";
const CITED_BY_LINK: &str = "/scholar?hl=en&cites=";

/// Tokens that mark a venue fragment in the author line
const VENUE_TOKENS: &[&str] = &[
    "Proceedings",
    "Conference",
    "Journal",
    "(",
    ")",
    "[",
    "]",
    "Transactions",
];

fn bib_cite_url(cid: &str, pos: &str) -> String {
    format!(
        "/scholar?hl=en&q=info:{}:scholar.google.com/&output=cite&scirp={}&hl=en",
        cid, pos
    )
}

fn cites_ids(href: &str) -> Result<Option<Vec<String>>> {
    let re = regex(r"cites=([\d,]*)")?;
    Ok(re.captures(href).and_then(|caps| caps.get(1)).map(|m| {
        m.as_str()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }))
}

/// Listing over `/scholar?` result pages and journal citation lists
#[derive(Debug, Clone)]
pub struct PublicationListing {
    source: PublicationSource,
}

impl PublicationListing {
    /// Pick the row format from the first target of the walk
    pub fn for_target(target: &str) -> Self {
        let source = if target.contains("/scholar?") {
            PublicationSource::PublicationSearchSnippet
        } else {
            PublicationSource::JournalCitationList
        };
        Self { source }
    }

    pub fn source(&self) -> PublicationSource {
        self.source
    }
}

impl Listing for PublicationListing {
    type Item = Publication;

    fn parse_page(&self, html: &str) -> Result<ParsedPage<Publication>> {
        let doc = Html::parse_document(html);
        let publib = doc
            .select(&selector("#gs_res_glb")?)
            .next()
            .and_then(|e| e.value().attr("data-sva"))
            .unwrap_or("")
            .to_string();

        let mut rows = Vec::new();
        for row in doc.select(&selector(".gs_r.gs_or.gs_scl")?) {
            rows.push(match self.source {
                PublicationSource::PublicationSearchSnippet => parse_search_snippet(row, &publib)?,
                _ => parse_listed_title(row, self.source),
            });
        }
        for row in doc.select(&selector(".gsc_mpat_ttl")?) {
            rows.push(parse_listed_title(row, self.source));
        }

        let next = doc
            .select(&selector(".gs_ico.gs_ico_nav_next")?)
            .next()
            .and_then(|icon| icon.parent())
            .and_then(ElementRef::wrap)
            .and_then(|parent| parent.value().attr("href"))
            .map(String::from);

        Ok(ParsedPage {
            rows,
            next,
            total_results: total_results(&doc)?,
        })
    }
}

/// "About 1,230 results" header count, 0 when absent
fn total_results(doc: &Html) -> Result<u64> {
    if doc.select(&selector(".gs_pda")?).next().is_some() {
        return Ok(0);
    }
    let re = regex(r"(?:^|\s*About)\s*([0-9,.\s']+)")?;
    for header in doc.select(&selector(".gs_ab_mdw")?) {
        let text = header.text().collect::<String>();
        let count = re
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_count(m.as_str()));
        if let Some(count) = count {
            return Ok(count);
        }
    }
    Ok(0)
}

fn parse_listed_title(row: ElementRef<'_>, source: PublicationSource) -> Publication {
    let mut publication = Publication::new(source);
    let title = text_of(row);
    if !title.is_empty() {
        publication.bib.title = Some(title);
    }
    publication
}

/// Parse one `.gs_r.gs_or.gs_scl` search result
pub fn parse_search_snippet(row: ElementRef<'_>, publib: &str) -> Result<Publication> {
    let mut publication = Publication::new(PublicationSource::PublicationSearchSnippet);
    let databox = row.select(&selector(".gs_ri")?).next().unwrap_or(row);

    let cid = row.value().attr("data-cid");
    let pos = row.value().attr("data-rp");
    publication.gsrank = pos.and_then(|p| p.parse::<u32>().ok()).map(|p| p + 1);

    if let Some(title) = databox.select(&selector("h3.gs_rt")?).next() {
        publication.bib.title = Some(text_without(title, &["gs_ctu", "gs_ctc"]));
        publication.pub_url = first_attr(title, &selector("a")?, "href");
    }

    if let Some(author_div) = databox.select(&selector(".gs_a")?).next() {
        let info = author_div
            .text()
            .collect::<String>()
            .replace('\u{a0}', " ")
            .replace("&amp;", "&");
        publication.bib.author = author_list(&info);
        publication.author_id = author_ids(&author_div.inner_html())?;

        let (venue, year) = venue_and_year(&info);
        publication.bib.venue = Some(venue);
        publication.bib.pub_year = Some(year);
    }

    if let Some(text) = first_text(databox, &selector(".gs_rs")?) {
        let text = text.replace('\u{2026}', "").replace('\n', " ");
        publication.bib.abstract_text = Some(strip_abstract_label(&text));
    }

    if let (Some(cid), Some(pos)) = (cid, pos) {
        publication.url_scholarbib = Some(bib_cite_url(cid, pos));
        if !publib.is_empty() {
            publication.url_add_sclib = Some(publib.replace("{id}", cid));
        }
    }

    for link in databox.select(&selector(".gs_fl a")?) {
        let text = link.text().collect::<String>();
        let href = link.value().attr("href");
        if text.contains("Cited by") {
            if let Some(count) = first_number(&text) {
                publication.num_citations = count;
                publication.citedby_url = href.map(String::from);
                if let Some(ids) = href.map(cites_ids).transpose()?.flatten() {
                    publication.cites_id = ids;
                }
            }
        }
        if text.contains("Related articles") {
            publication.url_related_articles = href.map(String::from);
        }
    }

    publication.eprint_url = first_attr(row, &selector(".gs_ggs.gs_fl a")?, "href");
    Ok(publication)
}

/// Names before the first " - ", with venue fragments and numbers dropped
fn author_list(info: &str) -> Vec<String> {
    let names = info.split(" - ").next().unwrap_or("");
    names
        .split(',')
        .map(|a| a.trim().replace("â€¦", "").replace('\u{2026}', ""))
        .filter(|a| !a.is_empty())
        .filter(|a| !a.chars().any(|c| c.is_ascii_digit()))
        .filter(|a| !VENUE_TOKENS.iter().any(|t| a.contains(t)))
        .collect()
}

/// Profile ids linked from the author line, empty for unlinked names
fn author_ids(info_html: &str) -> Result<Vec<String>> {
    let re = regex(r"\?user=(.*?)&amp;")?;
    let names = info_html.split(" - ").next().unwrap_or("");
    Ok(names
        .split(',')
        .map(|part| {
            re.captures(part)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
        .collect())
}

/// Split "authors - venue, year - host" into venue and year, `NA` when missing
fn venue_and_year(info: &str) -> (String, String) {
    let parts: Vec<&str> = info.split(" - ").collect();
    if parts.len() <= 2 {
        return ("NA".to_string(), "NA".to_string());
    }
    let pieces: Vec<&str> = parts[1].split(',').collect();
    let last = pieces.last().map(|s| s.trim()).unwrap_or("");
    if last.len() == 4 && last.chars().all(|c| c.is_ascii_digit()) {
        let venue = if pieces.len() >= 2 {
            pieces[..pieces.len() - 1].join(",").trim().to_string()
        } else {
            "NA".to_string()
        };
        (venue, last.to_string())
    } else {
        (pieces.join(",").trim().to_string(), "NA".to_string())
    }
}

/// Parse one `.gsc_a_tr` row of an author profile
pub fn parse_author_entry(row: ElementRef<'_>) -> Result<Publication> {
    let mut publication = Publication::new(PublicationSource::AuthorPublicationEntry);

    if let Some(link) = row.select(&selector("a.gsc_a_at")?).next() {
        publication.bib.title = Some(text_of(link));
        let re = regex(r"citation_for_view=([\w-]*:[\w-]*)")?;
        publication.author_pub_id = link
            .value()
            .attr("href")
            .and_then(|href| re.captures(href))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
    }

    if let Some(cited) = row.select(&selector(".gsc_a_ac")?).next() {
        let text = text_of(cited);
        if !text.is_empty() {
            publication.num_citations = text.parse().unwrap_or(0);
            if let Some(href) = cited.value().attr("href") {
                publication.citedby_url = Some(href.to_string());
                if let Some(ids) = cites_ids(href)? {
                    publication.cites_id = ids;
                }
            }
        }
    }

    if let Some(year) = first_text(row, &selector(".gsc_a_h")?) {
        if !year.is_empty() {
            publication.bib.pub_year = Some(year);
        }
    }

    let gray = selector(".gs_gray")?;
    publication.bib.citation = Some(row.select(&gray).nth(1).map(text_of).unwrap_or_default());
    Ok(publication)
}

/// Fetch the detail page of a profile entry and complete the record.
///
/// Search snippets have no detail page and are only marked filled.
pub async fn fill_publication(nav: &Navigator, publication: &mut Publication) -> Result<()> {
    match publication.source {
        PublicationSource::AuthorPublicationEntry => {
            let id = publication.author_pub_id.clone().ok_or_else(|| {
                ScholarError::Validation("Publication has no author_pub_id".to_string())
            })?;
            info!(id = %id, "Filling publication");
            let body = nav.fetch(&format!("{}{}", CITATION_PUB, id)).await?;
            apply_detail_page(&body, publication)?;
            publication.filled = true;
        }
        PublicationSource::PublicationSearchSnippet => {
            publication.filled = true;
        }
        PublicationSource::JournalCitationList => {
            debug!("Journal citation list entries cannot be filled");
        }
    }
    Ok(())
}

fn set_if_present(slot: &mut Option<String>, value: String) {
    if !value.is_empty() {
        *slot = Some(value);
    }
}

/// Apply a `view_citation` page to `publication`
pub fn apply_detail_page(html: &str, publication: &mut Publication) -> Result<()> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    if let Some(title) = first_text(root, &selector("#gsc_oci_title")?) {
        set_if_present(&mut publication.bib.title, title);
    }
    if let Some(url) = first_attr(root, &selector("a.gsc_oci_title_link")?, "href") {
        publication.pub_url = Some(url);
    }

    let field = selector(".gsc_oci_field")?;
    let value = selector(".gsc_oci_value")?;
    let anchor = selector("a")?;
    let year = regex(r"\d{4}")?;

    for item in doc.select(&selector(".gs_scl")?) {
        let Some(key) = first_text(item, &field) else {
            continue;
        };
        let Some(val) = item.select(&value).next() else {
            continue;
        };
        let text = text_of(val);
        let bib = &mut publication.bib;

        match key.to_lowercase().as_str() {
            "authors" | "inventors" => {
                bib.author = text
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
            }
            "journal" => set_if_present(&mut bib.journal, text),
            "conference" => set_if_present(&mut bib.conference, text),
            "volume" => set_if_present(&mut bib.volume, text),
            "issue" => set_if_present(&mut bib.number, text),
            "pages" => set_if_present(&mut bib.pages, text),
            "publisher" => set_if_present(&mut bib.publisher, text),
            "publication date" => {
                if let Some(m) = year.find(&text) {
                    bib.pub_year = Some(m.as_str().to_string());
                }
            }
            "description" => bib.abstract_text = Some(strip_abstract_label(&text)),
            "total citations" => {
                if let Some(href) = first_attr(val, &anchor, "href") {
                    if let Some(ids) = cites_ids(&href)? {
                        publication.citedby_url = Some(format!("{}{}", CITED_BY_LINK, ids.join(",")));
                        publication.cites_id = ids;
                    }
                }
                if let Some(count) = first_number(&text) {
                    publication.num_citations = count;
                }
            }
            "scholar articles" => {
                let related = val
                    .select(&anchor)
                    .find(|a| text_of(*a).eq_ignore_ascii_case("related articles"))
                    .and_then(|a| a.value().attr("href"));
                if let Some(href) = related {
                    let href = href.strip_prefix(DEFAULT_SCHOLAR_URL).unwrap_or(href);
                    publication.url_related_articles = Some(href.to_string());
                }
            }
            _ => {}
        }
    }

    publication.cites_per_year = cites_per_year(&doc)?;
    if let Some(eprint) = first_attr(root, &selector(".gsc_vcd_title_ggi a")?, "href") {
        publication.eprint_url = Some(eprint);
    }
    Ok(())
}

/// Year histogram of a detail page, zero for years without a bar
fn cites_per_year(doc: &Html) -> Result<crate::types::CitesPerYear> {
    let count = selector(".gsc_oci_g_al")?;
    let mut nonzero = std::collections::BTreeMap::new();
    for bar in doc.select(&selector(".gsc_oci_g_a")?) {
        let href = bar.value().attr("href").unwrap_or("");
        let year = href
            .get(href.len().saturating_sub(4)..)
            .and_then(|y| y.parse::<i32>().ok());
        let cites = first_text(bar, &count).and_then(|c| parse_count(&c));
        if let (Some(year), Some(cites)) = (year, cites) {
            nonzero.insert(year, cites);
        }
    }

    let mut per_year = crate::types::CitesPerYear::new();
    for label in doc.select(&selector(".gsc_oci_g_t")?) {
        if let Ok(year) = text_of(label).parse::<i32>() {
            per_year.insert(year, nonzero.get(&year).copied().unwrap_or(0));
        }
    }
    Ok(per_year)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r#"
<html><body>
<div id="gs_res_glb" data-sva="/citations?hl=en&amp;xsrf=abc&amp;continue=/scholar&amp;citilm=1&amp;update_op=library_add&amp;info={id}"></div>
<div class="gs_ab_mdw">About 1,230 results (0.05 sec)</div>
<div class="gs_r gs_or gs_scl" data-cid="CID1" data-rp="0">
  <div class="gs_ggs gs_fl"><a href="https://arxiv.org/pdf/1.pdf">[PDF] arxiv.org</a></div>
  <div class="gs_ri">
    <h3 class="gs_rt"><span class="gs_ctc">[HTML]</span><a href="https://example.org/paper">Attention is all you need</a></h3>
    <div class="gs_a"><a href="/citations?user=AUTH1&amp;hl=en">A Vaswani</a>, N Shazeer, Proceedings of X - Advances in neural information processing systems, 2017 - proceedings.neurips.cc</div>
    <div class="gs_rs">Abstract The dominant sequence transduction models …</div>
    <div class="gs_fl"><a href="/scholar?cites=111,222&amp;hl=en">Cited by 98765</a> <a href="/scholar?q=related:CID1:scholar.google.com/">Related articles</a></div>
  </div>
</div>
<div class="gs_r gs_or gs_scl" data-cid="CID2" data-rp="1">
  <div class="gs_ri">
    <h3 class="gs_rt">Untitled work without link</h3>
    <div class="gs_a">J Doe - example.com</div>
  </div>
</div>
<a href="/scholar?start=10&amp;q=attention&amp;hl=en"><span class="gs_ico gs_ico_nav_next"></span></a>
</body></html>"#;

    #[test]
    fn test_parse_results_page() -> Result<()> {
        let listing = PublicationListing::for_target("/scholar?hl=en&q=attention");
        let page = listing.parse_page(RESULTS_PAGE)?;

        assert_eq!(page.total_results, 1230);
        assert_eq!(page.next.as_deref(), Some("/scholar?start=10&q=attention&hl=en"));
        assert_eq!(page.rows.len(), 2);

        let first = &page.rows[0];
        assert_eq!(first.title(), "Attention is all you need");
        assert_eq!(first.gsrank, Some(1));
        assert_eq!(first.pub_url.as_deref(), Some("https://example.org/paper"));
        assert_eq!(first.bib.author, vec!["A Vaswani", "N Shazeer"]);
        assert_eq!(first.author_id, vec!["AUTH1", "", ""]);
        assert_eq!(
            first.bib.venue.as_deref(),
            Some("Advances in neural information processing systems")
        );
        assert_eq!(first.bib.pub_year.as_deref(), Some("2017"));
        assert_eq!(
            first.bib.abstract_text.as_deref(),
            Some("The dominant sequence transduction models")
        );
        assert_eq!(first.num_citations, 98765);
        assert_eq!(first.cites_id, vec!["111", "222"]);
        assert_eq!(first.citedby_url.as_deref(), Some("/scholar?cites=111,222&hl=en"));
        assert!(first
            .url_related_articles
            .as_deref()
            .is_some_and(|u| u.contains("related:CID1")));
        assert_eq!(first.eprint_url.as_deref(), Some("https://arxiv.org/pdf/1.pdf"));
        assert!(first
            .url_add_sclib
            .as_deref()
            .is_some_and(|u| u.ends_with("info=CID1")));
        assert!(first
            .url_scholarbib
            .as_deref()
            .is_some_and(|u| u.contains("info:CID1:") && u.contains("scirp=0")));

        let second = &page.rows[1];
        assert_eq!(second.title(), "Untitled work without link");
        assert_eq!(second.pub_url, None);
        assert_eq!(second.bib.venue.as_deref(), Some("NA"));
        assert_eq!(second.bib.pub_year.as_deref(), Some("NA"));
        Ok(())
    }

    #[test]
    fn test_total_results_variants() -> Result<()> {
        let listing = PublicationListing::for_target("/scholar?q=x");
        let single = listing.parse_page(r#"<div class="gs_ab_mdw">24 results</div>"#)?;
        assert_eq!(single.total_results, 24);

        let suggestion = listing
            .parse_page(r#"<div class="gs_pda">Did you mean</div><div class="gs_ab_mdw">About 5 results</div>"#)?;
        assert_eq!(suggestion.total_results, 0);

        let empty = listing.parse_page("<html></html>")?;
        assert_eq!(empty.total_results, 0);
        assert!(empty.rows.is_empty());
        assert!(empty.next.is_none());
        Ok(())
    }

    #[test]
    fn test_venue_without_year() {
        let (venue, year) = venue_and_year("A Author - Some Venue, Vol 2 - host.org");
        assert_eq!(venue, "Some Venue, Vol 2");
        assert_eq!(year, "NA");
    }

    #[test]
    fn test_parse_author_entry() -> Result<()> {
        let html = r#"<table><tr class="gsc_a_tr">
<td class="gsc_a_t"><a href="/citations?view_op=view_citation&amp;hl=en&amp;user=U1&amp;citation_for_view=U1:abc-DEF" class="gsc_a_at">Paper title</a>
<div class="gs_gray">A Author, B Author</div><div class="gs_gray">Nature 12, 2020</div></td>
<td class="gsc_a_c"><a href="https://scholar.google.com/scholar?oi=bibs&amp;cites=555" class="gsc_a_ac gs_ibl">42</a></td>
<td class="gsc_a_y"><span class="gsc_a_h gsc_a_hc gs_ibl">2020</span></td>
</tr></table>"#;
        let doc = Html::parse_document(html);
        let row = doc
            .select(&selector(".gsc_a_tr")?)
            .next()
            .ok_or_else(|| ScholarError::Parse("no row".into()))?;
        let publication = parse_author_entry(row)?;

        assert_eq!(publication.title(), "Paper title");
        assert_eq!(publication.author_pub_id.as_deref(), Some("U1:abc-DEF"));
        assert_eq!(publication.num_citations, 42);
        assert_eq!(publication.cites_id, vec!["555"]);
        assert_eq!(publication.bib.pub_year.as_deref(), Some("2020"));
        assert_eq!(publication.bib.citation.as_deref(), Some("Nature 12, 2020"));
        assert_eq!(publication.source, PublicationSource::AuthorPublicationEntry);
        Ok(())
    }

    #[test]
    fn test_apply_detail_page() -> Result<()> {
        let html = r#"<html><body>
<div id="gsc_oci_title"><a class="gsc_oci_title_link" href="https://example.org/p">Paper title</a></div>
<div class="gs_scl"><div class="gsc_oci_field">Authors</div><div class="gsc_oci_value">A Author, B Author</div></div>
<div class="gs_scl"><div class="gsc_oci_field">Publication date</div><div class="gsc_oci_value">2019/5/1</div></div>
<div class="gs_scl"><div class="gsc_oci_field">Journal</div><div class="gsc_oci_value">Nature</div></div>
<div class="gs_scl"><div class="gsc_oci_field">Issue</div><div class="gsc_oci_value">7</div></div>
<div class="gs_scl"><div class="gsc_oci_field">Description</div><div class="gsc_oci_value">Abstract We show things.</div></div>
<div class="gs_scl"><div class="gsc_oci_field">Total citations</div><div class="gsc_oci_value"><a href="/scholar?oi=bibs&amp;cites=9,10">Cited by 17</a></div></div>
<div class="gs_scl"><div class="gsc_oci_field">Scholar articles</div><div class="gsc_oci_value"><a href="https://scholar.google.com/scholar?q=related:X:scholar.google.com/">Related articles</a></div></div>
<span class="gsc_oci_g_t">2019</span><span class="gsc_oci_g_t">2020</span><span class="gsc_oci_g_t">2021</span>
<a class="gsc_oci_g_a" href="/scholar?as_ylo=2019&amp;as_yhi=2019"><span class="gsc_oci_g_al">5</span></a>
<a class="gsc_oci_g_a" href="/scholar?as_ylo=2021&amp;as_yhi=2021"><span class="gsc_oci_g_al">12</span></a>
</body></html>"#;
        let mut publication = Publication::new(PublicationSource::AuthorPublicationEntry);
        apply_detail_page(html, &mut publication)?;

        assert_eq!(publication.title(), "Paper title");
        assert_eq!(publication.pub_url.as_deref(), Some("https://example.org/p"));
        assert_eq!(publication.bib.author, vec!["A Author", "B Author"]);
        assert_eq!(publication.bib.pub_year.as_deref(), Some("2019"));
        assert_eq!(publication.bib.journal.as_deref(), Some("Nature"));
        assert_eq!(publication.bib.number.as_deref(), Some("7"));
        assert_eq!(publication.bib.abstract_text.as_deref(), Some("We show things."));
        assert_eq!(publication.cites_id, vec!["9", "10"]);
        assert_eq!(publication.citedby_url.as_deref(), Some("/scholar?hl=en&cites=9,10"));
        assert_eq!(publication.num_citations, 17);
        assert_eq!(
            publication.url_related_articles.as_deref(),
            Some("/scholar?q=related:X:scholar.google.com/")
        );
        assert_eq!(publication.cites_per_year.get(&2019), Some(&5));
        assert_eq!(publication.cites_per_year.get(&2020), Some(&0));
        assert_eq!(publication.cites_per_year.get(&2021), Some(&12));
        Ok(())
    }
}
