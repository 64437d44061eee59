//! Author search results and profile filling.

use crate::error::Result;
use crate::html::{first_attr, first_number, first_text, parse_count, regex, selector, text_of};
use crate::navigator::{Navigator, DEFAULT_SCHOLAR_URL};
use crate::pagination::{Listing, ParsedPage};
use crate::publication::parse_author_entry;
use crate::types::{
    Author, AuthorSection, AuthorSortBy, AuthorSource, CitesPerYear, Organization, PublicAccess,
};
use scraper::{ElementRef, Html};
use tracing::{debug, info, warn};

/// Publications requested per profile page
pub const PUBLICATION_PAGE_SIZE: usize = 100;

const NEXT_BUTTON: &str = ".gs_btnPR.gs_in_ib.gs_btn_half.gs_btn_lsb.gs_btn_srt.gsc_pgn_pnx";

fn scholar_id(href: &str) -> Result<Option<String>> {
    let re = regex(r"user=([\w-]*)")?;
    Ok(re
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string()))
}

fn sort_query(sort_by: AuthorSortBy) -> &'static str {
    match sort_by {
        AuthorSortBy::CitedBy => "",
        AuthorSortBy::Year => "&view_op=list_works&sortby=pubdate",
    }
}

/// Listing over author search result pages
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorListing;

impl Listing for AuthorListing {
    type Item = Author;

    fn parse_page(&self, html: &str) -> Result<ParsedPage<Author>> {
        let doc = Html::parse_document(html);
        let mut rows = Vec::new();
        for row in doc.select(&selector(".gsc_1usr")?) {
            rows.push(parse_author_snippet(row)?);
        }
        debug!(authors = rows.len(), "Parsed author rows");

        let next = match doc.select(&selector(NEXT_BUTTON)?).next() {
            Some(button) if button.value().attr("disabled").is_none() => {
                match button.value().attr("onclick") {
                    Some(onclick) => next_page_target(onclick)?,
                    None => None,
                }
            }
            _ => None,
        };

        Ok(ParsedPage {
            rows,
            next,
            total_results: 0,
        })
    }
}

/// Target inside `window.location='...'`, with `\xNN` and percent escapes decoded
fn next_page_target(onclick: &str) -> Result<Option<String>> {
    let re = regex(r"window\.location='([^']*)'")?;
    let Some(raw) = re.captures(onclick).and_then(|caps| caps.get(1)) else {
        return Ok(None);
    };
    let unescaped = decode_hex_escapes(raw.as_str());
    let decoded = urlencoding::decode(&unescaped)
        .map(|s| s.into_owned())
        .unwrap_or(unescaped);
    Ok(Some(decoded))
}

fn decode_hex_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find("\\x") {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 2..];
        match after
            .get(..2)
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            Some(byte) => {
                out.push(char::from(byte));
                rest = &after[2..];
            }
            None => {
                out.push_str("\\x");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Elements of `tag` under `row` whose class mentions `fragment`
fn tagged<'a>(row: ElementRef<'a>, tag: &str, fragment: &str) -> Result<Vec<ElementRef<'a>>> {
    let sel = selector(tag)?;
    Ok(row
        .select(&sel)
        .filter(|e| e.value().attr("class").is_some_and(|c| c.contains(fragment)))
        .collect())
}

/// Parse one `.gsc_1usr` search result
pub fn parse_author_snippet(row: ElementRef<'_>) -> Result<Author> {
    let id = match first_attr(row, &selector("a")?, "href") {
        Some(href) => scholar_id(&href)?.unwrap_or_default(),
        None => String::new(),
    };
    let mut author = Author::new(id, AuthorSource::SearchAuthorSnippets);
    author.url_picture = Some(format!(
        "{}/citations?view_op=medium_photo&user={}",
        DEFAULT_SCHOLAR_URL, author.scholar_id
    ));

    if let Some(name) = tagged(row, "h3", "name")?.first() {
        author.name = Some(text_of(*name));
    }
    if let Some(aff) = tagged(row, "div", "aff")?.first() {
        let text = text_of(*aff);
        if !text.is_empty() {
            author.affiliation = Some(text);
        }
    }
    if let Some(eml) = tagged(row, "div", "eml")?.first() {
        let text = text_of(*eml);
        if !text.is_empty() {
            author.email_domain = Some(text.replace("Verified email at ", "@"));
        }
    }
    author.interests = tagged(row, "a", "one_int")?
        .into_iter()
        .map(text_of)
        .collect();
    if let Some(cby) = tagged(row, "div", "cby")?.first() {
        author.citedby = first_number(&text_of(*cby));
    }
    Ok(author)
}

/// Institutions from the author search auto-complete block
pub fn parse_organizations(html: &str) -> Result<Vec<Organization>> {
    let doc = Html::parse_document(html);
    let link = selector("a")?;
    let mut orgs = Vec::new();
    for row in doc.select(&selector(".gsc_inst_res")?) {
        let Some(a) = row.select(&link).next() else {
            continue;
        };
        let id = a
            .value()
            .attr("href")
            .and_then(|href| href.split("org=").nth(1))
            .map(|id| id.split('&').next().unwrap_or(id).to_string());
        if let Some(id) = id {
            orgs.push(Organization {
                name: text_of(a),
                id,
            });
        }
    }
    if !orgs.is_empty() {
        info!(count = orgs.len(), "Found institutions");
    }
    Ok(orgs)
}

type SectionHandler = fn(&Html, &mut Author) -> Result<()>;

const SECTION_HANDLERS: &[(AuthorSection, SectionHandler)] = &[
    (AuthorSection::Basics, fill_basics),
    (AuthorSection::Indices, fill_indices),
    (AuthorSection::Counts, fill_counts),
    (AuthorSection::Coauthors, fill_coauthors),
    (AuthorSection::PublicAccess, fill_public_access),
    (AuthorSection::Publications, append_publications),
];

fn handler_for(section: AuthorSection) -> Option<SectionHandler> {
    SECTION_HANDLERS
        .iter()
        .find(|(s, _)| *s == section)
        .map(|(_, handler)| *handler)
}

fn fill_basics(doc: &Html, author: &mut Author) -> Result<()> {
    let root = doc.root_element();
    if let Some(name) = first_text(root, &selector("#gsc_prf_in")?) {
        author.name = Some(name);
    }

    if author.source == AuthorSource::AuthorProfilePage {
        if let Some(src) = first_attr(root, &selector("#gsc_prf_pup-img")?, "src") {
            if !src.contains("avatar_scholar") {
                author.url_picture = Some(src);
            }
        }
    }

    if let Some(aff) = doc.select(&selector(".gsc_prf_il")?).next() {
        author.affiliation = Some(text_of(aff));
        if let Some(href) = first_attr(aff, &selector("a")?, "href") {
            let org = regex(r"org=(\d+)")?;
            author.organization = org
                .captures(&href)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok());
        }
    }

    author.interests = doc
        .select(&selector(".gsc_prf_inta")?)
        .map(text_of)
        .collect();

    if let Some(email) = doc.select(&selector("#gsc_prf_ivh.gsc_prf_il")?).next() {
        let text = text_of(email);
        if author.source == AuthorSource::AuthorProfilePage && text != "No verified email" {
            if let Some(domain) = text.split(' ').nth(3) {
                author.email_domain = Some(format!("@{}", domain));
            }
        }
        if let Some(homepage) = first_attr(email, &selector("a.gsc_prf_ila")?, "href") {
            author.homepage = Some(homepage);
        }
    }

    if let Some(cited) = first_text(root, &selector(".gsc_rsb_std")?) {
        author.citedby = Some(cited.parse().unwrap_or(0));
    }
    Ok(())
}

fn fill_indices(doc: &Html, author: &mut Author) -> Result<()> {
    let values: Vec<u64> = doc
        .select(&selector(".gsc_rsb_std")?)
        .map(|e| text_of(e).parse().unwrap_or(0))
        .collect();
    if values.len() >= 6 {
        author.citedby = Some(values[0]);
        author.citedby5y = Some(values[1]);
        author.hindex = Some(values[2]);
        author.hindex5y = Some(values[3]);
        author.i10index = Some(values[4]);
        author.i10index5y = Some(values[5]);
    } else {
        author.hindex = Some(0);
        author.hindex5y = Some(0);
        author.i10index = Some(0);
        author.i10index5y = Some(0);
    }
    Ok(())
}

/// Histogram bars carry `z-index:N`, counted from the most recent year
fn fill_counts(doc: &Html, author: &mut Author) -> Result<()> {
    let years: Vec<i32> = doc
        .select(&selector(".gsc_g_t")?)
        .filter_map(|e| text_of(e).parse().ok())
        .collect();
    let mut cites = vec![0u64; years.len()];

    let z_index = regex(r"z-index:(\d+)")?;
    let label = selector(".gsc_g_al")?;
    for bar in doc.select(&selector(".gsc_g_a")?) {
        let Some(i) = bar
            .value()
            .attr("style")
            .and_then(|style| z_index.captures(style))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
        else {
            continue;
        };
        if i == 0 || i > cites.len() {
            continue;
        }
        let count = first_text(bar, &label).and_then(|t| t.parse().ok()).unwrap_or(0);
        let slot = cites.len() - i;
        cites[slot] = count;
    }

    author.cites_per_year = years.into_iter().zip(cites).collect::<CitesPerYear>();
    Ok(())
}

fn fill_public_access(doc: &Html, author: &mut Author) -> Result<()> {
    let leading_count = |css: &str| -> Result<u64> {
        Ok(first_text(doc.root_element(), &selector(css)?)
            .and_then(|t| t.split(' ').next().and_then(parse_count))
            .unwrap_or(0))
    };
    author.public_access = Some(PublicAccess {
        available: leading_count(".gsc_rsb_m_a")?,
        not_available: leading_count(".gsc_rsb_m_na")?,
    });
    Ok(())
}

fn fill_coauthors(doc: &Html, author: &mut Author) -> Result<()> {
    let link = selector("a")?;
    let ext = selector(".gsc_rsb_a_ext")?;
    author.coauthors.clear();
    for desc in doc.select(&selector(".gsc_rsb_a_desc")?) {
        let Some(a) = desc.select(&link).next() else {
            continue;
        };
        let Some(id) = a.value().attr("href").map(scholar_id).transpose()?.flatten() else {
            continue;
        };
        let mut coauthor = Author::new(id, AuthorSource::CoAuthorsList);
        let name = text_of(a);
        if !name.is_empty() {
            coauthor.name = Some(name);
        }
        coauthor.affiliation = first_text(desc, &ext);
        author.coauthors.push(coauthor);
    }
    Ok(())
}

fn append_publications(doc: &Html, author: &mut Author) -> Result<()> {
    for row in doc.select(&selector(".gsc_a_tr")?) {
        author.publications.push(parse_author_entry(row)?);
    }
    Ok(())
}

fn has_more_publications(doc: &Html) -> Result<bool> {
    Ok(doc
        .select(&selector("#gsc_bpf_more")?)
        .next()
        .is_some_and(|button| button.value().attr("disabled").is_none()))
}

/// Cap the publication list; true once the cap is hit
fn apply_limit(author: &mut Author, limit: usize) -> bool {
    if limit > 0 && author.publications.len() >= limit {
        author.publications.truncate(limit);
        return true;
    }
    false
}

/// Apply the first profile page. Returns whether more publication pages follow.
fn apply_profile(
    body: &str,
    author: &mut Author,
    pending: &[AuthorSection],
    publication_limit: usize,
) -> Result<bool> {
    let doc = Html::parse_document(body);

    let canonical = doc
        .select(&selector(r#"link[rel="canonical"]"#)?)
        .next()
        .and_then(|l| l.value().attr("href"))
        .map(scholar_id)
        .transpose()?
        .flatten();
    if let Some(id) = canonical {
        if !id.is_empty() && id != author.scholar_id {
            warn!(from = %author.scholar_id, to = %id, "Changing scholar_id following redirect");
            author.scholar_id = id;
        }
    }

    let mut more = false;
    for &section in pending {
        let Some(handler) = handler_for(section) else {
            continue;
        };
        if section == AuthorSection::Publications {
            author.publications.clear();
            handler(&doc, author)?;
            let rows_seen = !author.publications.is_empty();
            more = rows_seen && !apply_limit(author, publication_limit) && has_more_publications(&doc)?;
        } else {
            handler(&doc, author)?;
            author.mark_filled(section);
        }
    }
    Ok(more)
}

/// Apply a follow-up publication page. Returns whether more pages follow.
fn apply_publication_page(body: &str, author: &mut Author, publication_limit: usize) -> Result<bool> {
    let doc = Html::parse_document(body);
    let before = author.publications.len();
    append_publications(&doc, author)?;
    if author.publications.len() == before {
        return Ok(false);
    }
    Ok(!apply_limit(author, publication_limit) && has_more_publications(&doc)?)
}

/// Fill `sections` of `author` (all sections when empty).
///
/// Sections already in `author.filled` are skipped. `publication_limit`
/// of 0 means no limit.
pub async fn fill_author(
    nav: &Navigator,
    author: &mut Author,
    sections: &[AuthorSection],
    sort_by: AuthorSortBy,
    publication_limit: usize,
) -> Result<()> {
    let wanted: &[AuthorSection] = if sections.is_empty() {
        &AuthorSection::ALL
    } else {
        sections
    };
    let mut pending: Vec<AuthorSection> = Vec::new();
    for &section in wanted {
        if !author.is_filled(section) && !pending.contains(&section) {
            pending.push(section);
        }
    }
    if pending.is_empty() {
        debug!(id = %author.scholar_id, "Author already filled");
        return Ok(());
    }

    info!(id = %author.scholar_id, sections = ?pending, "Filling author");
    let url = format!(
        "/citations?hl=en&user={}{}&pagesize={}",
        author.scholar_id,
        sort_query(sort_by),
        PUBLICATION_PAGE_SIZE
    );
    let body = nav.fetch(&url).await?;
    let mut more = apply_profile(&body, author, &pending, publication_limit)?;

    let mut start = 0;
    while more {
        start += PUBLICATION_PAGE_SIZE;
        debug!(id = %author.scholar_id, cstart = start, "Loading more publications");
        let url = format!(
            "/citations?hl=en&user={}{}&cstart={}&pagesize={}",
            author.scholar_id,
            sort_query(sort_by),
            start,
            PUBLICATION_PAGE_SIZE
        );
        let body = nav.fetch(&url).await?;
        more = apply_publication_page(&body, author, publication_limit)?;
    }

    if pending.contains(&AuthorSection::Publications) {
        author.mark_filled(AuthorSection::Publications);
    }
    Ok(())
}
