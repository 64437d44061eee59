//! High-level search operations over a shared [`Navigator`].

use crate::author::{self, AuthorListing};
use crate::error::{OptionExt, Result, ScholarError};
use crate::html::{regex, selector};
use crate::navigator::{Navigator, NavigatorOptions};
use crate::pagination::PageIterator;
use crate::proxy::SessionProvider;
use crate::publication::{self, PublicationListing};
use crate::types::{Author, AuthorSection, AuthorSortBy, AuthorSource, Organization, Publication};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::info;
use url::form_urlencoded;

/// Iterator over publication search results
pub type PublicationIter = PageIterator<PublicationListing>;

/// Iterator over author search results
pub type AuthorIter = PageIterator<AuthorListing>;

/// Characters Scholar does not accept inside a label
const KEYWORD_PATTERN: &str = r"[-: #(),;]+";

/// Result ordering of a publication search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Date,
}

/// What a date-sorted search includes from the last year
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeLastYear {
    #[default]
    Abstracts,
    Everything,
}

/// Filters for publication searches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub patents: bool,
    pub citations: bool,
    pub year_low: Option<i32>,
    pub year_high: Option<i32>,
    pub sort_by: SortBy,
    pub include_last_year: IncludeLastYear,
    pub start_index: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            patents: true,
            citations: true,
            year_low: None,
            year_high: None,
            sort_by: SortBy::Relevance,
            include_last_year: IncludeLastYear::Abstracts,
            start_index: 0,
        }
    }
}

impl SearchOptions {
    fn append_to(&self, query: &mut form_urlencoded::Serializer<'_, String>) {
        if let Some(year) = self.year_low {
            query.append_pair("as_ylo", &year.to_string());
        }
        if let Some(year) = self.year_high {
            query.append_pair("as_yhi", &year.to_string());
        }
        query.append_pair("as_vis", if self.citations { "0" } else { "1" });
        query.append_pair("as_sdt", if self.patents { "0,33" } else { "1,33" });
        if self.sort_by == SortBy::Date {
            let scisbd = match self.include_last_year {
                IncludeLastYear::Abstracts => "1",
                IncludeLastYear::Everything => "2",
            };
            query.append_pair("scisbd", scisbd);
        }
        if self.start_index > 0 {
            query.append_pair("start", &self.start_index.to_string());
        }
    }
}

fn scholar_target(pairs: &[(&str, &str)], options: &SearchOptions) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("hl", "en");
    for (key, value) in pairs {
        query.append_pair(key, value);
    }
    options.append_to(&mut query);
    format!("/scholar?{}", query.finish())
}

fn author_search_target(mauthors: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("hl", "en")
        .append_pair("view_op", "search_authors")
        .append_pair("mauthors", mauthors)
        .finish();
    format!("/citations?{}", query)
}

fn keyword_label(keyword: &str) -> Result<String> {
    let re = regex(KEYWORD_PATTERN)?;
    Ok(format!("label:{}", re.replace_all(keyword, "_")))
}

static GLOBAL: OnceLock<Scholarly> = OnceLock::new();

/// Cheap-to-clone handle exposing the Scholar search operations
#[derive(Clone)]
pub struct Scholarly {
    nav: Arc<Navigator>,
}

impl Default for Scholarly {
    fn default() -> Self {
        Self::new()
    }
}

impl Scholarly {
    pub fn new() -> Self {
        Self::with_navigator(Arc::new(Navigator::new()))
    }

    pub fn with_options(options: NavigatorOptions) -> Self {
        Self::with_navigator(Arc::new(Navigator::with_options(options)))
    }

    pub fn with_navigator(nav: Arc<Navigator>) -> Self {
        Self { nav }
    }

    /// Process-wide default instance, built on first use
    pub fn global() -> &'static Scholarly {
        GLOBAL.get_or_init(Scholarly::new)
    }

    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.nav
    }

    pub fn set_timeout(&self, millis: i64) {
        self.nav.set_timeout(millis);
    }

    pub fn set_retries(&self, count: i64) -> Result<()> {
        self.nav.set_retries(count)
    }

    pub fn use_proxy(&self, primary: SessionProvider, secondary: Option<SessionProvider>) {
        self.nav.use_proxy(primary, secondary);
    }

    fn publications(&self, target: String) -> PublicationIter {
        let listing = PublicationListing::for_target(&target);
        PageIterator::new(Arc::clone(&self.nav), target, listing)
    }

    fn authors(&self, target: String) -> AuthorIter {
        PageIterator::new(Arc::clone(&self.nav), target, AuthorListing)
    }

    /// Search publications matching `query`
    pub fn search_pubs(&self, query: &str, options: &SearchOptions) -> PublicationIter {
        info!(query, "Searching publications");
        self.publications(scholar_target(&[("q", query)], options))
    }

    /// Publications citing the cluster `publication_id`
    pub fn search_citedby(&self, publication_id: &str, options: &SearchOptions) -> PublicationIter {
        self.publications(scholar_target(&[("cites", publication_id)], options))
    }

    /// First search result for `title`, optionally filled
    pub async fn search_single_pub(&self, title: &str, filled: bool) -> Result<Publication> {
        let target = scholar_target(&[("q", title)], &SearchOptions::default());
        let body = self.nav.fetch(&target).await?;
        let mut found = first_search_result(&body)?;
        if filled {
            publication::fill_publication(&self.nav, &mut found).await?;
        }
        Ok(found)
    }

    pub fn search_author(&self, name: &str) -> AuthorIter {
        info!(name, "Searching authors");
        self.authors(author_search_target(name))
    }

    /// Authors labelled with `keyword`
    pub fn search_keyword(&self, keyword: &str) -> Result<AuthorIter> {
        Ok(self.authors(author_search_target(&keyword_label(keyword)?)))
    }

    /// Authors labelled with all of `keywords`
    pub fn search_keywords(&self, keywords: &[&str]) -> Result<AuthorIter> {
        let labels = keywords
            .iter()
            .map(|k| keyword_label(k))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.authors(author_search_target(&labels.join(" "))))
    }

    /// Author profile by scholar id, with only basics unless `filled`
    pub async fn search_author_id(
        &self,
        id: &str,
        filled: bool,
        sort_by: AuthorSortBy,
        publication_limit: usize,
    ) -> Result<Author> {
        let mut found = Author::new(id, AuthorSource::AuthorProfilePage);
        let sections: &[AuthorSection] = if filled { &[] } else { &[AuthorSection::Basics] };
        author::fill_author(&self.nav, &mut found, sections, sort_by, publication_limit).await?;
        Ok(found)
    }

    pub async fn fill_author(
        &self,
        target: &mut Author,
        sections: &[AuthorSection],
        sort_by: AuthorSortBy,
        publication_limit: usize,
    ) -> Result<()> {
        author::fill_author(&self.nav, target, sections, sort_by, publication_limit).await
    }

    pub async fn fill_publication(&self, target: &mut Publication) -> Result<()> {
        publication::fill_publication(&self.nav, target).await
    }

    /// Publications citing `target`, filling it first when needed
    pub async fn citedby(&self, target: &mut Publication) -> Result<PublicationIter> {
        if !target.filled {
            self.fill_publication(target).await?;
        }
        let url = target.citedby_url.clone().ok_or_else(|| {
            ScholarError::Validation(format!("'{}' has no cited-by link", target.title()))
        })?;
        Ok(self.publications(url))
    }

    /// Articles Scholar lists as related to `target`
    pub async fn get_related_articles(&self, target: &mut Publication) -> Result<PublicationIter> {
        if target.url_related_articles.is_none()
            && target.source == crate::types::PublicationSource::AuthorPublicationEntry
        {
            self.fill_publication(target).await?;
        }
        let url = target.url_related_articles.clone().ok_or_else(|| {
            ScholarError::Validation(format!("'{}' has no related articles link", target.title()))
        })?;
        Ok(self.publications(url))
    }

    /// Institutions matching `name`
    pub async fn search_org(&self, name: &str) -> Result<Vec<Organization>> {
        let body = self.nav.fetch(&author_search_target(name)).await?;
        author::parse_organizations(&body)
    }

    pub fn search_author_by_organization(&self, org_id: u64) -> AuthorIter {
        self.authors(format!("/citations?view_op=view_org&hl=en&org={}", org_id))
    }

    /// Publication listing at a caller-supplied target
    pub fn search_pubs_custom_url(&self, target: &str) -> PublicationIter {
        self.publications(target.to_string())
    }

    /// Author listing at a caller-supplied target
    pub fn search_author_custom_url(&self, target: &str) -> AuthorIter {
        self.authors(target.to_string())
    }
}

fn first_search_result(body: &str) -> Result<Publication> {
    let doc = Html::parse_document(body);
    let publib = doc
        .select(&selector("#gs_res_glb")?)
        .next()
        .and_then(|e| e.value().attr("data-sva"))
        .unwrap_or("")
        .to_string();
    let row = doc
        .select(&selector(".gs_or")?)
        .next()
        .ok_or_parse("No publication in search results")?;
    publication::parse_search_snippet(row, &publib)
}
