//! Record types produced by the parsers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Citation counts keyed by year
pub type CitesPerYear = BTreeMap<i32, u64>;

/// Where a publication record was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublicationSource {
    PublicationSearchSnippet,
    AuthorPublicationEntry,
    JournalCitationList,
}

/// Where an author record was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorSource {
    AuthorProfilePage,
    SearchAuthorSnippets,
    CoAuthorsList,
}

/// Bibliographic fields of a publication
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BibEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
}

/// A publication, either a search snippet or an author profile entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub bib: BibEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsrank: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author_id: Vec<String>,
    #[serde(default)]
    pub num_citations: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cites_id: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citedby_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cites_per_year: CitesPerYear,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_pub_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eprint_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_add_sclib: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_related_articles: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_scholarbib: Option<String>,
    pub filled: bool,
    pub source: PublicationSource,
}

impl Publication {
    pub fn new(source: PublicationSource) -> Self {
        Self {
            bib: BibEntry::default(),
            gsrank: None,
            author_id: Vec::new(),
            num_citations: 0,
            cites_id: Vec::new(),
            citedby_url: None,
            cites_per_year: CitesPerYear::new(),
            author_pub_id: None,
            eprint_url: None,
            pub_url: None,
            url_add_sclib: None,
            url_related_articles: None,
            url_scholarbib: None,
            filled: false,
            source,
        }
    }

    /// Title or an empty string
    pub fn title(&self) -> &str {
        self.bib.title.as_deref().unwrap_or("")
    }
}

/// Open-access mandate compliance counts of an author
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAccess {
    pub available: u64,
    pub not_available: u64,
}

/// Parts of an author profile that can be filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorSection {
    Basics,
    Indices,
    Counts,
    Coauthors,
    PublicAccess,
    Publications,
}

impl AuthorSection {
    pub const ALL: [AuthorSection; 6] = [
        AuthorSection::Basics,
        AuthorSection::Indices,
        AuthorSection::Counts,
        AuthorSection::Coauthors,
        AuthorSection::PublicAccess,
        AuthorSection::Publications,
    ];
}

/// Sort order of the publications on an author profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorSortBy {
    #[default]
    CitedBy,
    Year,
}

/// A Scholar author profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub scholar_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citedby: Option<u64>,
    #[serde(default)]
    pub filled: Vec<AuthorSection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citedby5y: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hindex: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hindex5y: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub i10index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub i10index5y: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cites_per_year: CitesPerYear,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_access: Option<PublicAccess>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publications: Vec<Publication>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coauthors: Vec<Author>,
    pub source: AuthorSource,
}

impl Author {
    pub fn new(scholar_id: impl Into<String>, source: AuthorSource) -> Self {
        Self {
            scholar_id: scholar_id.into(),
            name: None,
            affiliation: None,
            organization: None,
            email_domain: None,
            url_picture: None,
            homepage: None,
            citedby: None,
            filled: Vec::new(),
            interests: Vec::new(),
            citedby5y: None,
            hindex: None,
            hindex5y: None,
            i10index: None,
            i10index5y: None,
            cites_per_year: CitesPerYear::new(),
            public_access: None,
            publications: Vec::new(),
            coauthors: Vec::new(),
            source,
        }
    }

    pub fn is_filled(&self, section: AuthorSection) -> bool {
        self.filled.contains(&section)
    }

    pub(crate) fn mark_filled(&mut self, section: AuthorSection) {
        if !self.is_filled(section) {
            self.filled.push(section);
        }
    }
}

/// Organization suggestion from the author search auto-complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(rename = "Organization")]
    pub name: String,
    pub id: String,
}
