//! Small helpers over `scraper` shared by the record parsers.

use crate::error::{Result, ScholarError};
use regex::Regex;
use scraper::{ElementRef, Selector};

/// Compile a CSS selector
pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScholarError::Parse(format!("Bad selector '{}': {}", css, e)))
}

/// Compile a regular expression
pub fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| ScholarError::Parse(e.to_string()))
}

/// Concatenated text of an element, trimmed
pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text of the first match of `sel` under `element`
pub fn first_text(element: ElementRef<'_>, sel: &Selector) -> Option<String> {
    element.select(sel).next().map(text_of)
}

/// Attribute of the first match of `sel` under `element`
pub fn first_attr(element: ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    element
        .select(sel)
        .next()
        .and_then(|e| e.value().attr(attr))
        .map(String::from)
}

/// Text of `element` without the subtrees carrying any of `skip_classes`
pub fn text_without(element: ElementRef<'_>, skip_classes: &[&str]) -> String {
    fn walk(element: ElementRef<'_>, skip: &[&str], out: &mut String) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                out.push_str(text);
            } else if let Some(el) = ElementRef::wrap(child) {
                if el.value().classes().any(|c| skip.contains(&c)) {
                    continue;
                }
                walk(el, skip, out);
            }
        }
    }

    let mut out = String::new();
    walk(element, skip_classes, &mut out);
    out.trim().to_string()
}

/// First run of digits in `text`
pub fn first_number(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Count with thousands separators (`1,234`, `1.234`, `1 234`, `1'234`)
pub fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | '\'') && !c.is_whitespace())
        .collect();
    digits.parse().ok()
}

/// Strip a leading "Abstract" label
pub fn strip_abstract_label(text: &str) -> String {
    let text = text.trim();
    match text.get(..8) {
        Some(head) if head.eq_ignore_ascii_case("abstract") => text[8..].trim().to_string(),
        _ => text.to_string(),
    }
}
