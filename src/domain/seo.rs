//! SEO helpers: slugs, legacy URL redirects and the sitemap.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

const MAX_SLUG_LEN: usize = 80;

/// Filler words dropped from slugs, compared after transliteration.
const STOPWORDS: &[&str] = &[
    "ve", "ile", "icin", "bir", "bu", "da", "de", "veya", "ya", "gibi",
    "the", "and", "or", "of", "for", "a", "an", "with",
];

pub const PRODUCT_PREFIX: &str = "/urun";
pub const CATEGORY_PREFIX: &str = "/kategori";

fn transliterate(c: char) -> Option<&'static str> {
    Some(match c {
        'ç' | 'Ç' => "c",
        'ğ' | 'Ğ' => "g",
        'ı' | 'İ' | 'î' | 'Î' | 'í' | 'Í' | 'ì' | 'Ì' | 'ï' | 'Ï' => "i",
        'ö' | 'Ö' | 'ó' | 'Ó' | 'ò' | 'Ò' | 'ô' | 'Ô' | 'õ' | 'Õ' => "o",
        'ş' | 'Ş' => "s",
        'ü' | 'Ü' | 'û' | 'Û' | 'ú' | 'Ú' | 'ù' | 'Ù' => "u",
        'â' | 'Â' | 'á' | 'Á' | 'à' | 'À' | 'ä' | 'Ä' | 'ã' | 'Ã' | 'å' | 'Å' => "a",
        'é' | 'É' | 'è' | 'È' | 'ê' | 'Ê' | 'ë' | 'Ë' => "e",
        'ñ' | 'Ñ' => "n",
        'ß' => "ss",
        _ => return None,
    })
}

fn tokens(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in input.chars() {
        if let Some(mapped) = transliterate(c) {
            current.push_str(mapped);
        } else if c.is_ascii_alphanumeric() {
            current.push(c.to_ascii_lowercase());
        } else if c == '\u{307}' {
            // combining dot left behind by a lowercased 'İ'
        } else if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Builds a URL slug from free text.
///
/// Turkish letters are transliterated, filler words dropped (unless nothing
/// else remains) and adjacent repeated words collapsed.
pub fn slugify(input: &str) -> String {
    let all = tokens(input);
    let meaningful: Vec<&String> = all.iter().filter(|t| !STOPWORDS.contains(&t.as_str())).collect();
    let chosen: Vec<&String> = if meaningful.is_empty() { all.iter().collect() } else { meaningful };

    let mut slug = String::new();
    let mut last: Option<&str> = None;
    for token in chosen {
        if last == Some(token.as_str()) {
            continue;
        }
        let extra = if slug.is_empty() { token.len() } else { token.len() + 1 };
        if slug.len() + extra > MAX_SLUG_LEN {
            if slug.is_empty() {
                slug.extend(token.chars().take(MAX_SLUG_LEN));
            }
            break;
        }
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(token);
        last = Some(token.as_str());
    }
    slug
}

/// Slug for `text`, or `fallback` slugified when the text has no usable characters.
pub fn slug_or(text: &str, fallback: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() { slugify(fallback) } else { slug }
}

/// Appends `-2`, `-3`, ... until the slug is not in `taken`.
pub fn unique_slug(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

pub fn product_path(slug: &str) -> String { format!("{PRODUCT_PREFIX}/{slug}") }
pub fn category_path(slug: &str) -> String { format!("{CATEGORY_PREFIX}/{slug}") }

/// Old query-parameter URLs still linked from search engines and ads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyTarget {
    ProductById(String),
    CategoryById(String),
    CategoryByName(String),
}

pub fn parse_legacy(path: &str, query: &HashMap<String, String>) -> Option<LegacyTarget> {
    let path = path.trim_end_matches('/');
    let param = |key: &str| query.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string);
    match path {
        "/product" | "/urun" => param("id").map(LegacyTarget::ProductById),
        "/category" | "/kategori" => param("id")
            .map(LegacyTarget::CategoryById)
            .or_else(|| param("name").or_else(|| param("cat")).map(LegacyTarget::CategoryByName)),
        _ => path
            .strip_prefix("/products/")
            .filter(|id| !id.is_empty() && !id.contains('/'))
            .map(|id| LegacyTarget::ProductById(id.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct SitemapEntry {
    pub path: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub priority: &'static str,
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn render_sitemap(base_url: &str, entries: &[SitemapEntry]) -> String {
    let base = base_url.trim_end_matches('/');
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n");
    for entry in entries {
        xml.push_str("  <url>\n");
        let _ = writeln!(xml, "    <loc>{}</loc>", escape_xml(&format!("{base}{}", entry.path)));
        if let Some(ts) = entry.last_modified {
            let _ = writeln!(xml, "    <lastmod>{}</lastmod>", ts.format("%Y-%m-%d"));
        }
        let _ = writeln!(xml, "    <priority>{}</priority>", entry.priority);
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}
