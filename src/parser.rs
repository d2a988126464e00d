use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ParseError;

/// One row of a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub published_date: String,
    pub detail_url: String,
    pub title: String,
    pub category: String,
}

/// A hoster link found on a detail page. Consumers refer to entries by their
/// position in the resolved list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HosterEntry {
    pub icon_ref: String,
    pub target_url: String,
}

impl HosterEntry {
    pub fn new(icon_ref: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self {
            icon_ref: icon_ref.into(),
            target_url: target_url.into(),
        }
    }

    /// Name of the locally cached icon for this hoster (`hoster_<file name>`).
    pub fn icon_file_name(&self) -> String {
        let file_name = Url::parse(&self.icon_ref)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back().map(str::to_string))
            })
            .unwrap_or_else(|| {
                let path = self.icon_ref.split(['?', '#']).next().unwrap_or_default();
                path.rsplit('/').next().unwrap_or_default().to_string()
            });

        format!("hoster_{}", file_name)
    }

    /// Host name of the target link, if it parses as a URL.
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.target_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

/// Selectors and column positions describing where records live in a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub listing_table: String,
    pub category_column: usize,
    pub link_column: usize,
    pub date_column: usize,
    pub category_prefix: String,
    pub hoster_table: String,
    pub hoster_link_cell: String,
}

impl Default for ExtractionRule {
    fn default() -> Self {
        Self {
            listing_table: "table.posts_table".to_string(),
            category_column: 0,
            link_column: 1,
            date_column: 2,
            category_prefix: "TV-".to_string(),
            hoster_table: "table#download_table".to_string(),
            hoster_link_cell: "td.td_cols".to_string(),
        }
    }
}

/// Compiled form of an [`ExtractionRule`]. Parsing is a pure function of the
/// input document.
#[derive(Debug, Clone)]
pub struct PageParser {
    rule: ExtractionRule,
    listing_table: Selector,
    hoster_table: Selector,
    hoster_link_cell: Selector,
    anchor: Selector,
    image: Selector,
}

impl PageParser {
    pub fn new(rule: ExtractionRule) -> Result<Self, ParseError> {
        Ok(Self {
            listing_table: compile(&rule.listing_table)?,
            hoster_table: compile(&rule.hoster_table)?,
            hoster_link_cell: compile(&rule.hoster_link_cell)?,
            anchor: compile("a")?,
            image: compile("img")?,
            rule,
        })
    }

    pub fn rule(&self) -> &ExtractionRule {
        &self.rule
    }

    /// Extract listing records in document order. Rows without the expected
    /// columns or anchors are skipped.
    pub fn parse_listing(&self, html: &str) -> Vec<ListingRecord> {
        let document = Html::parse_document(html);
        let mut records = Vec::new();

        for table in document.select(&self.listing_table) {
            for row in rows(table) {
                if let Some(record) = self.listing_row(row) {
                    records.push(record);
                }
            }
        }

        records
    }

    fn listing_row(&self, row: ElementRef<'_>) -> Option<ListingRecord> {
        let cells = cells(row);

        let category_anchor = cells
            .get(self.rule.category_column)?
            .select(&self.anchor)
            .next()?;
        let link_anchor = cells.get(self.rule.link_column)?.select(&self.anchor).next()?;
        let date_cell = cells.get(self.rule.date_column)?;

        let category = clean_text(category_anchor);
        let category = category
            .strip_prefix(self.rule.category_prefix.as_str())
            .unwrap_or(&category)
            .trim()
            .to_string();

        Some(ListingRecord {
            published_date: clean_text(*date_cell),
            detail_url: clean(link_anchor.value().attr("href")?),
            title: clean_text(link_anchor),
            category,
        })
    }

    /// Extract hoster entries in row order. A page without the hoster table
    /// yields an empty list.
    pub fn parse_hosters(&self, html: &str) -> Vec<HosterEntry> {
        let document = Html::parse_document(html);

        let Some(table) = document.select(&self.hoster_table).next() else {
            return Vec::new();
        };

        rows(table)
            .into_iter()
            .filter_map(|row| self.hoster_row(row))
            .collect()
    }

    fn hoster_row(&self, row: ElementRef<'_>) -> Option<HosterEntry> {
        let first_cell = cells(row).into_iter().next()?;
        let icon = first_cell.select(&self.image).next()?.value().attr("src")?;

        let link = row
            .select(&self.hoster_link_cell)
            .next()?
            .select(&self.anchor)
            .next()?
            .value()
            .attr("href")?;

        Some(HosterEntry::new(clean(icon), clean(link)))
    }
}

fn compile(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|e| ParseError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

// Direct <td> children only, so nested tables don't shift column positions
fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .collect()
}

// Rows owned by `table` itself, skipping rows of tables nested in its cells
fn rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| el.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

fn clean_text(element: ElementRef<'_>) -> String {
    clean(&element.text().collect::<String>())
}

fn clean(value: &str) -> String {
    value.replace(['\n', '\r'], "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
        <table class="posts_table">
          <tr>
            <td><a href="/cat/tv-hd">TV-HD
            </a></td>
            <td><a href="
              https://example.org/show-s01e01/">
              Show S01E01 720p
            </a></td>
            <td>
              2024-03-01 </td>
          </tr>
        </table>
        <table class="posts_table">
          <tr><td>broken row</td></tr>
          <tr>
            <td><a href="/cat/tv-sd">TV-SD</a></td>
            <td><a href="https://example.org/other/">Other Show</a></td>
            <td>2024-03-02</td>
          </tr>
        </table>
        <table class="unrelated"><tr>
          <td><a href="x">TV-X</a></td><td><a href="y">Y</a></td><td>Z</td>
        </tr></table>
        </body></html>
    "#;

    const HOSTERS: &str = r#"
        <table id="download_table">
          <tr>
            <td><img src="https://cdn.example.org/img/rapidgator.png"></td>
            <td class="td_cols"><a href="https://rapidgator.net/file/abc">link</a></td>
          </tr>
          <tr>
            <td><img src="/img/uploaded.png?v=2"></td>
            <td class="td_cols"><a href="https://uploaded.net/file/def">link</a></td>
          </tr>
          <tr>
            <td>no image here</td>
            <td class="td_cols"><a href="https://skipped.example/">link</a></td>
          </tr>
        </table>
    "#;

    fn parser() -> PageParser {
        PageParser::new(ExtractionRule::default()).unwrap()
    }

    #[test]
    fn test_listing_fields_are_cleaned() {
        let records = parser().parse_listing(LISTING);
        assert_eq!(records.len(), 2);

        assert_eq!(
            records[0],
            ListingRecord {
                published_date: "2024-03-01".to_string(),
                detail_url: "https://example.org/show-s01e01/".to_string(),
                title: "Show S01E01 720p".to_string(),
                category: "HD".to_string(),
            }
        );
        assert_eq!(records[1].category, "SD");
        assert_eq!(records[1].title, "Other Show");
    }

    #[test]
    fn test_listing_without_table_is_empty() {
        assert!(parser().parse_listing("<p>nothing</p>").is_empty());
    }

    #[test]
    fn test_hoster_rows_in_order() {
        let entries = parser().parse_hosters(HOSTERS);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].target_url, "https://rapidgator.net/file/abc");
        assert_eq!(entries[1].icon_ref, "/img/uploaded.png?v=2");
    }

    #[test]
    fn test_missing_hoster_table_is_empty() {
        assert!(parser().parse_hosters(LISTING).is_empty());
    }

    #[test]
    fn test_icon_file_name() {
        let absolute = HosterEntry::new("https://cdn.example.org/img/rapidgator.png", "x");
        assert_eq!(absolute.icon_file_name(), "hoster_rapidgator.png");

        let relative = HosterEntry::new("/img/uploaded.png?v=2", "x");
        assert_eq!(relative.icon_file_name(), "hoster_uploaded.png");
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let rule = ExtractionRule {
            listing_table: "table[".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            PageParser::new(rule),
            Err(ParseError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_nested_table_rows_are_ignored() {
        let listing = r#"
            <table class="posts_table"><tr>
              <td><a href="/cat/tv-hd">TV-HD</a></td>
              <td><a href="https://example.org/outer/">Outer</a>
                <table><tr>
                  <td><a href="/cat/tv-sd">TV-SD</a></td>
                  <td><a href="https://example.org/inner/">Inner</a></td>
                  <td>2024-01-01</td>
                </tr></table>
              </td>
              <td>2024-03-03</td>
            </tr></table>
        "#;
        let records = parser().parse_listing(listing);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Outer");

        let hosters = r#"
            <table id="download_table"><tr>
              <td><img src="/img/outer.png"></td>
              <td class="td_cols"><a href="https://outer.example/f">link</a>
                <table><tr>
                  <td><img src="/img/inner.png"></td>
                  <td class="td_cols"><a href="https://inner.example/f">link</a></td>
                </tr></table>
              </td>
            </tr></table>
        "#;
        let entries = parser().parse_hosters(hosters);
        assert_eq!(entries, vec![HosterEntry::new("/img/outer.png", "https://outer.example/f")]);
    }
}
