// src/parsing/toplist.rs

//! Toplist page → gallery summaries and rank entries.
//!
//! A listing page has two header rows followed by up to fifty data rows.
//! Each data row is five cells: rank/points, category, thumbnail block,
//! name/tags, uploader.

use scraper::{ElementRef, Html};

use super::{capture, pattern, selector, text_of};
use crate::error::Result;
use crate::models::{GallerySummary, PeriodType, RankEntry, ToplistExtract};
use crate::utils::today_utc;
use crate::utils::url::resolve;

/// Header rows preceding the data rows.
const HEADER_ROWS: usize = 2;

/// Data rows on a full page.
pub const ROWS_PER_PAGE: usize = 50;

const CELLS_PER_ROW: usize = 5;

/// Parse one toplist page.
///
/// `list_date` defaults to today's UTC date. Rows that fail validation are
/// logged and skipped; every kept row yields exactly one summary and one
/// rank entry.
pub fn parse_toplist(
    html: &str,
    period_type: PeriodType,
    list_date: Option<&str>,
    base_url: &str,
) -> Result<ToplistExtract> {
    let list_date = list_date.map(str::to_string).unwrap_or_else(today_utc);
    let parser = RowParser::new(base_url)?;
    let document = Html::parse_document(html);
    let row_sel = selector("tr")?;

    let mut extract = ToplistExtract::default();
    for (offset, row) in document
        .select(&row_sel)
        .skip(HEADER_ROWS)
        .take(ROWS_PER_PAGE)
        .enumerate()
    {
        let Some((gallery, rank)) = parser.parse_row(row, period_type, &list_date) else {
            log::debug!("Row {} of {period_type} toplist has no data cells", offset + 1);
            continue;
        };

        if let Err(e) = gallery.validate().and_then(|_| rank.validate()) {
            log::warn!("Skipping toplist row {}: {e}", offset + 1);
            continue;
        }

        extract.galleries.push(gallery);
        extract.rank_entries.push(rank);
    }

    Ok(extract)
}

/// Compiled selectors and patterns for one page.
struct RowParser {
    base_url: String,
    cell: scraper::Selector,
    para: scraper::Selector,
    div: scraper::Selector,
    img: scraper::Selector,
    link: scraper::Selector,
    posted: scraper::Selector,
    popup: scraper::Selector,
    tag: scraper::Selector,
    gid: regex::Regex,
    token: regex::Regex,
    pages_label: regex::Regex,
    number: regex::Regex,
}

impl RowParser {
    fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            cell: selector("td")?,
            para: selector("p")?,
            div: selector("div")?,
            img: selector("img")?,
            link: selector("a")?,
            posted: selector(r#"[id^="posted_"]"#)?,
            popup: selector(r#"[onclick*="gid="]"#)?,
            tag: selector("div.gt")?,
            gid: pattern(r"gid=(\d+)")?,
            token: pattern(r"&t=([0-9a-f]+)")?,
            pages_label: pattern(r"(?i)\bpages?\b")?,
            number: pattern(r"(\d+)")?,
        })
    }

    fn parse_row(
        &self,
        row: ElementRef<'_>,
        period_type: PeriodType,
        list_date: &str,
    ) -> Option<(GallerySummary, RankEntry)> {
        let cells: Vec<ElementRef<'_>> = row.select(&self.cell).collect();
        if cells.len() < CELLS_PER_ROW {
            return None;
        }
        let (score, category, thumb, name, owner) =
            (cells[0], cells[1], cells[2], cells[3], cells[4]);

        let paras: Vec<String> = score.select(&self.para).map(text_of).collect();
        let rank = paras.first().map(|p| parse_rank(p)).unwrap_or(0);
        let points = paras.get(1).map(|p| parse_points(p)).unwrap_or(0);

        let gallery_type = category.select(&self.div).next().map(text_of).unwrap_or_default();

        let image = thumb.select(&self.img).next();
        let gallery_name = image
            .and_then(|img| img.value().attr("alt"))
            .unwrap_or_default()
            .trim()
            .to_string();
        let preview_url = image
            .and_then(|img| img.value().attr("src"))
            .unwrap_or_default()
            .to_string();

        let published_time = thumb
            .select(&self.posted)
            .next()
            .map(text_of)
            .and_then(|t| t.split_whitespace().next().map(str::to_string))
            .unwrap_or_default();

        // first integer run of the innermost div that mentions pages
        let gallery_length = thumb
            .select(&self.div)
            .filter(|div| div.children().filter_map(ElementRef::wrap).next().is_none())
            .map(text_of)
            .find(|t| self.pages_label.is_match(t))
            .and_then(|t| capture(&self.number, &t).and_then(|n| n.parse::<i64>().ok()))
            .unwrap_or(0);

        let onclick = thumb
            .select(&self.popup)
            .next()
            .and_then(|el| el.value().attr("onclick"))
            .unwrap_or_default();
        let gallery_id: i64 = capture(&self.gid, onclick)
            .and_then(|id| id.parse().ok())
            .unwrap_or(0);
        let torrent_token = capture(&self.token, onclick).unwrap_or_default();
        let torrents_url = format!(
            "{}/gallerytorrents.php?gid={gallery_id}&t={torrent_token}",
            self.base_url
        );

        let gallery_url = name
            .select(&self.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve(&self.base_url, href))
            .unwrap_or_default();
        let tags = name
            .select(&self.tag)
            .map(text_of)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(super::tags::TAG_SEPARATOR);

        let uploader = owner.select(&self.link).next().map(text_of).unwrap_or_default();

        let gallery = GallerySummary {
            gallery_id,
            gallery_name,
            gallery_type,
            tags,
            published_time,
            uploader,
            gallery_length,
            points,
            preview_url,
            torrents_url,
            gallery_url,
        };
        let entry = RankEntry {
            gallery_id,
            rank,
            list_date: list_date.to_string(),
            period_type,
        };
        Some((gallery, entry))
    }
}

/// `"#7"` → 7. Unparseable text yields 0, which fails validation.
fn parse_rank(text: &str) -> i64 {
    text.trim()
        .strip_prefix('#')
        .unwrap_or(text.trim())
        .parse()
        .unwrap_or(0)
}

/// `"1,234"` → 1234.
fn parse_points(text: &str) -> i64 {
    text.trim().replace(',', "").parse().unwrap_or(0)
}
