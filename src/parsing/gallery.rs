// src/parsing/gallery.rs

//! Gallery detail page → enrichment attributes.

use scraper::{ElementRef, Html};

use super::{capture, pattern, parse_tag_block, selector, text_of};
use crate::error::Result;
use crate::models::GalleryDetails;
use crate::parsing::tags::TAG_SEPARATOR;

/// Link text that marks the torrent popup.
const TORRENT_LINK_PREFIX: &str = "Torrent Download";

/// Uploader block text when the gallery has no owner.
const DISOWNED: &str = "(Disowned)";

/// Extract every enrichment attribute the page offers.
///
/// Missing attributes come back as `None`; a page without tags is logged
/// but is not an error.
pub fn parse_gallery_details(html: &str, gallery_id: i64) -> Result<GalleryDetails> {
    let document = Html::parse_document(html);

    let tags = parse_tag_block(&document)?;
    let tags = if tags.is_empty() {
        log::error!("No tags found for gallery {gallery_id}");
        None
    } else {
        Some(tags.join(TAG_SEPARATOR))
    };

    Ok(GalleryDetails {
        tags,
        gallery_type: parse_gallery_type(&document)?,
        published_time: labeled_value(&document, "Posted:")?
            .map(|v| v.chars().take(10).collect()),
        uploader: parse_uploader(&document)?,
        gallery_length: parse_gallery_length(&document)?,
        torrents_url: parse_torrents_url(&document)?,
        preview_url: parse_preview_url(&document)?,
    })
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn parse_gallery_type(document: &Html) -> Result<Option<String>> {
    let sel = selector("#gdc > div")?;
    Ok(document.select(&sel).next().map(text_of).and_then(non_empty))
}

/// Value cell next to a `td.gdt1` label such as `Posted:` or `Length:`.
fn labeled_value(document: &Html, label: &str) -> Result<Option<String>> {
    let label_sel = selector("td.gdt1")?;
    let mut value = None;
    for td in document.select(&label_sel) {
        if text_of(td) != label {
            continue;
        }
        let next = td
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "td" && el.value().classes().any(|c| c == "gdt2"));
        if let Some(cell) = next {
            value = non_empty(text_of(cell));
        }
    }
    Ok(value)
}

fn parse_uploader(document: &Html) -> Result<Option<String>> {
    let gdn = selector("#gdn")?;
    let link = selector("a")?;
    let Some(block) = document.select(&gdn).next() else {
        return Ok(None);
    };
    if text_of(block) == DISOWNED {
        return Ok(None);
    }
    Ok(block.select(&link).next().map(text_of).and_then(non_empty))
}

/// First integer run of the value, `"345 pages"` → 345.
fn parse_gallery_length(document: &Html) -> Result<Option<i64>> {
    let number = pattern(r"(\d+)")?;
    Ok(labeled_value(document, "Length:")?
        .and_then(|v| capture(&number, &v).and_then(|n| n.parse().ok())))
}

/// URL inside the `onclick` popup of the torrent link, with `&amp;` undone.
fn parse_torrents_url(document: &Html) -> Result<Option<String>> {
    let link_sel = selector("a")?;
    let url_re = pattern(r"https?://[^']+")?;

    let Some(link) = document
        .select(&link_sel)
        .find(|a| text_of(*a).starts_with(TORRENT_LINK_PREFIX))
    else {
        return Ok(None);
    };

    Ok(link
        .value()
        .attr("onclick")
        .and_then(|onclick| url_re.find(onclick))
        .map(|m| m.as_str().replace("&amp;", "&")))
}

/// Cover image from the `url(...)` in the cover div's inline style.
fn parse_preview_url(document: &Html) -> Result<Option<String>> {
    let cover_sel = selector("#gleft #gd1 > div")?;
    let url_re = pattern(r"url\(([^)]+)\)")?;

    Ok(document
        .select(&cover_sel)
        .next()
        .and_then(|div| div.value().attr("style"))
        .and_then(|style| capture(&url_re, style))
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r##"
    <html><body>
      <div id="gleft">
        <div id="gd1"><div style="width:250px; height:354px; background:transparent url(https://ehgt.org/w/01/370/52871-unblcotr.webp) 0 0 no-repeat"></div></div>
      </div>
      <div id="gd3">
        <div id="gdc"><div class="cs ct2">Doujinshi</div></div>
        <div id="gdn"><a href="https://e-hentai.org/uploader/alice">alice</a>&nbsp; <a href="https://e-hentai.org/?f_uploader=alice">[Search]</a></div>
        <div id="gdd"><table>
          <tr><td class="gdt1">Posted:</td><td class="gdt2">2024-03-09 12:34</td></tr>
          <tr><td class="gdt1">Language:</td><td class="gdt2">Chinese</td></tr>
          <tr><td class="gdt1">Length:</td><td class="gdt2">345 pages</td></tr>
        </table></div>
      </div>
      <div id="gd5">
        <p class="g2"><a href="#" onclick="return popUp('https://e-hentai.org/gallerytorrents.php?gid=2735599&amp;t=6996b4bce6',610,590)">Torrent Download (2)</a></p>
      </div>
      <div id="taglist"><table>
        <tr><td class="tc">language:</td><td><div class="gt"><a>chinese</a></div></td></tr>
        <tr><td class="tc">female:</td><td><div class="gt"><a>glasses</a></div></td></tr>
      </table></div>
    </body></html>
    "##;

    #[test]
    fn test_parses_full_detail_page() {
        let details = parse_gallery_details(DETAIL, 2735599).unwrap();
        assert_eq!(details.gallery_type.as_deref(), Some("Doujinshi"));
        assert_eq!(details.published_time.as_deref(), Some("2024-03-09"));
        assert_eq!(details.uploader.as_deref(), Some("alice"));
        assert_eq!(details.gallery_length, Some(345));
        assert_eq!(
            details.torrents_url.as_deref(),
            Some("https://e-hentai.org/gallerytorrents.php?gid=2735599&t=6996b4bce6")
        );
        assert_eq!(
            details.preview_url.as_deref(),
            Some("https://ehgt.org/w/01/370/52871-unblcotr.webp")
        );
        assert_eq!(details.tags.as_deref(), Some("l:chinese, f:glasses"));
        assert!(details.validate().is_ok());
    }

    #[test]
    fn test_disowned_uploader_is_none() {
        let html = r#"<div id="gdn">(Disowned)</div>"#;
        let details = parse_gallery_details(html, 1).unwrap();
        assert_eq!(details.uploader, None);
    }

    #[test]
    fn test_sparse_page_yields_nones() {
        let details = parse_gallery_details("<html><body></body></html>", 508505).unwrap();
        assert_eq!(details, GalleryDetails::default());
    }

    #[test]
    fn test_length_takes_first_integer() {
        let html = r#"<table><tr><td class="gdt1">Length:</td><td class="gdt2">1 page</td></tr></table>"#;
        let details = parse_gallery_details(html, 1).unwrap();
        assert_eq!(details.gallery_length, Some(1));

        let html = r#"<table><tr><td class="gdt1">Length:</td><td class="gdt2">about 889 pages</td></tr></table>"#;
        let details = parse_gallery_details(html, 1).unwrap();
        assert_eq!(details.gallery_length, Some(889));
    }
}
