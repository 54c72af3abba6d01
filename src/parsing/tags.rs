// src/parsing/tags.rs

//! Namespaced tag extraction and localization.

use std::collections::HashMap;

use scraper::Html;

use super::{selector, text_of};
use crate::error::Result;

/// Separator used when tags are flattened into one column.
pub const TAG_SEPARATOR: &str = ", ";

/// Namespace label → key prefix. Labels not listed pass through unchanged.
const NAMESPACE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("artist", "a"),
    ("character", "c"),
    ("cosplayer", "cos"),
    ("female", "f"),
    ("group", "g"),
    ("language", "l"),
    ("location", "loc"),
    ("male", "m"),
    ("mixed", "x"),
    ("other", "o"),
    ("parody", "p"),
    ("reclass", "r"),
    // not an official source namespace, but present in the translation feed
    ("temp", "t"),
];

/// Short prefix for a namespace label.
pub fn abbreviate_namespace(label: &str) -> &str {
    NAMESPACE_ABBREVIATIONS
        .iter()
        .find(|(full, _)| *full == label)
        .map(|(_, short)| *short)
        .unwrap_or(label)
}

/// Extract `ns:tag` strings from a detail page's tag table.
///
/// Per namespace row, primary `.gt` tags win; `.gtl` is used only when the
/// row has none, then `.gtw`.
pub fn parse_tag_block(document: &Html) -> Result<Vec<String>> {
    let row_sel = selector("#taglist table tr")?;
    let label_sel = selector("td.tc")?;
    let cell_sel = selector("td:not(.tc)")?;
    let styles = [
        selector("div.gt")?,
        selector("div.gtl")?,
        selector("div.gtw")?,
    ];
    let link_sel = selector("a")?;

    let mut tags = Vec::new();
    for row in document.select(&row_sel) {
        let label = row
            .select(&label_sel)
            .next()
            .map(text_of)
            .unwrap_or_default()
            .replacen(':', "", 1);
        let namespace = abbreviate_namespace(&label);

        let cells: Vec<_> = row.select(&cell_sel).collect();
        let chosen = styles.iter().find_map(|style| {
            let divs: Vec<_> = cells.iter().flat_map(|c| c.select(style)).collect();
            (!divs.is_empty()).then_some(divs)
        });

        for div in chosen.unwrap_or_default() {
            let tag: String = div.select(&link_sel).map(text_of).collect();
            let tag = tag.trim();
            if !tag.is_empty() {
                tags.push(format!("{namespace}:{tag}"));
            }
        }
    }

    Ok(tags)
}

/// Replace each `ns:tag` with `ns:<translation>` where one is known.
///
/// Untranslated tags are kept verbatim.
pub fn translate_tags(tags: &str, translations: &HashMap<String, String>) -> String {
    tags.split(TAG_SEPARATOR)
        .map(|tag| match translations.get(tag) {
            Some(localized) => match tag.split_once(':') {
                Some((namespace, _)) if !namespace.is_empty() => {
                    format!("{namespace}:{localized}")
                }
                _ => localized.clone(),
            },
            None => tag.to_string(),
        })
        .collect::<Vec<_>>()
        .join(TAG_SEPARATOR)
}

/// Split a flattened tag column back into keys.
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(TAG_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
