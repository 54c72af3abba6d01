//! Tag translation feed payloads.

use std::collections::BTreeMap;

use serde::Deserialize;

/// "Latest release" response; only the asset list matters.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseManifest {
    #[serde(default)]
    pub tag_name: Option<String>,
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseManifest {
    /// Find an asset by exact file name.
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

/// Top-level shape of the translation asset:
/// `{ data: [{ namespace, data: { <tag>: { name } } }] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct TagDatabase {
    pub data: Vec<NamespaceBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamespaceBlock {
    pub namespace: String,
    pub data: BTreeMap<String, TagRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRecord {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_asset_lookup() {
        let manifest: ReleaseManifest = serde_json::from_str(
            r#"{
                "tag_name": "v6.1",
                "assets": [
                    {"name": "db.html.json", "browser_download_url": "https://example.org/h"},
                    {"name": "db.text.json", "browser_download_url": "https://example.org/t"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            manifest.asset("db.text.json").map(|a| a.browser_download_url.as_str()),
            Some("https://example.org/t")
        );
        assert!(manifest.asset("db.raw.json").is_none());
    }

    #[test]
    fn test_tag_database_ignores_extra_fields() {
        let db: TagDatabase = serde_json::from_str(
            r#"{
                "head": {"sha": "x"},
                "data": [
                    {"namespace": "female", "count": 1, "data": {
                        "glasses": {"name": "眼镜", "intro": "", "links": ""}
                    }}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(db.data[0].data["glasses"].name, "眼镜");
    }
}
