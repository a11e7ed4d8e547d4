use serde::{Deserialize, Serialize};

/// A tab as reported by the browser. Tabs mid-navigation or on privileged
/// pages may lack an id or url.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTab {
    #[serde(default)]
    pub id: Option<i64>,
    pub window_id: i64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pinned: bool,
}

/// Normalized tab included in a snapshot report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: i64,
    pub window_id: i64,
    pub url: String,
    pub title: String,
    pub active: bool,
    pub pinned: bool,
}

/// Keep tabs having both an id and a url, in input order. Missing titles
/// become empty strings.
pub fn to_tab_info_list(tabs: &[RawTab]) -> Vec<TabInfo> {
    tabs.iter()
        .filter_map(|t| {
            let id = t.id?;
            let url = t.url.clone()?;
            Some(TabInfo {
                id,
                window_id: t.window_id,
                url,
                title: t.title.clone().unwrap_or_default(),
                active: t.active,
                pinned: t.pinned,
            })
        })
        .collect()
}
