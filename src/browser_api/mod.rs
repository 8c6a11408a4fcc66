//! Contract with the browser. Signals describe what happened to tabs and windows, a
//! [HostControl] performs the few actions the tracker asks of the browser.

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub type TabId = i64;
pub type WindowId = i64;

/// A tab as reported in a full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub id: TabId,
    pub window_id: WindowId,
    /// Missing while a tab is loading or when the page is not accessible.
    #[serde(default)]
    pub url: Option<String>,
    /// The tab is the selected one of its window.
    #[serde(default)]
    pub active: bool,
}

/// Lifecycle notifications delivered by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostSignal {
    /// A tab became the selected tab of its window.
    #[serde(rename_all = "camelCase")]
    TabActivated { tab_id: TabId, window_id: WindowId },
    /// A tab was created or its url changed.
    #[serde(rename_all = "camelCase")]
    TabUpdated {
        tab_id: TabId,
        window_id: WindowId,
        #[serde(default)]
        url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: TabId },
    /// [None] means no browser window has focus.
    #[serde(rename_all = "camelCase")]
    WindowFocusChanged { window_id: Option<WindowId> },
    /// Every open tab, sent when the host connects.
    #[serde(rename_all = "camelCase")]
    Snapshot {
        tabs: Vec<TabSnapshot>,
        #[serde(default)]
        focused_window_id: Option<WindowId>,
    },
}

/// Side effects requested from the browser.
#[cfg_attr(test, mockall::automock)]
pub trait HostControl {
    /// Focuses the most recently used tab of `domain`, opening one if there is none.
    fn focus_domain(&mut self, domain: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::HostSignal;

    #[test]
    fn test_signal_wire_names() {
        let signal: HostSignal =
            serde_json::from_str(r#"{"type":"tabUpdated","tabId":3,"windowId":1,"url":"https://a.com"}"#)
                .unwrap();
        assert_eq!(
            signal,
            HostSignal::TabUpdated {
                tab_id: 3,
                window_id: 1,
                url: Some("https://a.com".into())
            }
        );

        let signal: HostSignal =
            serde_json::from_str(r#"{"type":"windowFocusChanged","windowId":null}"#).unwrap();
        assert_eq!(signal, HostSignal::WindowFocusChanged { window_id: None });
    }
}
