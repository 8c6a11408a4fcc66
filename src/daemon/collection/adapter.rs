use std::collections::HashMap;

use tracing::debug;

use crate::{
    browser_api::{HostSignal, TabId, TabSnapshot, WindowId},
    daemon::tracking::{domain::resolve_domain, TrackerInput},
};

#[derive(Debug, Clone)]
struct MirroredTab {
    window_id: WindowId,
    url: Option<String>,
}

/// Translates browser signals into [TrackerInput]s. The adapter keeps a mirror of the open tabs
/// and of the selected tab of every window, so it can always tell which page is focused and
/// which pages are open.
#[derive(Debug, Default)]
pub struct EventAdapter {
    tabs: HashMap<TabId, MirroredTab>,
    selected: HashMap<WindowId, TabId>,
    focused_window: Option<WindowId>,
}

impl EventAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, signal: HostSignal) -> Vec<TrackerInput> {
        match signal {
            HostSignal::TabActivated { tab_id, window_id } => {
                self.tabs.entry(tab_id).or_insert(MirroredTab {
                    window_id,
                    url: None,
                });
                self.selected.insert(window_id, tab_id);
                // Only a focus change moves focus, a tab can be selected while the browser is in
                // the background.
                if self.focused_window == Some(window_id) {
                    vec![self.resolve_focused()]
                } else {
                    debug!("Tab {tab_id} selected in unfocused window {window_id}");
                    vec![]
                }
            }
            HostSignal::TabUpdated {
                tab_id,
                window_id,
                url,
            } => {
                let tab = self.tabs.entry(tab_id).or_insert(MirroredTab {
                    window_id,
                    url: None,
                });
                tab.window_id = window_id;
                let url_changed = url.is_some() && tab.url != url;
                if url.is_some() {
                    tab.url = url;
                }

                // The tab set goes first so the new domain of the focused tab is already known.
                let mut inputs = vec![self.live_tabs()];
                if url_changed && self.focused_tab_id() == Some(tab_id) {
                    inputs.push(self.resolve_focused());
                }
                inputs
            }
            HostSignal::TabRemoved { tab_id } => {
                self.tabs.remove(&tab_id);
                self.selected.retain(|_, selected| *selected != tab_id);
                vec![self.live_tabs()]
            }
            HostSignal::WindowFocusChanged { window_id: None } => {
                self.focused_window = None;
                vec![TrackerInput::Release]
            }
            HostSignal::WindowFocusChanged {
                window_id: Some(window_id),
            } => {
                self.focused_window = Some(window_id);
                vec![self.resolve_focused()]
            }
            HostSignal::Snapshot {
                tabs,
                focused_window_id,
            } => {
                self.replace_tabs(tabs);
                self.focused_window = focused_window_id;
                vec![self.live_tabs(), self.resolve_focused()]
            }
        }
    }

    fn replace_tabs(&mut self, tabs: Vec<TabSnapshot>) {
        self.tabs.clear();
        self.selected.clear();
        for tab in tabs {
            if tab.active {
                self.selected.insert(tab.window_id, tab.id);
            }
            self.tabs.insert(
                tab.id,
                MirroredTab {
                    window_id: tab.window_id,
                    url: tab.url,
                },
            );
        }
    }

    fn focused_tab_id(&self) -> Option<TabId> {
        self.focused_window
            .and_then(|window| self.selected.get(&window))
            .copied()
    }

    fn live_tabs(&self) -> TrackerInput {
        let mut urls = self
            .tabs
            .values()
            .filter_map(|tab| tab.url.clone())
            .collect::<Vec<_>>();
        urls.sort();
        TrackerInput::TabsetChanged(urls)
    }

    /// Attend the domain of the focused tab, or release if there is none.
    fn resolve_focused(&self) -> TrackerInput {
        let url = self
            .focused_tab_id()
            .and_then(|id| self.tabs.get(&id))
            .and_then(|tab| tab.url.as_deref());
        match url.and_then(resolve_domain) {
            Some(domain) => TrackerInput::Attend(domain),
            None => {
                debug!("Focused page {url:?} has no domain");
                TrackerInput::Release
            }
        }
    }
}
