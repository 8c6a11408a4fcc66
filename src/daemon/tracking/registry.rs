use std::collections::BTreeSet;

use tracing::debug;

use super::domain::resolve_domain;

/// Domains that appeared or disappeared during a [ActiveTabRegistry::refresh].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TabsetDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Set of domains that have at least one open tab, regardless of which tab is focused.
#[derive(Debug, Default)]
pub struct ActiveTabRegistry {
    domains: BTreeSet<String>,
}

impl ActiveTabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes the set from urls of all open tabs. Pages without a domain are skipped.
    pub fn refresh<I, S>(&mut self, live_tab_urls: I) -> TabsetDiff
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next = live_tab_urls
            .into_iter()
            .filter_map(|url| resolve_domain(url.as_ref()))
            .collect::<BTreeSet<_>>();

        let diff = TabsetDiff {
            added: next.difference(&self.domains).cloned().collect(),
            removed: self.domains.difference(&next).cloned().collect(),
        };
        if !diff.added.is_empty() || !diff.removed.is_empty() {
            debug!("Tab set changed {:?}", diff);
        }

        self.domains = next;
        diff
    }

    /// Provisionally adds a domain that the host is about to open. The next refresh decides
    /// whether it stays.
    pub fn admit(&mut self, domain: &str) {
        self.domains.insert(domain.to_owned());
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    /// Sorted domains with open tabs.
    pub fn domains(&self) -> Vec<String> {
        self.domains.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ActiveTabRegistry, TabsetDiff};

    #[test]
    fn test_refresh_diffs_against_previous_set() {
        let mut registry = ActiveTabRegistry::new();
        let diff = registry.refresh([
            "https://a.com/1",
            "https://a.com/2",
            "https://b.com",
            "chrome://newtab",
        ]);
        assert_eq!(
            diff,
            TabsetDiff {
                added: vec!["a.com".into(), "b.com".into()],
                removed: vec![],
            }
        );
        assert_eq!(registry.domains(), vec!["a.com", "b.com"]);

        let diff = registry.refresh(["https://b.com", "https://c.com"]);
        assert_eq!(
            diff,
            TabsetDiff {
                added: vec!["c.com".into()],
                removed: vec!["a.com".into()],
            }
        );
        assert!(!registry.contains("a.com"));
        assert!(registry.contains("c.com"));
    }

    #[test]
    fn test_admitted_domain_is_dropped_by_refresh() {
        let mut registry = ActiveTabRegistry::new();
        registry.admit("a.com");
        assert!(registry.contains("a.com"));

        let diff = registry.refresh(Vec::<String>::new());
        assert_eq!(diff.removed, vec!["a.com".to_string()]);
        assert!(!registry.contains("a.com"));
    }
}
