//! robots.txt rules and a per-host cache of them.

use reqwest::Url;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

/// The rules of one robots.txt that apply to a single user agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    rules: Vec<Rule>,
    disallow_all: bool,
}

impl RobotsRules {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn disallow_all() -> Self {
        Self {
            rules: Vec::new(),
            disallow_all: true,
        }
    }

    /// Parse `body` and keep the group for `agent`, or the `*` group when no
    /// group names it.
    pub fn parse(body: &str, agent: &str) -> Self {
        let agent = agent.to_ascii_lowercase();
        let mut specific: Option<Vec<Rule>> = None;
        let mut wildcard: Option<Vec<Rule>> = None;

        // Agents of the group being read, and whether its rules have started
        let mut group_agents: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut current: Vec<Rule> = Vec::new();

        let mut flush = |agents: &[String], rules: &mut Vec<Rule>| {
            for name in agents {
                if name == "*" {
                    wildcard.get_or_insert_with(Vec::new).extend(rules.iter().cloned());
                } else if !agent.is_empty() && agent.contains(name.as_str()) {
                    specific.get_or_insert_with(Vec::new).extend(rules.iter().cloned());
                }
            }
            rules.clear();
        };

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "user-agent" => {
                    if in_rules {
                        flush(&group_agents, &mut current);
                        group_agents.clear();
                        in_rules = false;
                    }
                    group_agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    // An empty Disallow allows everything
                    if !value.is_empty() {
                        current.push(Rule {
                            allow: key == "allow",
                            pattern: value.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
        flush(&group_agents, &mut current);

        Self {
            rules: specific.or(wildcard).unwrap_or_default(),
            disallow_all: false,
        }
    }

    /// Whether `path` (path plus query) may be fetched.
    ///
    /// The longest matching pattern decides; `Allow` wins a tie.
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.disallow_all {
            return false;
        }
        let mut best: Option<(usize, bool)> = None;
        for rule in &self.rules {
            if !pattern_matches(&rule.pattern, path) {
                continue;
            }
            let len = rule.pattern.len();
            best = match best {
                Some((best_len, best_allow))
                    if best_len > len || (best_len == len && best_allow) =>
                {
                    Some((best_len, best_allow))
                }
                _ => Some((len, rule.allow)),
            };
        }
        best.is_none_or(|(_, allow)| allow)
    }
}

/// Prefix match with `*` wildcards and an optional trailing `$` anchor.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return true;
    };
    let Some(mut rest) = path.strip_prefix(first) else {
        return false;
    };
    let parts: Vec<&str> = parts.collect();
    for (i, part) in parts.iter().enumerate() {
        let last = i + 1 == parts.len();
        if last && anchored {
            return rest.ends_with(part);
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    !anchored || rest.is_empty()
}

/// Product token of a user agent string: `Delve/0.3 (...)` -> `delve`.
pub fn agent_token(user_agent: &str) -> String {
    user_agent
        .split(['/', ' '])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// robots.txt rules fetched once per origin and kept for the session.
pub struct RobotsCache {
    client: reqwest::Client,
    agent: String,
    rules: Mutex<HashMap<String, Arc<RobotsRules>>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, user_agent: &str) -> Self {
        Self {
            client,
            agent: agent_token(user_agent),
            rules: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `url` may be fetched. Unparsable URLs are left to the caller.
    pub async fn can_fetch(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let origin = parsed.origin().ascii_serialization();
        let mut path = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }

        let rules = {
            let cached = self.rules.lock().await.get(&origin).cloned();
            match cached {
                Some(rules) => rules,
                None => {
                    let rules = Arc::new(self.load(&origin).await);
                    self.rules
                        .lock()
                        .await
                        .insert(origin.clone(), rules.clone());
                    rules
                }
            }
        };
        rules.is_allowed(&path)
    }

    /// Fetch and parse `<origin>/robots.txt`.
    ///
    /// 401/403 disallow the whole site; a missing file or an unreachable
    /// server allows it.
    async fn load(&self, origin: &str) -> RobotsRules {
        let robots_url = format!("{origin}/robots.txt");
        let response = match self.client.get(&robots_url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %robots_url, error = %e, "robots.txt unavailable, allowing");
                return RobotsRules::allow_all();
            }
        };
        let status = response.status().as_u16();
        match status {
            401 | 403 => RobotsRules::disallow_all(),
            s if !(200..300).contains(&s) => RobotsRules::allow_all(),
            _ => match response.text().await {
                Ok(body) => {
                    debug!(url = %robots_url, "robots.txt loaded");
                    RobotsRules::parse(&body, &self.agent)
                }
                Err(_) => RobotsRules::allow_all(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "\
# comment line
User-agent: *
Disallow: /private/
Allow: /private/press/
Disallow: /*.pdf$

User-agent: delve
User-agent: otherbot
Disallow: /search
";

    #[test]
    fn test_wildcard_group_rules() {
        let rules = RobotsRules::parse(ROBOTS, "somebot");
        assert!(rules.is_allowed("/"));
        assert!(rules.is_allowed("/articles/heat-pumps"));
        assert!(!rules.is_allowed("/private/notes"));
        assert!(rules.is_allowed("/private/press/release"));
        assert!(!rules.is_allowed("/files/report.pdf"));
        assert!(rules.is_allowed("/files/report.pdf?download=1"));
    }

    #[test]
    fn test_named_group_replaces_wildcard() {
        let rules = RobotsRules::parse(ROBOTS, "delve");
        assert!(!rules.is_allowed("/search?q=x"));
        assert!(rules.is_allowed("/private/notes"));
    }

    #[test]
    fn test_empty_disallow_allows_everything() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow:\n", "delve");
        assert!(rules.is_allowed("/anything"));
        assert!(RobotsRules::parse("", "delve").is_allowed("/"));
    }

    #[test]
    fn test_disallow_all() {
        let rules = RobotsRules::parse("User-agent: *\nDisallow: /\n", "delve");
        assert!(!rules.is_allowed("/"));
        assert!(!RobotsRules::disallow_all().is_allowed("/index.html"));
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("/a*/c", "/abc/c/d"));
        assert!(!pattern_matches("/a*/c", "/abc/d"));
        assert!(pattern_matches("/page$", "/page"));
        assert!(!pattern_matches("/page$", "/page2"));
    }

    #[test]
    fn test_agent_token() {
        assert_eq!(agent_token("Delve/0.3.0 (+research assistant)"), "delve");
        assert_eq!(agent_token("curl"), "curl");
    }
}
