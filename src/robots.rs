//! Robots-exclusion compliance: a standalone robots.txt parser plus a
//! per-domain cache that fetches each domain's rules once per session.
//! Fetch or parse failures fail open (allowed) and are remembered so the
//! cost is not paid again for the same domain.

use dashmap::DashMap;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct RobotsTxt {
    rules: HashMap<String, Vec<Rule>>,
    crawl_delays: HashMap<String, f64>,
}

#[derive(Debug, Clone)]
struct Rule {
    is_allow: bool,
    path: String,
    regex: Option<Regex>,
}

impl RobotsTxt {
    pub fn parse(content: &str) -> Self {
        let mut robots = Self {
            rules: HashMap::new(),
            crawl_delays: HashMap::new(),
        };

        let mut current_agents: Vec<String> = Vec::new();
        let mut current_rules: Vec<Rule> = Vec::new();
        let mut saw_directive = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group.
                    if saw_directive {
                        robots.commit_group(&current_agents, &current_rules);
                        current_agents.clear();
                        current_rules.clear();
                        saw_directive = false;
                    }
                    current_agents.push(value.to_ascii_lowercase());
                }
                "disallow" => {
                    saw_directive = true;
                    if !value.is_empty() {
                        current_rules.push(Rule::new(false, value));
                    }
                }
                "allow" => {
                    saw_directive = true;
                    current_rules.push(Rule::new(true, value));
                }
                "crawl-delay" => {
                    saw_directive = true;
                    if let Ok(delay) = value.split_whitespace().next().unwrap_or("").parse::<f64>()
                    {
                        for agent in &current_agents {
                            robots.crawl_delays.insert(agent.clone(), delay);
                        }
                    }
                }
                _ => {}
            }
        }

        robots.commit_group(&current_agents, &current_rules);
        robots
    }

    fn commit_group(&mut self, agents: &[String], rules: &[Rule]) {
        if rules.is_empty() {
            return;
        }
        for agent in agents {
            self.rules
                .entry(agent.clone())
                .or_default()
                .extend(rules.iter().cloned());
        }
    }

    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => self.is_path_allowed(parsed.path(), user_agent),
            Err(_) => true,
        }
    }

    /// First matching rule wins; no matching rule means allowed.
    pub fn is_path_allowed(&self, path: &str, user_agent: &str) -> bool {
        let Some(rules) = self.lookup(&self.rules, user_agent) else {
            return true;
        };

        for rule in rules {
            let matched = match &rule.regex {
                Some(regex) => regex.is_match(path),
                None => path.starts_with(&rule.path),
            };
            if matched {
                return rule.is_allow;
            }
        }
        true
    }

    /// Declared crawl-delay for this user agent, if the file specified one.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.lookup(&self.crawl_delays, user_agent)
            .map(|secs| Duration::from_secs_f64(*secs))
    }

    /// Agent-group lookup: a group matches when the configured user agent
    /// contains its token, with `*` as the fallback.
    fn lookup<'a, T>(&self, map: &'a HashMap<String, T>, user_agent: &str) -> Option<&'a T> {
        let agent_lower = user_agent.to_ascii_lowercase();
        map.iter()
            .find(|(group, _)| group.as_str() != "*" && agent_lower.contains(group.as_str()))
            .map(|(_, v)| v)
            .or_else(|| map.get("*"))
    }
}

impl Rule {
    fn new(is_allow: bool, pattern: &str) -> Self {
        Self {
            is_allow,
            path: pattern.to_string(),
            regex: Self::compile(pattern),
        }
    }

    /// robots.txt patterns support `*` wildcards and `$` end anchors; plain
    /// prefixes fall back to starts_with matching.
    fn compile(pattern: &str) -> Option<Regex> {
        if !pattern.contains('*') && !pattern.ends_with('$') {
            return None;
        }
        let mut escaped = regex::escape(pattern);
        escaped = escaped.replace("\\*", ".*");
        escaped = escaped.replace("\\$", "$");
        Regex::new(&format!("^{}", escaped)).ok()
    }
}

/// Per-domain robots cache. Entries are created on first access to a domain
/// and retained for the whole session, never invalidated mid-run.
pub struct RobotsChecker {
    user_agent: String,
    client: reqwest::Client,
    // None marks a failed fetch: fail open, don't retry this session.
    cache: DashMap<String, Option<RobotsTxt>>,
}

impl RobotsChecker {
    pub fn new(user_agent: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            user_agent,
            client,
            cache: DashMap::new(),
        }
    }

    /// Check a URL against the domain's robots rules, fetching them on
    /// first contact. Any failure to obtain rules fails open.
    pub async fn can_fetch(&self, url: &str) -> bool {
        let Some(domain) = crate::url_utils::extract_domain(url) else {
            return false;
        };

        self.ensure_loaded(&domain, url).await;

        match self.cache.get(&domain).as_deref() {
            Some(Some(robots)) => robots.is_allowed(url, &self.user_agent),
            _ => true,
        }
    }

    /// Crawl-delay declared for our user agent, if this domain's robots
    /// file has been loaded and specifies one.
    pub fn crawl_delay(&self, url: &str) -> Option<Duration> {
        let domain = crate::url_utils::extract_domain(url)?;
        match self.cache.get(&domain).as_deref() {
            Some(Some(robots)) => robots.crawl_delay(&self.user_agent),
            _ => None,
        }
    }

    async fn ensure_loaded(&self, domain: &str, url: &str) {
        if self.cache.contains_key(domain) {
            return;
        }

        let scheme = Url::parse(url)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "https".to_string());
        let robots_url = format!("{}://{}/robots.txt", scheme, domain);

        let entry = match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => {
                    tracing::info!(domain, "loaded robots.txt");
                    Some(RobotsTxt::parse(&body))
                }
                Err(e) => {
                    tracing::warn!(domain, error = %e, "failed to read robots.txt body");
                    None
                }
            },
            Ok(response) => {
                tracing::debug!(domain, status = %response.status(), "no robots.txt");
                None
            }
            Err(e) => {
                tracing::warn!(domain, error = %e, "failed to fetch robots.txt");
                None
            }
        };

        self.cache.insert(domain.to_string(), entry);
    }

    #[cfg(test)]
    pub(crate) fn preload(&self, domain: &str, robots: Option<RobotsTxt>) {
        self.cache.insert(domain.to_string(), robots);
    }
}
