//! Robots.txt parser implementation
//!
//! Groups are formed by consecutive `User-agent` lines. Within a group,
//! `Allow` rules are checked before `Disallow` rules, so an allow always wins
//! over a disallow that also matches.

/// A `User-agent` group and its rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsGroup {
    /// Agent tokens as written in the file
    pub agents: Vec<String>,
    pub allow: Vec<String>,
    pub disallow: Vec<String>,
    /// Parsed but not enforced
    pub crawl_delay: Option<f64>,
}

impl RobotsGroup {
    fn is_wildcard(&self) -> bool {
        self.agents.iter().any(|agent| agent == "*")
    }

    /// Returns the agent token that matches the user agent, if any
    fn matching_agent(&self, full: &str, product: &str) -> Option<&str> {
        self.agents
            .iter()
            .find(|agent| {
                agent.as_str() != "*"
                    && (agent.eq_ignore_ascii_case(full) || agent.eq_ignore_ascii_case(product))
            })
            .map(String::as_str)
    }

    /// Checks a path against this group's rules
    fn allows(&self, path: &str) -> bool {
        if self.allow.iter().any(|pattern| path_matches(path, pattern)) {
            return true;
        }
        !self
            .disallow
            .iter()
            .any(|pattern| path_matches(path, pattern))
    }
}

/// Outcome of a robots.txt check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotsDecision {
    pub allowed: bool,
    /// Agent token of the group that decided, `None` when no group applied
    pub matched_group: Option<String>,
}

impl RobotsDecision {
    fn allow_by_default() -> Self {
        Self {
            allowed: true,
            matched_group: None,
        }
    }
}

/// Parsed robots.txt file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsTxt {
    groups: Vec<RobotsGroup>,
}

impl RobotsTxt {
    /// Parses robots.txt content
    ///
    /// Unknown directives and malformed lines are skipped. Rules that appear
    /// before the first `User-agent` line are ignored.
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    ///
    /// # Returns
    ///
    /// The parsed rule groups, in file order
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<RobotsGroup> = Vec::new();
        let mut current: Option<RobotsGroup> = None;
        let mut last_was_agent = false;

        for raw in content.lines() {
            let line = match raw.split_once('#') {
                Some((before, _)) => before.trim(),
                None => raw.trim(),
            };
            if line.is_empty() {
                continue;
            }

            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if last_was_agent {
                        if let Some(group) = current.as_mut() {
                            group.agents.push(value.to_string());
                        }
                    } else {
                        if let Some(group) = current.take() {
                            groups.push(group);
                        }
                        current = Some(RobotsGroup {
                            agents: vec![value.to_string()],
                            ..RobotsGroup::default()
                        });
                    }
                    last_was_agent = true;
                }
                "allow" => {
                    if let Some(group) = current.as_mut() {
                        group.allow.push(value.to_string());
                    }
                    last_was_agent = false;
                }
                "disallow" => {
                    if let Some(group) = current.as_mut() {
                        group.disallow.push(value.to_string());
                    }
                    last_was_agent = false;
                }
                "crawl-delay" => {
                    if let Some(group) = current.as_mut() {
                        group.crawl_delay = value.parse::<f64>().ok();
                    }
                    last_was_agent = false;
                }
                _ => {
                    last_was_agent = false;
                }
            }
        }

        if let Some(group) = current {
            groups.push(group);
        }

        Self { groups }
    }

    /// Returns the parsed groups
    pub fn groups(&self) -> &[RobotsGroup] {
        &self.groups
    }

    /// Selects the groups that apply to a user agent
    ///
    /// Groups naming the agent (full string or product token) win over `*`
    /// groups. Each selected group is paired with the agent token that
    /// selected it.
    fn select(&self, user_agent: &str) -> Vec<(&RobotsGroup, String)> {
        let full = user_agent.trim();
        let product = full.split('/').next().unwrap_or(full).trim();

        let specific: Vec<(&RobotsGroup, String)> = self
            .groups
            .iter()
            .filter_map(|group| {
                group
                    .matching_agent(full, product)
                    .map(|agent| (group, agent.to_string()))
            })
            .collect();

        if !specific.is_empty() {
            return specific;
        }

        self.groups
            .iter()
            .filter(|group| group.is_wildcard())
            .map(|group| (group, "*".to_string()))
            .collect()
    }

    /// Checks whether a path may be fetched by a user agent
    ///
    /// # Arguments
    ///
    /// * `path` - The URL path to check (e.g., "/products/1")
    /// * `user_agent` - The full user agent string
    pub fn check(&self, path: &str, user_agent: &str) -> RobotsDecision {
        let selected = self.select(user_agent);

        let Some((_, first_agent)) = selected.first() else {
            return RobotsDecision::allow_by_default();
        };

        for (group, agent) in &selected {
            if group.allows(path) {
                return RobotsDecision {
                    allowed: true,
                    matched_group: Some(agent.clone()),
                };
            }
        }

        RobotsDecision {
            allowed: false,
            matched_group: Some(first_agent.clone()),
        }
    }

    /// Gets the crawl delay declared for a user agent, in seconds
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        self.select(user_agent)
            .into_iter()
            .find_map(|(group, _)| group.crawl_delay)
    }
}

/// Prefix match used for both Allow and Disallow patterns
///
/// An empty pattern matches nothing. Otherwise the path must start with the
/// pattern and either equal it, or the pattern ends in `/`, or the path
/// continues with `/` right after the pattern.
pub fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() || !path.starts_with(pattern) {
        return false;
    }

    path.len() == pattern.len()
        || pattern.ends_with('/')
        || path[pattern.len()..].starts_with('/')
}
