//! robots.txt consultation for the public site.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::config::Config;
use crate::http::{HttpRequest, HttpTransport};

/// Product token matched against `User-agent` lines.
const ROBOTS_AGENT_TOKEN: &str = "uniassets";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlPermission {
    Allowed,
    Disallowed,
    /// The site was not consulted because the operator opted out of the policy.
    Overridden,
}

impl CrawlPermission {
    pub fn permits_requests(self) -> bool {
        !matches!(self, Self::Disallowed)
    }
}

#[derive(Debug, Default)]
struct RobotsGroup {
    agents: Vec<String>,
    disallows_root: bool,
}

pub struct CrawlPolicy {
    transport: Arc<dyn HttpTransport>,
    robots_url: String,
    probe_timeout: Duration,
    ignore_robots: bool,
}

impl CrawlPolicy {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self {
            transport,
            robots_url: format!("{}/robots.txt", config.source.site_root),
            probe_timeout: config.probe_timeout(),
            ignore_robots: config.scrape.ignore_robots,
        }
    }

    /// Fetches robots.txt for the site root. Unreachable or non-200 documents allow crawling.
    pub fn check(&self) -> CrawlPermission {
        if self.ignore_robots {
            return CrawlPermission::Overridden;
        }
        let request = HttpRequest::get(&self.robots_url, self.probe_timeout);
        match self.transport.send(&request) {
            Ok(response) if response.status == 200 => {
                if Self::disallows_site_root(&response.text(), ROBOTS_AGENT_TOKEN) {
                    CrawlPermission::Disallowed
                } else {
                    CrawlPermission::Allowed
                }
            }
            Ok(response) => {
                debug!(
                    "{} returned HTTP {}, treating as allowed",
                    self.robots_url, response.status
                );
                CrawlPermission::Allowed
            }
            Err(failure) => {
                warn!(
                    "Could not read {} ({}), treating as allowed",
                    self.robots_url, failure
                );
                CrawlPermission::Allowed
            }
        }
    }

    fn parse_groups(robots_txt: &str) -> Vec<RobotsGroup> {
        let mut groups: Vec<RobotsGroup> = Vec::new();
        let mut collecting_agents = false;
        for raw_line in robots_txt.lines() {
            let line = raw_line.split('#').next().unwrap_or_default().trim();
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let field = field.trim().to_ascii_lowercase();
            let value = value.trim();
            match field.as_str() {
                "user-agent" => {
                    if !collecting_agents {
                        groups.push(RobotsGroup::default());
                        collecting_agents = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                "disallow" => {
                    collecting_agents = false;
                    if value == "/" {
                        if let Some(group) = groups.last_mut() {
                            group.disallows_root = true;
                        }
                    }
                }
                _ => collecting_agents = false,
            }
        }
        groups
    }

    /// True when the group that applies to `agent_token` contains `Disallow: /`.
    ///
    /// A group naming the agent explicitly takes precedence over `*` groups.
    pub fn disallows_site_root(robots_txt: &str, agent_token: &str) -> bool {
        let agent_token = agent_token.to_ascii_lowercase();
        let groups = Self::parse_groups(robots_txt);
        let specific: Vec<&RobotsGroup> = groups
            .iter()
            .filter(|group| {
                group.agents.iter().any(|agent| {
                    agent != "*" && !agent.is_empty() && agent_token.contains(agent.as_str())
                })
            })
            .collect();
        if !specific.is_empty() {
            return specific.iter().any(|group| group.disallows_root);
        }
        groups
            .iter()
            .filter(|group| group.agents.iter().any(|agent| agent == "*"))
            .any(|group| group.disallows_root)
    }
}
