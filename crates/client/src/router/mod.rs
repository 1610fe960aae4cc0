//! Request classification through an ordered rule table.
//!
//! Rules are evaluated top to bottom and the first match wins:
//!
//! 1. non-GET: pass through
//! 2. live API host: pass through (any method)
//! 3. font host: cache-first, `fonts-cache`
//! 4. document path: stale-while-revalidate, `docs-cache`
//! 5. other cross-origin: pass through
//! 6. navigation: network-only, offline page on failure
//! 7. static asset extension: cache-first, `static-{version}`, placeholder on failure
//! 8. everything else: network-first, `static-{version}`
//!
//! Passing through means the request goes to the network untouched and no
//! partition is read or written.

pub mod assets;

use tidecache_core::{AppConfig, Error, PartitionRole, Request};
use url::Url;

use crate::fetch::is_same_origin;
use crate::strategy::{ExecOptions, Fallback, Strategy};

/// Predicate half of a routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    NonGet,
    ApiHost,
    FontHost,
    DocumentPath,
    CrossOrigin,
    Navigation,
    StaticExtension,
    Any,
}

/// What a matching rule does with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Passthrough,
    Execute { strategy: Strategy, options: ExecOptions },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    pub name: &'static str,
    pub matcher: Matcher,
    pub action: RuleAction,
}

/// Outcome of classifying one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub rule: &'static str,
    pub action: RuleAction,
}

impl Route {
    pub fn is_passthrough(&self) -> bool {
        matches!(self.action, RuleAction::Passthrough)
    }
}

/// Inputs the matchers consult.
#[derive(Debug, Clone)]
struct RouteContext {
    origin: Url,
    api_hosts: Vec<String>,
    font_hosts: Vec<String>,
    document_paths: Vec<String>,
}

/// Host pattern match: exact, or `*.suffix` for any subdomain of `suffix`.
pub fn host_matches(host: &str, pattern: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => host.ends_with(&format!(".{suffix}")),
        None => host == pattern,
    }
}

impl Matcher {
    fn matches(self, request: &Request, ctx: &RouteContext) -> bool {
        let host = request.url.host_str().unwrap_or_default();
        match self {
            Matcher::NonGet => !request.is_get(),
            Matcher::ApiHost => ctx.api_hosts.iter().any(|p| host_matches(host, p)),
            Matcher::FontHost => ctx.font_hosts.iter().any(|p| host_matches(host, p)),
            Matcher::DocumentPath => ctx.document_paths.iter().any(|prefix| request.url.path().starts_with(prefix)),
            Matcher::CrossOrigin => !is_same_origin(&request.url, &ctx.origin),
            Matcher::Navigation => request.is_navigation(),
            Matcher::StaticExtension => assets::is_static_asset(request.url.path()),
            Matcher::Any => true,
        }
    }
}

/// The default rule table.
pub fn default_rules() -> Vec<RoutingRule> {
    vec![
        RoutingRule { name: "non-get", matcher: Matcher::NonGet, action: RuleAction::Passthrough },
        RoutingRule { name: "api-bypass", matcher: Matcher::ApiHost, action: RuleAction::Passthrough },
        RoutingRule {
            name: "fonts",
            matcher: Matcher::FontHost,
            action: RuleAction::Execute {
                strategy: Strategy::CacheFirst(PartitionRole::Fonts),
                options: ExecOptions::default(),
            },
        },
        RoutingRule {
            name: "documents",
            matcher: Matcher::DocumentPath,
            action: RuleAction::Execute {
                strategy: Strategy::StaleWhileRevalidate(PartitionRole::Documents),
                options: ExecOptions::default(),
            },
        },
        RoutingRule { name: "cross-origin", matcher: Matcher::CrossOrigin, action: RuleAction::Passthrough },
        RoutingRule {
            name: "navigation",
            matcher: Matcher::Navigation,
            action: RuleAction::Execute {
                strategy: Strategy::NetworkOnly,
                options: ExecOptions { fallback: Some(Fallback::OfflinePage), server_errors_as_failure: false },
            },
        },
        RoutingRule {
            name: "static-assets",
            matcher: Matcher::StaticExtension,
            action: RuleAction::Execute {
                strategy: Strategy::CacheFirst(PartitionRole::Static),
                options: ExecOptions { fallback: Some(Fallback::Placeholder), server_errors_as_failure: false },
            },
        },
        RoutingRule {
            name: "default",
            matcher: Matcher::Any,
            action: RuleAction::Execute {
                strategy: Strategy::NetworkFirst(PartitionRole::Static),
                options: ExecOptions { fallback: None, server_errors_as_failure: true },
            },
        },
    ]
}

/// Classifies intercepted requests.
#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<RoutingRule>,
    ctx: RouteContext,
}

impl Router {
    /// Build a router with the default rule table.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Self::with_rules(config, default_rules())
    }

    /// Build a router with a custom rule table.
    pub fn with_rules(config: &AppConfig, rules: Vec<RoutingRule>) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;
        let ctx = RouteContext {
            origin,
            api_hosts: config.api_hosts.clone(),
            font_hosts: config.font_hosts.clone(),
            document_paths: config.document_paths.clone(),
        };
        Ok(Self { rules, ctx })
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn origin(&self) -> &Url {
        &self.ctx.origin
    }

    /// First matching rule wins. With no match the request passes through.
    pub fn classify(&self, request: &Request) -> Route {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(request, &self.ctx))
            .map(|rule| Route { rule: rule.name, action: rule.action })
            .unwrap_or(Route { rule: "unmatched", action: RuleAction::Passthrough })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        let config = AppConfig {
            origin: "https://app.example.com".into(),
            api_hosts: vec!["api.example.com".into(), "*.supabase.co".into()],
            ..Default::default()
        };
        Router::from_config(&config).unwrap()
    }

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    fn strategy_of(route: Route) -> Option<Strategy> {
        match route.action {
            RuleAction::Execute { strategy, .. } => Some(strategy),
            RuleAction::Passthrough => None,
        }
    }

    #[test]
    fn test_host_matches() {
        assert!(host_matches("api.example.com", "api.example.com"));
        assert!(host_matches("xyz.supabase.co", "*.supabase.co"));
        assert!(!host_matches("supabase.co", "*.supabase.co"));
        assert!(!host_matches("evilsupabase.co", "*.supabase.co"));
        assert!(!host_matches("api.example.com.evil", "api.example.com"));
    }

    #[test]
    fn test_non_get_never_intercepted() {
        let r = router();
        for method in ["POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"] {
            for url in [
                "https://app.example.com/app.js",
                "https://app.example.com/storage/a.pdf",
                "https://fonts.gstatic.com/inter.woff2",
                "https://app.example.com/",
            ] {
                let route = r.classify(&get(url).with_method(method));
                assert!(route.is_passthrough(), "{method} {url}");
                assert_eq!(route.rule, "non-get");
            }
        }
    }

    #[test]
    fn test_api_hosts_bypassed() {
        let r = router();
        for url in [
            "https://api.example.com/users",
            "https://api.example.com/storage/file.pdf",
            "https://proj.supabase.co/rest/v1/items.js",
            "https://proj.supabase.co/storage/v1/object/x.png",
        ] {
            let route = r.classify(&get(url));
            assert!(route.is_passthrough(), "{url}");
            assert_eq!(route.rule, "api-bypass");
        }
    }

    #[test]
    fn test_fonts_cache_first() {
        let route = router().classify(&get("https://fonts.googleapis.com/css2?family=Inter"));
        assert_eq!(route.rule, "fonts");
        assert_eq!(strategy_of(route), Some(Strategy::CacheFirst(PartitionRole::Fonts)));
    }

    #[test]
    fn test_documents_stale_while_revalidate() {
        let route = router().classify(&get("https://app.example.com/storage/file1.pdf"));
        assert_eq!(route.rule, "documents");
        assert_eq!(strategy_of(route), Some(Strategy::StaleWhileRevalidate(PartitionRole::Documents)));
    }

    #[test]
    fn test_other_cross_origin_passthrough() {
        let route = router().classify(&get("https://cdn.other.com/lib.js"));
        assert!(route.is_passthrough());
        assert_eq!(route.rule, "cross-origin");
    }

    #[test]
    fn test_navigation_network_only_with_offline_page() {
        let route = router().classify(&Request::navigate(Url::parse("https://app.example.com/dashboard").unwrap()));
        assert_eq!(route.rule, "navigation");
        match route.action {
            RuleAction::Execute { strategy, options } => {
                assert_eq!(strategy, Strategy::NetworkOnly);
                assert_eq!(options.fallback, Some(Fallback::OfflinePage));
            }
            RuleAction::Passthrough => panic!("navigation must be handled"),
        }
    }

    #[test]
    fn test_static_assets_cache_first_with_placeholder() {
        let route = router().classify(&get("https://app.example.com/img/logo.png"));
        assert_eq!(route.rule, "static-assets");
        match route.action {
            RuleAction::Execute { strategy, options } => {
                assert_eq!(strategy, Strategy::CacheFirst(PartitionRole::Static));
                assert_eq!(options.fallback, Some(Fallback::Placeholder));
            }
            RuleAction::Passthrough => panic!("static asset must be handled"),
        }
    }

    #[test]
    fn test_default_network_first() {
        let route = router().classify(&get("https://app.example.com/manifest.json"));
        assert_eq!(route.rule, "default");
        assert_eq!(strategy_of(route), Some(Strategy::NetworkFirst(PartitionRole::Static)));
    }

    #[test]
    fn test_every_same_origin_get_matches_a_handling_rule() {
        let r = router();
        for path in ["/", "/a", "/app.js", "/storage/x", "/api/local", "/x.unknown"] {
            let route = r.classify(&get(&format!("https://app.example.com{path}")));
            assert!(!route.is_passthrough(), "{path}");
        }
    }

    #[test]
    fn test_custom_rule_table() {
        let config = AppConfig::default();
        let rules = vec![RoutingRule { name: "all-network", matcher: Matcher::Any, action: RuleAction::Passthrough }];
        let r = Router::with_rules(&config, rules).unwrap();
        assert_eq!(r.classify(&get("http://localhost:3000/app.js")).rule, "all-network");
    }

    #[test]
    fn test_empty_table_passes_through() {
        let r = Router::with_rules(&AppConfig::default(), Vec::new()).unwrap();
        let route = r.classify(&get("http://localhost:3000/app.js"));
        assert!(route.is_passthrough());
        assert_eq!(route.rule, "unmatched");
    }
}
