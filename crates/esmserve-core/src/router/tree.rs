use super::method::Method;
use super::pattern::{self, Segment};
use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A registered primary handler.
#[derive(Debug)]
struct Route<H> {
    pattern: String,
    param_names: Vec<String>,
    handler: H,
}

/// A registered filter, ordered by registration sequence.
#[derive(Debug)]
struct Filter<F> {
    seq: u64,
    filter: F,
}

#[derive(Debug)]
struct RouteNode<H, F> {
    literal: HashMap<String, RouteNode<H, F>>,
    param: Option<Box<RouteNode<H, F>>>,
    wildcard: Option<Box<RouteNode<H, F>>>,
    handlers: HashMap<Method, Route<H>>,
    before: Vec<Filter<F>>,
    after: Vec<Filter<F>>,
}

impl<H, F> Default for RouteNode<H, F> {
    fn default() -> Self {
        Self {
            literal: HashMap::new(),
            param: None,
            wildcard: None,
            handlers: HashMap::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }
}

/// Outcome of the primary-handler search below one node.
struct Found<'a, H> {
    route: &'a Route<H>,
    tail: Option<String>,
}

impl<H, F> RouteNode<H, F> {
    fn child_mut(&mut self, segment: &Segment) -> &mut Self {
        match segment {
            Segment::Literal(name) => self.literal.entry(name.clone()).or_default(),
            Segment::Param(_) => self.param.get_or_insert_with(Box::default),
            Segment::Wildcard => self.wildcard.get_or_insert_with(Box::default),
        }
    }

    fn handler_for(&self, method: Method) -> Option<&Route<H>> {
        self.handlers.get(&method).or_else(|| {
            if method == Method::Head {
                self.handlers.get(&Method::Get)
            } else {
                None
            }
        })
    }

    /// Literal first, then param, then wildcard; each alternative is only
    /// tried once the previous one failed for the whole remaining path.
    fn find<'n, 's>(
        &'n self,
        segments: &[&'s str],
        method: Method,
        captures: &mut Vec<&'s str>,
    ) -> Option<Found<'n, H>> {
        let Some((head, rest)) = segments.split_first() else {
            if let Some(route) = self.handler_for(method) {
                return Some(Found { route, tail: None });
            }
            // A trailing `**` also matches an empty remainder
            return self
                .wildcard
                .as_ref()
                .and_then(|w| w.handler_for(method))
                .map(|route| Found {
                    route,
                    tail: Some(String::new()),
                });
        };

        if let Some(child) = self.literal.get(*head) {
            if let Some(found) = child.find(rest, method, captures) {
                return Some(found);
            }
        }

        if let Some(child) = &self.param {
            captures.push(*head);
            if let Some(found) = child.find(rest, method, captures) {
                return Some(found);
            }
            captures.pop();
        }

        self.wildcard
            .as_ref()
            .and_then(|w| w.handler_for(method))
            .map(|route| Found {
                route,
                tail: Some(segments.join("/")),
            })
    }

    /// Gather the filters of every node whose pattern matches `segments`.
    fn collect_filters<'a>(
        &'a self,
        segments: &[&str],
        before: &mut Vec<&'a Filter<F>>,
        after: &mut Vec<&'a Filter<F>>,
    ) {
        if let Some(w) = &self.wildcard {
            before.extend(&w.before);
            after.extend(&w.after);
        }

        let Some((head, rest)) = segments.split_first() else {
            before.extend(&self.before);
            after.extend(&self.after);
            return;
        };

        if let Some(child) = self.literal.get(*head) {
            child.collect_filters(rest, before, after);
        }
        if let Some(child) = &self.param {
            child.collect_filters(rest, before, after);
        }
    }

    fn collect_patterns(&self, out: &mut Vec<(Method, String)>) {
        for (method, route) in &self.handlers {
            out.push((*method, route.pattern.clone()));
        }
        for child in self.literal.values() {
            child.collect_patterns(out);
        }
        if let Some(child) = &self.param {
            child.collect_patterns(out);
        }
        if let Some(child) = &self.wildcard {
            child.collect_patterns(out);
        }
    }
}

/// Route resolved for a request.
#[derive(Debug)]
pub struct ResolvedRoute<'a, H, F> {
    /// Primary handler.
    pub handler: &'a H,
    /// Pattern the handler was registered with.
    pub pattern: &'a str,
    /// `:name` bindings, percent-decoded.
    pub params: BTreeMap<String, String>,
    /// Remainder consumed by a `**` segment, if the route ends in one.
    pub tail: Option<String>,
    /// Query string parameters (last occurrence wins).
    pub query: BTreeMap<String, String>,
    /// Before-filters, in registration order.
    pub before: Vec<&'a F>,
    /// After-filters, in registration order.
    pub after: Vec<&'a F>,
}

/// Method + path router with global before/after filters.
#[derive(Debug)]
pub struct PathRouter<H, F = H> {
    root: RouteNode<H, F>,
    next_seq: u64,
}

impl<H, F> Default for PathRouter<H, F> {
    fn default() -> Self {
        Self {
            root: RouteNode::default(),
            next_seq: 0,
        }
    }
}

impl<H, F> PathRouter<H, F> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a primary handler.
    ///
    /// # Errors
    /// `InvalidPattern` for a malformed pattern, `DuplicateRoute` if the
    /// same method is already registered for a structurally equal pattern.
    pub fn register(&mut self, method: Method, pattern: &str, handler: H) -> Result<()> {
        let segments = pattern::parse(pattern)?;
        let node = self.node_for(&segments);

        if node.handlers.contains_key(&method) {
            return Err(Error::DuplicateRoute {
                method: method.to_string(),
                pattern: pattern.to_string(),
            });
        }

        let param_names = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) => Some(name.clone()),
                _ => None,
            })
            .collect();

        node.handlers.insert(
            method,
            Route {
                pattern: pattern.to_string(),
                param_names,
                handler,
            },
        );
        debug!(%method, pattern, "Registered route");
        Ok(())
    }

    /// Register a filter that runs before the primary handler.
    pub fn before(&mut self, pattern: &str, filter: F) -> Result<()> {
        let seq = self.bump_seq();
        let segments = pattern::parse(pattern)?;
        self.node_for(&segments).before.push(Filter { seq, filter });
        Ok(())
    }

    /// Register a filter that runs after the primary handler.
    pub fn after(&mut self, pattern: &str, filter: F) -> Result<()> {
        let seq = self.bump_seq();
        let segments = pattern::parse(pattern)?;
        self.node_for(&segments).after.push(Filter { seq, filter });
        Ok(())
    }

    /// Resolve a request path (optionally carrying a query string).
    ///
    /// # Errors
    /// `RouteNotFound` when no primary handler matches.
    pub fn route(&self, method: Method, path: &str) -> Result<ResolvedRoute<'_, H, F>> {
        let (path_part, query_part) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let segments: Vec<&str> = pattern::split_path(path_part).collect();

        let mut captures = Vec::new();
        let found = self
            .root
            .find(&segments, method, &mut captures)
            .ok_or_else(|| Error::RouteNotFound {
                method: method.to_string(),
                path: path_part.to_string(),
            })?;

        let params = found
            .route
            .param_names
            .iter()
            .zip(captures)
            .map(|(name, value)| {
                (
                    name.clone(),
                    percent_decode_str(value).decode_utf8_lossy().into_owned(),
                )
            })
            .collect();

        let query = query_part
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let mut before = Vec::new();
        let mut after = Vec::new();
        self.root.collect_filters(&segments, &mut before, &mut after);
        before.sort_by_key(|f| f.seq);
        after.sort_by_key(|f| f.seq);

        Ok(ResolvedRoute {
            handler: &found.route.handler,
            pattern: &found.route.pattern,
            params,
            tail: found.tail,
            query,
            before: before.into_iter().map(|f| &f.filter).collect(),
            after: after.into_iter().map(|f| &f.filter).collect(),
        })
    }

    /// All registered `(method, pattern)` pairs, sorted.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, String)> {
        let mut out = Vec::new();
        self.root.collect_patterns(&mut out);
        out.sort();
        out
    }

    fn node_for(&mut self, segments: &[Segment]) -> &mut RouteNode<H, F> {
        let mut node = &mut self.root;
        for segment in segments {
            node = node.child_mut(segment);
        }
        node
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(routes: &[(Method, &str)]) -> PathRouter<String> {
        let mut r = PathRouter::new();
        for (method, pattern) in routes {
            r.register(*method, pattern, (*pattern).to_string()).unwrap();
        }
        r
    }

    #[test]
    fn test_param_beats_wildcard() {
        let r = router(&[
            (Method::Get, "/"),
            (Method::Get, "/:name"),
            (Method::Get, "/**"),
        ]);

        let resolved = r.route(Method::Get, "/abc").unwrap();
        assert_eq!(resolved.handler, "/:name");
        assert_eq!(resolved.params.get("name").map(String::as_str), Some("abc"));
        assert!(resolved.tail.is_none());

        assert_eq!(r.route(Method::Get, "/").unwrap().handler, "/");

        let deep = r.route(Method::Get, "/a/b/c").unwrap();
        assert_eq!(deep.handler, "/**");
        assert_eq!(deep.tail.as_deref(), Some("a/b/c"));
    }

    #[test]
    fn test_literal_beats_param() {
        let r = router(&[(Method::Get, "/users/:id"), (Method::Get, "/users/me")]);
        assert_eq!(r.route(Method::Get, "/users/me").unwrap().handler, "/users/me");
        let other = r.route(Method::Get, "/users/42").unwrap();
        assert_eq!(other.handler, "/users/:id");
        assert_eq!(other.params["id"], "42");
    }

    #[test]
    fn test_backtracks_through_ancestors() {
        // The literal branch `/a/b/c` cannot finish `/a/b/c/d`; the search
        // falls back past two levels to the param branch at the root.
        let r = router(&[(Method::Get, "/a/b/c"), (Method::Get, "/:x/b/c/d")]);
        let resolved = r.route(Method::Get, "/a/b/c/d").unwrap();
        assert_eq!(resolved.handler, "/:x/b/c/d");
        assert_eq!(resolved.params["x"], "a");
    }

    #[test]
    fn test_deeper_wildcard_wins_over_shallower_param() {
        // `/a` is literal at the first level, so its `**` is tried before
        // the root-level param branch.
        let r = router(&[
            (Method::Get, "/a/b/c"),
            (Method::Get, "/:x/b/c/d"),
            (Method::Get, "/a/**"),
        ]);
        let resolved = r.route(Method::Get, "/a/b/c/d").unwrap();
        assert_eq!(resolved.handler, "/a/**");
        assert_eq!(resolved.tail.as_deref(), Some("b/c/d"));

        let resolved = r.route(Method::Get, "/q/b/c/d").unwrap();
        assert_eq!(resolved.handler, "/:x/b/c/d");
    }

    #[test]
    fn test_method_mismatch_backtracks() {
        let r = router(&[(Method::Post, "/api/items"), (Method::Get, "/api/:name")]);
        let resolved = r.route(Method::Get, "/api/items").unwrap();
        assert_eq!(resolved.handler, "/api/:name");
        assert!(r.route(Method::Delete, "/api/items").is_err());
    }

    #[test]
    fn test_duplicate_route_fails() {
        let mut r: PathRouter<u8> = PathRouter::new();
        r.register(Method::Get, "/a/:id", 1).unwrap();
        let err = r.register(Method::Get, "/a/:other", 2).unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { .. }));

        // Same pattern, different method is fine
        r.register(Method::Post, "/a/:id", 3).unwrap();
    }

    #[test]
    fn test_not_found() {
        let r = router(&[(Method::Get, "/only")]);
        let err = r.route(Method::Get, "/other").unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let r = router(&[(Method::Get, "/file")]);
        assert_eq!(r.route(Method::Head, "/file").unwrap().handler, "/file");
    }

    #[test]
    fn test_wildcard_matches_empty_remainder() {
        let r = router(&[(Method::Get, "/@modules/**")]);
        let resolved = r.route(Method::Get, "/@modules").unwrap();
        assert_eq!(resolved.tail.as_deref(), Some(""));
    }

    #[test]
    fn test_query_and_decoding() {
        let r = router(&[(Method::Get, "/search/:term")]);
        let resolved = r.route(Method::Get, "/search/a%20b?q=1&x=y+z").unwrap();
        assert_eq!(resolved.params["term"], "a b");
        assert_eq!(resolved.query["q"], "1");
        assert_eq!(resolved.query["x"], "y z");
    }

    #[test]
    fn test_filters_fire_in_registration_order() {
        let mut r: PathRouter<&str, &str> = PathRouter::new();
        r.register(Method::Get, "/api/:id", "handler").unwrap();
        r.after("/**", "after-global").unwrap();
        r.before("/api/**", "before-api").unwrap();
        r.before("/**", "before-global").unwrap();
        r.before("/api/:id", "before-item").unwrap();
        r.before("/static/**", "before-static").unwrap();

        let resolved = r.route(Method::Get, "/api/7").unwrap();
        assert_eq!(
            resolved.before,
            vec![&"before-api", &"before-global", &"before-item"]
        );
        assert_eq!(resolved.after, vec![&"after-global"]);
    }

    #[test]
    fn test_filters_need_a_primary_match() {
        let mut r: PathRouter<&str, &str> = PathRouter::new();
        r.before("/**", "log").unwrap();
        assert!(r.route(Method::Get, "/anything").is_err());
    }

    #[test]
    fn test_routes_listing() {
        let r = router(&[(Method::Get, "/b"), (Method::Get, "/a/:id")]);
        assert_eq!(
            r.routes(),
            vec![
                (Method::Get, "/a/:id".to_string()),
                (Method::Get, "/b".to_string()),
            ]
        );
    }
}
