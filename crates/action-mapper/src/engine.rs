//! Request and response mapping.
//!
//! The request phase reads an action invocation through a request rule set
//! and produces a [`RequestDescriptor`]. The response phase walks a response
//! rule set alongside the HTTP reply; every pure selector in the rule names
//! the place in the result where the matching piece of the reply is written.
//! The written fragment is then folded onto the caller's target with
//! [`merge`], so several rule sets can be applied in sequence.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use url::Url;

use crate::deep_map::try_deep_map;
use crate::evaluator::Evaluators;
use crate::merge::merge;
use crate::path::{self, Shape};
use crate::rules::{rule_location, RequestRules, ResponseRules};
use crate::selector::Selector;
use crate::types::{
    EvaluatorError, MappingError, MappingOptions, MappingResult, RequestDescriptor,
    ResponseEnvelope, FAILED_ACTION_STATUS,
};

/// Turns rule sets plus data into requests and results.
///
/// Holds nothing but the evaluator set; all per-call state lives in a
/// short-lived resolution context.
#[derive(Debug, Clone, Default)]
pub struct MappingEngine {
    evaluators: Evaluators,
}

impl MappingEngine {
    pub fn new(evaluators: Evaluators) -> Self {
        Self { evaluators }
    }

    pub fn evaluators(&self) -> &Evaluators {
        &self.evaluators
    }

    /// Build an outbound request from `action` using a raw request rule set.
    pub fn request_mapping(
        &self,
        action: &Value,
        rules: &Value,
        options: &MappingOptions,
    ) -> MappingResult<RequestDescriptor> {
        let rules = RequestRules::from_tree(rules)?;
        self.map_request(action, &rules, options)
    }

    /// Build an outbound request from `action` using validated rules.
    pub fn map_request(
        &self,
        action: &Value,
        rules: &RequestRules,
        options: &MappingOptions,
    ) -> MappingResult<RequestDescriptor> {
        let ctx = ResolutionContext::new(action, &self.evaluators, options);

        let base = ctx
            .resolve_leaf(&Value::String(rules.url.clone()), "url")?
            .filter(|v| !v.is_null())
            .ok_or_else(|| MappingError::MissingField {
                rule_path: "url".to_string(),
                selector: rules.url.clone(),
            })?;
        let base = leaf_to_string(&base);
        let mut url = Url::parse(&base)
            .map_err(|e| MappingError::MalformedRuleSet(format!("url `{base}`: {e}")))?;

        let mut segments = Vec::new();
        for (i, entry) in rules.path.iter().enumerate() {
            let rule_path = format!("path[{i}]");
            if entry.selector.is_literal() {
                segments.extend(
                    entry
                        .raw
                        .split('/')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
                continue;
            }
            match ctx.resolve(&entry.selector, &Value::String(entry.raw.clone()), &rule_path)? {
                Some(Value::Array(items)) => segments.extend(items.iter().map(leaf_to_string)),
                Some(value) if !value.is_null() => segments.push(leaf_to_string(&value)),
                _ if entry.optional => {
                    tracing::debug!(rule_path, selector = %entry.raw, "optional path segment absent");
                }
                _ => {
                    return Err(MappingError::MissingField {
                        rule_path,
                        selector: entry.raw.clone(),
                    })
                }
            }
        }
        if !segments.is_empty() {
            let mut url_path = url.path_segments_mut().map_err(|_| {
                MappingError::MalformedRuleSet(format!("url `{base}` cannot take path segments"))
            })?;
            url_path.pop_if_empty().extend(segments.iter());
        }

        let mut pairs = Vec::new();
        for (name, template) in &rules.query {
            match ctx.resolve_leaf(template, &format!("query.{name}"))? {
                Some(Value::Array(items)) => pairs.extend(
                    items
                        .iter()
                        .filter(|v| !v.is_null())
                        .map(|v| (name.clone(), leaf_to_string(v))),
                ),
                Some(Value::Null) | None => {}
                Some(value) => pairs.push((name.clone(), leaf_to_string(&value))),
            }
        }
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        let mut headers = BTreeMap::new();
        for (name, template) in &rules.headers {
            let value = match ctx.resolve_leaf(template, &format!("headers.{name}"))? {
                None | Some(Value::Null) => continue,
                Some(Value::Array(items)) => items
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(leaf_to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                Some(Value::Object(_)) => {
                    tracing::debug!(header = %name, "mapping cannot be sent as a header, skipping");
                    continue;
                }
                Some(value) => leaf_to_string(&value),
            };
            if !value.is_empty() {
                headers.insert(name.clone(), value);
            }
        }

        let body = match &rules.body {
            Some(template) => try_deep_map(template, |location, leaf| {
                ctx.resolve_leaf(leaf, &rule_location("body", location))
            })?,
            None => None,
        };

        Ok(RequestDescriptor {
            method: rules.method.clone(),
            url: url.to_string(),
            headers,
            body,
        })
    }

    /// Fold `response` into `target` (default `{}`) using one raw rule set.
    pub fn response_mapping(
        &self,
        response: &ResponseEnvelope,
        rules: &Value,
        options: &MappingOptions,
        target: Option<Value>,
    ) -> MappingResult<Value> {
        self.response_mapping_all(response, std::slice::from_ref(rules), options, target)
    }

    /// Fold `response` into `target` applying each rule set in order.
    pub fn response_mapping_all(
        &self,
        response: &ResponseEnvelope,
        rule_sets: &[Value],
        options: &MappingOptions,
        target: Option<Value>,
    ) -> MappingResult<Value> {
        let rule_sets = rule_sets
            .iter()
            .map(ResponseRules::from_tree)
            .collect::<MappingResult<Vec<_>>>()?;
        let mut target = target.unwrap_or(Value::Null);
        self.map_response(response, &rule_sets, options, &mut target)?;
        Ok(target)
    }

    /// Fold `response` into `target` in place using validated rule sets.
    pub fn map_response(
        &self,
        response: &ResponseEnvelope,
        rule_sets: &[ResponseRules],
        options: &MappingOptions,
        target: &mut Value,
    ) -> MappingResult<()> {
        if target.is_null() {
            *target = Value::Object(Map::new());
        }
        let map = match target {
            Value::Object(map) => map,
            other => return Err(MappingError::InvalidTarget(other.to_string())),
        };
        if let Some(id) = &options.action_id {
            if Shape::of(map.get("@id")) == Shape::Absent {
                map.insert("@id".to_string(), Value::String(id.clone()));
            }
        }

        if !response.is_success() {
            let status = response.status().unwrap_or_default();
            tracing::debug!(status, action_id = ?options.action_id, "upstream failure, skipping body");
            mark_failed(map, status);
            return Ok(());
        }

        let headers = Value::Object(response.headers.clone());
        for rules in rule_sets {
            let mut fragment = Value::Object(Map::new());

            if let Some(template) = &rules.headers {
                let ctx = ResolutionContext::new(&headers, &self.evaluators, options);
                let mut walk = ResponseWalk::new(&ctx, "headers", true, &mut fragment);
                walk.visit(template, &headers)?;
            }
            if let Some(template) = &rules.body {
                let ctx = ResolutionContext::new(&response.body, &self.evaluators, options);
                let mut walk = ResponseWalk::new(&ctx, "body", false, &mut fragment);
                walk.visit(template, &response.body)?;
            }

            let exclude = options.exclude_keys.as_ref();
            merge(target, &fragment, exclude);
            if let Some(defaults) = &rules.defaults {
                merge(target, defaults, exclude);
            }
        }
        Ok(())
    }
}

/// Per-call resolution state. Never shared between calls.
struct ResolutionContext<'a> {
    source: &'a Value,
    evaluators: &'a Evaluators,
    options: &'a MappingOptions,
}

impl<'a> ResolutionContext<'a> {
    fn new(source: &'a Value, evaluators: &'a Evaluators, options: &'a MappingOptions) -> Self {
        Self {
            source,
            evaluators,
            options,
        }
    }

    fn resolve_leaf(&self, leaf: &Value, rule_path: &str) -> MappingResult<Option<Value>> {
        let selector = Selector::classify_value(leaf)?;
        self.resolve(&selector, leaf, rule_path)
    }

    fn resolve(
        &self,
        selector: &Selector,
        leaf: &Value,
        rule_path: &str,
    ) -> MappingResult<Option<Value>> {
        match selector {
            Selector::Path(path) => Ok(path::get(self.source, path).cloned()),
            Selector::Expression(expr) => self.evaluate(expr, self.source, rule_path),
            Selector::Literal => Ok(Some(leaf.clone())),
        }
    }

    fn evaluate(
        &self,
        expression: &str,
        bound: &Value,
        rule_path: &str,
    ) -> MappingResult<Option<Value>> {
        let method = self.options.eval_method;
        let evaluator = self
            .evaluators
            .get(method)
            .ok_or_else(|| MappingError::UnknownEvaluator(method.to_string()))?;

        evaluator.evaluate(expression, bound).map_err(|source| {
            tracing::warn!(
                rule_path,
                expression,
                %method,
                action_id = ?self.options.action_id,
                "evaluator failed: {source}"
            );
            MappingError::Evaluator {
                expression: expression.to_string(),
                rule_path: rule_path.to_string(),
                source,
            }
        })
    }
}

/// Walks a response rule template alongside the matching part of a reply.
struct ResponseWalk<'c, 'a, 'f> {
    ctx: &'c ResolutionContext<'a>,
    section: &'static str,
    fold_case: bool,
    location: Vec<String>,
    fragment: &'f mut Value,
}

impl<'c, 'a, 'f> ResponseWalk<'c, 'a, 'f> {
    fn new(
        ctx: &'c ResolutionContext<'a>,
        section: &'static str,
        fold_case: bool,
        fragment: &'f mut Value,
    ) -> Self {
        Self {
            ctx,
            section,
            fold_case,
            location: Vec::new(),
            fragment,
        }
    }

    fn visit(&mut self, template: &Value, source: &Value) -> MappingResult<()> {
        match (template, source) {
            (Value::Object(rules), Value::Object(src)) => {
                for (key, rule) in rules {
                    let Some(child) = self.lookup(src, key) else {
                        continue;
                    };
                    self.location.push(key.clone());
                    let result = self.visit(rule, child);
                    self.location.pop();
                    result?;
                }
                Ok(())
            }
            (Value::Object(_), Value::Array(items)) => {
                for item in items {
                    self.visit(template, item)?;
                }
                Ok(())
            }
            (Value::Array(rules), Value::Array(items)) => {
                for item in items {
                    for (i, rule) in rules.iter().enumerate() {
                        self.location.push(i.to_string());
                        let result = self.visit(rule, item);
                        self.location.pop();
                        result?;
                    }
                }
                Ok(())
            }
            (Value::Object(_) | Value::Array(_), _) => {
                tracing::debug!(
                    rule_path = %rule_location(self.section, &self.location),
                    "response shape does not match rule, skipping"
                );
                Ok(())
            }
            (leaf, source) => self.write_leaf(leaf, source),
        }
    }

    fn lookup<'s>(&self, src: &'s Map<String, Value>, key: &str) -> Option<&'s Value> {
        src.get(key).or_else(|| {
            self.fold_case
                .then(|| src.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)))
                .flatten()
                .map(|(_, v)| v)
        })
    }

    fn write_leaf(&mut self, leaf: &Value, source: &Value) -> MappingResult<()> {
        match Selector::classify_value(leaf)? {
            Selector::Path(target) => {
                path::set(self.fragment, &target, source.clone())?;
                Ok(())
            }
            Selector::Expression(expr) => {
                let rule_path = rule_location(self.section, &self.location);
                match self.ctx.evaluate(&expr, source, &rule_path)? {
                    None | Some(Value::Null) => Ok(()),
                    Some(produced @ Value::Object(_)) => {
                        merge(self.fragment, &produced, None);
                        Ok(())
                    }
                    Some(other) => Err(MappingError::Evaluator {
                        expression: expr,
                        rule_path,
                        source: EvaluatorError::new(format!(
                            "response expressions must yield a mapping, got {other}"
                        )),
                    }),
                }
            }
            Selector::Literal => Ok(()),
        }
    }
}

fn mark_failed(map: &mut Map<String, Value>, status: u16) {
    map.insert(
        "actionStatus".to_string(),
        Value::String(FAILED_ACTION_STATUS.to_string()),
    );
    let error = json!({"@type": "Thing", "name": format!("HTTP {status}")});
    match map.get_mut("error") {
        Some(existing) if !existing.is_null() => merge(existing, &error, None),
        _ => {
            map.insert("error".to_string(), error);
        }
    }
}

/// Render a resolved leaf for URLs and headers.
fn leaf_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathError;
    use crate::types::EvalMethod;
    use serde_json::json;

    fn engine() -> MappingEngine {
        let upper = |expr: &str, bound: &Value| -> Result<Option<Value>, EvaluatorError> {
            match expr {
                "fail" => Err(EvaluatorError::new("boom")),
                "none" => Ok(None),
                "wrap" => Ok(Some(json!({"result": {"wrapped": bound.clone()}}))),
                "scalar" => Ok(Some(json!(1))),
                field => Ok(bound
                    .get(field)
                    .and_then(Value::as_str)
                    .map(|s| json!(s.to_uppercase()))),
            }
        };
        MappingEngine::new(Evaluators::new().with(EvalMethod::Sandbox, upper))
    }

    fn ok_response(body: Value) -> ResponseEnvelope {
        ResponseEnvelope::new(200, Map::new(), body)
    }

    #[test]
    fn test_request_path_joins_segments() {
        let req = engine()
            .request_mapping(
                &json!({"id": "42"}),
                &json!({"url": "http://example.com/api", "path": ["$.id"]}),
                &MappingOptions::default(),
            )
            .unwrap();
        assert_eq!(req.url, "http://example.com/api/42");
        assert_eq!(req.method, "GET");
        assert_eq!(req.body, None);
    }

    #[test]
    fn test_request_single_slash_normalization() {
        let req = engine()
            .request_mapping(
                &json!({"id": 7, "name": "a b/c"}),
                &json!({
                    "url": "https://example.com/api/",
                    "path": ["/users/", "$.id", "$.name"]
                }),
                &MappingOptions::default(),
            )
            .unwrap();
        assert_eq!(req.url, "https://example.com/api/users/7/a%20b%2Fc");
    }

    #[test]
    fn test_request_optional_and_required_segments() {
        let rules = json!({"url": "http://x.test", "path": ["$.id", "$.page?"]});
        let req = engine()
            .request_mapping(&json!({"id": "1"}), &rules, &MappingOptions::default())
            .unwrap();
        assert_eq!(req.url, "http://x.test/1");

        let err = engine()
            .request_mapping(&json!({}), &rules, &MappingOptions::default())
            .unwrap_err();
        assert!(matches!(err, MappingError::MissingField { ref rule_path, .. } if rule_path == "path[0]"));
    }

    #[test]
    fn test_request_query_headers_body() {
        let action = json!({
            "@type": "SearchAction",
            "query": "rust books",
            "tags": ["a", "b"],
            "object": {"name": "x", "count": 3},
            "token": "t0k"
        });
        let rules = json!({
            "method": "post",
            "url": "http://api.test/search",
            "query": {"q": "$.query", "tag": "$.tags", "missing": "$.nope", "fixed": 1},
            "headers": {"authorization": "{{ token }}", "x-missing": "$.nope", "accept": "application/json"},
            "body": {
                "name": "$.object.name",
                "n": "$.object.count",
                "list": ["$.tags[1]", "$.nope", "lit"],
                "absent": "$.nope"
            }
        });
        let req = engine()
            .request_mapping(&action, &rules, &MappingOptions::default())
            .unwrap();

        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "http://api.test/search?q=rust+books&tag=a&tag=b&fixed=1");
        assert_eq!(req.headers.get("authorization").map(String::as_str), Some("T0K"));
        assert_eq!(req.headers.get("accept").map(String::as_str), Some("application/json"));
        assert!(!req.headers.contains_key("x-missing"));
        assert_eq!(req.body, Some(json!({"name": "x", "n": 3, "list": ["b", "lit"]})));
    }

    #[test]
    fn test_request_headers_skip_null_and_join_sequences() {
        let action = json!({"none": null, "langs": ["en", null, "fr"], "meta": {"a": 1}, "empty": []});
        let rules = json!({
            "url": "http://api.test/search",
            "path": ["search?"],
            "query": {"n": "$.none", "lang": "$.langs"},
            "headers": {
                "x-none": "$.none",
                "accept-language": "$.langs",
                "x-meta": "$.meta",
                "x-empty": "$.empty"
            }
        });
        let req = engine()
            .request_mapping(&action, &rules, &MappingOptions::default())
            .unwrap();

        assert_eq!(req.url, "http://api.test/search/search%3F?lang=en&lang=fr");
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.headers.get("accept-language").map(String::as_str), Some("en, fr"));
    }

    #[test]
    fn test_request_url_from_selector() {
        let req = engine()
            .request_mapping(
                &json!({"target": {"urlTemplate": "http://t.test/base"}}),
                &json!({"url": "$.target.urlTemplate"}),
                &MappingOptions::default(),
            )
            .unwrap();
        assert_eq!(req.url, "http://t.test/base");

        let err = engine()
            .request_mapping(&json!({}), &json!({"url": "$.target.urlTemplate"}), &MappingOptions::default())
            .unwrap_err();
        assert!(matches!(err, MappingError::MissingField { .. }));
    }

    #[test]
    fn test_request_malformed_fails_before_resolution() {
        let err = engine()
            .request_mapping(&json!({}), &json!({"url": 3, "body": "{{ fail }}"}), &MappingOptions::default())
            .unwrap_err();
        assert!(matches!(err, MappingError::MalformedRuleSet(_)));

        let err = engine()
            .request_mapping(&json!({}), &json!({"url": "not a url"}), &MappingOptions::default())
            .unwrap_err();
        assert!(matches!(err, MappingError::MalformedRuleSet(_)));
    }

    #[test]
    fn test_request_evaluator_failure_carries_context() {
        let err = engine()
            .request_mapping(
                &json!({}),
                &json!({"url": "http://x.test", "body": {"a": ["{{ fail }}"]}}),
                &MappingOptions::default(),
            )
            .unwrap_err();
        match err {
            MappingError::Evaluator {
                expression,
                rule_path,
                source,
            } => {
                assert_eq!(expression, "fail");
                assert_eq!(rule_path, "body.a.0");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_request_unknown_evaluator_mode() {
        let err = engine()
            .request_mapping(
                &json!({}),
                &json!({"url": "http://x.test", "body": "{{ none }}"}),
                &MappingOptions::default().with_eval_method(EvalMethod::Eval),
            )
            .unwrap_err();
        assert!(matches!(err, MappingError::UnknownEvaluator(ref m) if m == "eval"));
    }

    #[test]
    fn test_response_writes_to_selector_location() {
        let result = engine()
            .response_mapping(
                &ok_response(json!({"foo": "123"})),
                &json!({"body": {"foo": "$.result.bar"}}),
                &MappingOptions::default(),
                None,
            )
            .unwrap();
        assert_eq!(result, json!({"result": {"bar": "123"}}));
    }

    #[test]
    fn test_response_without_status_is_success() {
        let response: ResponseEnvelope =
            serde_json::from_value(json!({"body": {"foo": "123"}})).unwrap();
        let result = engine()
            .response_mapping(&response, &json!({"body": {"foo": "$.result.bar"}}), &MappingOptions::default(), None)
            .unwrap();
        assert_eq!(result, json!({"result": {"bar": "123"}}));
    }

    #[test]
    fn test_response_failure_envelope() {
        let response = ResponseEnvelope::new(502, Map::new(), json!("<html>bad gateway</html>"));
        let result = engine()
            .response_mapping(
                &response,
                &json!({"body": {"items": [{"name": "{{ fail }}"}]}}),
                &MappingOptions::default(),
                Some(json!({"@type": "SearchAction", "actionStatus": "ActiveActionStatus"})),
            )
            .unwrap();
        assert_eq!(
            result,
            json!({
                "@type": "SearchAction",
                "actionStatus": "FailedActionStatus",
                "error": {"@type": "Thing", "name": "HTTP 502"}
            })
        );
    }

    #[test]
    fn test_response_rejects_non_mapping_target() {
        let failure = ResponseEnvelope::new(500, Map::new(), Value::Null);
        let success = ok_response(json!({"foo": 1}));
        let rules = json!({"body": {"foo": "$.result.foo"}});

        for target in [json!([]), json!("x"), json!(3)] {
            for response in [&failure, &success] {
                let err = engine()
                    .response_mapping(response, &rules, &MappingOptions::default(), Some(target.clone()))
                    .unwrap_err();
                assert!(matches!(err, MappingError::InvalidTarget(_)), "target {target}");
            }
        }

        let result = engine()
            .response_mapping(&failure, &rules, &MappingOptions::default(), Some(Value::Null))
            .unwrap();
        assert_eq!(result["actionStatus"], FAILED_ACTION_STATUS);
    }

    #[test]
    fn test_response_write_index_out_of_range() {
        let err = engine()
            .response_mapping(
                &ok_response(json!({"foo": "x"})),
                &json!({"body": {"foo": "$.result[18446744073709551615]"}}),
                &MappingOptions::default(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, MappingError::Path(PathError::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_response_repeated_groups_aggregate() {
        let body = json!({"items": [{"name": "a", "price": 1}, {"name": "b", "price": 2}]});
        let result = engine()
            .response_mapping(
                &ok_response(body),
                &json!({"body": {"items": [{"name": "$.result.name", "price": "$.result.price"}]}}),
                &MappingOptions::default(),
                None,
            )
            .unwrap();
        assert_eq!(result, json!({"result": {"name": ["a", "b"], "price": [1, 2]}}));
    }

    #[test]
    fn test_response_mapping_over_sequence_source() {
        let body = json!([{"id": 1}, {"id": 2}]);
        let result = engine()
            .response_mapping(&ok_response(body), &json!({"body": {"id": "$.result.identifier"}}), &MappingOptions::default(), None)
            .unwrap();
        assert_eq!(result, json!({"result": {"identifier": [1, 2]}}));
    }

    #[test]
    fn test_response_headers_match_case_insensitively() {
        let mut headers = Map::new();
        headers.insert("x-total-count".to_string(), json!("17"));
        let response = ResponseEnvelope::new(200, headers, Value::Null);
        let result = engine()
            .response_mapping(
                &response,
                &json!({"headers": {"X-Total-Count": "$.result.numberOfItems", ":status": "$.result.status"}}),
                &MappingOptions::default(),
                None,
            )
            .unwrap();
        assert_eq!(result, json!({"result": {"numberOfItems": "17", "status": 200}}));
    }

    #[test]
    fn test_response_sequential_rule_sets_do_not_overwrite() {
        let response = ok_response(json!({"title": "first", "name": "second"}));
        let result = engine()
            .response_mapping_all(
                &response,
                &[
                    json!({"body": {"title": "$.result.name"}}),
                    json!({"body": {"name": "$.result.name", "title": "$.result.headline"}}),
                ],
                &MappingOptions::default(),
                None,
            )
            .unwrap();
        assert_eq!(result, json!({"result": {"name": "first", "headline": "first"}}));
    }

    #[test]
    fn test_response_defaults_and_fan_out_merge() {
        let response = ok_response(json!({"products": [{"n": "a"}, {"n": "b"}]}));
        let result = engine()
            .response_mapping(
                &response,
                &json!({
                    "body": {"products": "$.result.itemListElement"},
                    "defaults": {"result": {"@type": "ItemList", "itemListElement": {"@type": "Product"}}}
                }),
                &MappingOptions::default(),
                None,
            )
            .unwrap();
        assert_eq!(
            result,
            json!({"result": {
                "itemListElement": [{"n": "a", "@type": "Product"}, {"n": "b", "@type": "Product"}],
                "@type": "ItemList"
            }})
        );
    }

    #[test]
    fn test_response_expression_results_merge() {
        let response = ok_response(json!({"data": {"k": 1}}));
        let result = engine()
            .response_mapping(
                &response,
                &json!({"body": {"data": "{{ wrap }}", "missing": "{{ wrap }}"}}),
                &MappingOptions::default(),
                None,
            )
            .unwrap();
        assert_eq!(result, json!({"result": {"wrapped": {"k": 1}}}));

        let err = engine()
            .response_mapping(&response, &json!({"body": {"data": "{{ scalar }}"}}), &MappingOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, MappingError::Evaluator { ref rule_path, .. } if rule_path == "body.data"));
    }

    #[test]
    fn test_response_stamps_action_id_and_excludes_context() {
        let response = ok_response(json!({"ctx": "https://schema.org", "v": 1}));
        let result = engine()
            .response_mapping(
                &response,
                &json!({"body": {"ctx": "$.@context", "v": "$.result.value"}}),
                &MappingOptions::default().with_action_id("urn:action:1"),
                None,
            )
            .unwrap();
        assert_eq!(result, json!({"@id": "urn:action:1", "result": {"value": 1}}));
    }

    #[test]
    fn test_response_literal_leaves_ignored() {
        let result = engine()
            .response_mapping(
                &ok_response(json!({"a": 1})),
                &json!({"body": {"a": "just text"}}),
                &MappingOptions::default(),
                Some(json!({"existing": true})),
            )
            .unwrap();
        assert_eq!(result, json!({"existing": true}));
    }
}
