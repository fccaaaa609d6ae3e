//! Action invocation: map the request, dispatch it, map the reply back.

use std::sync::Arc;

use action_mapper::{
    EvalMethod, MappingEngine, MappingOptions, RequestDescriptor, ResponseEnvelope,
    COMPLETED_ACTION_STATUS,
};
use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::dispatch::HttpDispatch;
use crate::eval::builtin_evaluators;
use crate::rules::RuleRegistry;
use crate::types::{GatewayError, GatewayResult};

pub struct ActionExecutor {
    engine: MappingEngine,
    registry: RuleRegistry,
    dispatcher: Arc<dyn HttpDispatch>,
    eval_method: EvalMethod,
}

impl ActionExecutor {
    /// Executor using the built-in evaluators.
    pub fn new(
        registry: RuleRegistry,
        dispatcher: Arc<dyn HttpDispatch>,
        config: &GatewayConfig,
    ) -> Self {
        Self::with_engine(
            MappingEngine::new(builtin_evaluators()),
            registry,
            dispatcher,
            config.eval_method,
        )
    }

    pub fn with_engine(
        engine: MappingEngine,
        registry: RuleRegistry,
        dispatcher: Arc<dyn HttpDispatch>,
        eval_method: EvalMethod,
    ) -> Self {
        Self {
            engine,
            registry,
            dispatcher,
            eval_method,
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn eval_method(&self) -> EvalMethod {
        self.eval_method
    }

    fn options(&self, action: &Value) -> MappingOptions {
        let options = MappingOptions::default().with_eval_method(self.eval_method);
        match action_id(action) {
            Some(id) => options.with_action_id(id),
            None => options,
        }
    }

    /// Build the outbound request for `action` without sending it.
    pub fn map_request(&self, name: &str, action: &Value) -> GatewayResult<RequestDescriptor> {
        let rules = self.registry.get(name)?;
        Ok(self
            .engine
            .map_request(action, &rules.request, &self.options(action))?)
    }

    /// Fold a reply into `target` (default `{}`) without any network traffic.
    pub fn map_response(
        &self,
        name: &str,
        response: &ResponseEnvelope,
        target: Option<Value>,
    ) -> GatewayResult<Value> {
        let rules = self.registry.get(name)?;
        let mut target = target.unwrap_or(Value::Null);
        let options = self.options(&target);
        self.engine
            .map_response(response, &rules.response, &options, &mut target)?;
        Ok(target)
    }

    /// Run `action` end to end and return it with the reply folded in.
    ///
    /// An upstream failure status is not an error: the result carries
    /// `FailedActionStatus` instead.
    pub async fn invoke(&self, name: &str, action: Value) -> GatewayResult<Value> {
        let invocation_id = Uuid::new_v4();
        let span = tracing::info_span!("invoke", action = name, %invocation_id);
        self.invoke_inner(name, action).instrument(span).await
    }

    async fn invoke_inner(&self, name: &str, mut action: Value) -> GatewayResult<Value> {
        if !action.is_object() {
            return Err(GatewayError::InvalidParams(
                "action must be a JSON object".to_string(),
            ));
        }
        let started = chrono::Utc::now();
        let rules = self.registry.get(name)?;
        let options = self.options(&action);

        let request = self.engine.map_request(&action, &rules.request, &options)?;
        tracing::info!(method = %request.method, url = %request.url, "dispatching");

        let response = self.dispatcher.send(&request).await?;
        let status = response.status();
        tracing::info!(status = ?status, "upstream replied");

        self.engine
            .map_response(&response, &rules.response, &options, &mut action)?;

        if let Value::Object(map) = &mut action {
            if response.is_success() {
                map.insert(
                    "actionStatus".to_string(),
                    Value::String(COMPLETED_ACTION_STATUS.to_string()),
                );
            }
            stamp_times(map, started);
        }
        Ok(action)
    }
}

fn action_id(action: &Value) -> Option<String> {
    ["@id", "identifier"]
        .iter()
        .find_map(|key| action.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

fn stamp_times(map: &mut Map<String, Value>, started: chrono::DateTime<chrono::Utc>) {
    map.insert("startTime".to_string(), Value::String(started.to_rfc3339()));
    map.insert(
        "endTime".to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
}
