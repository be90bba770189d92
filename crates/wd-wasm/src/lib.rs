//! WebAssembly bindings for Warden
//!
//! The extension's service worker hands list texts and settings over as
//! JSON, receives declarative rules back, and asks for sync batches and
//! cosmetic selectors. The latest compilation is kept in module state.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;
use wd_compiler::{
    compile, BackendLimits, CachedList, CompileDiagnostics, CompileInput, Compilation, CompilerConfig, CustomRule,
    FilterList, SyncPlan, WardenConfig,
};
use wd_core::declarative::DeclarativeRule;
use wd_core::ids::IdSpace;
use wd_core::{Category, MatchDecision, RequestContext, ResourceType, RuleMatcher};

struct RuleSetState {
    compilation: Compilation,
    matcher: RuleMatcher,
    id_space: IdSpace,
}

static RULE_SET: RwLock<Option<Arc<RuleSetState>>> = RwLock::new(None);

fn current() -> Option<Arc<RuleSetState>> {
    match RULE_SET.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn install(state: RuleSetState) {
    let mut guard = match RULE_SET.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some(Arc::new(state));
}

// =============================================================================
// Request / Response Shapes
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListInput {
    meta: FilterList,
    text: String,
    #[serde(default)]
    fetched_at: Option<u64>,
    /// Last refresh failed; `text` is the cached copy
    #[serde(default)]
    stale: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CompileRequest {
    lists: Vec<ListInput>,
    custom_rules: Vec<CustomRule>,
    whitelist: Vec<String>,
    blacklist: Vec<String>,
    enabled_categories: BTreeSet<Category>,
    config: Option<CompilerConfig>,
    /// Limits of the browser's rule API; the defaults match Chrome's
    sync: Option<BackendLimits>,
}

impl Default for CompileRequest {
    fn default() -> Self {
        Self {
            lists: Vec::new(),
            custom_rules: Vec::new(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            // Same starting point as a fresh rule-set manager.
            enabled_categories: Category::ALL.into_iter().filter(Category::is_toggleable).collect(),
            config: None,
            sync: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompileResponse {
    rules: Vec<DeclarativeRule>,
    diagnostics: CompileDiagnostics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeclarativeBatch {
    add_rules: Vec<DeclarativeRule>,
    remove_rule_ids: Vec<u32>,
}

fn compile_request(request_json: &str) -> Result<(CompileResponse, RuleSetState), String> {
    let request: CompileRequest =
        serde_json::from_str(request_json).map_err(|e| format!("Invalid compile request: {}", e))?;
    let config = WardenConfig {
        compiler: request.config.unwrap_or_default(),
        sync: request.sync.unwrap_or_default(),
    };
    config.validate().map_err(|e| e.to_string())?;

    let lists: Vec<CachedList> = request
        .lists
        .into_iter()
        .map(|input| {
            let mut cached = CachedList::from_text(input.meta, &input.text, input.fetched_at.unwrap_or(0));
            cached.meta.last_fetched_at = input.fetched_at;
            cached.stale = input.stale;
            cached
        })
        .collect();

    let input = CompileInput {
        lists: lists.iter().collect(),
        custom_rules: &request.custom_rules,
        whitelist: &request.whitelist,
        blacklist: &request.blacklist,
        enabled_categories: request.enabled_categories,
        rule_budget: Some(config.sync.max_rules),
    };
    let compilation = compile(&input, &config.compiler).map_err(|e| e.to_string())?;

    let response = CompileResponse {
        rules: compilation.rules.iter().map(DeclarativeRule::from).collect(),
        diagnostics: compilation.diagnostics.clone(),
    };
    let state = RuleSetState {
        matcher: RuleMatcher::new(&compilation.rules),
        compilation,
        id_space: config.compiler.id_ranges,
    };
    Ok((response, state))
}

fn plan_batches(target_json: &str, installed_json: &str, max_batch: usize, space: &IdSpace) -> Result<Vec<DeclarativeBatch>, String> {
    let decode = |json: &str, what: &str| -> Result<Vec<DeclarativeRule>, String> {
        serde_json::from_str(json).map_err(|e| format!("Invalid {} rules: {}", what, e))
    };
    let target: Vec<_> = decode(target_json, "target")?
        .into_iter()
        .map(|rule| rule.into_compiled(space))
        .collect();
    let installed: Vec<_> = decode(installed_json, "installed")?
        .into_iter()
        .map(|rule| rule.into_compiled(space))
        .collect();

    let plan = SyncPlan::diff(&target, &installed);
    Ok(plan
        .batches(max_batch)
        .into_iter()
        .map(|batch| DeclarativeBatch {
            add_rules: batch.add_rules.iter().map(DeclarativeRule::from).collect(),
            remove_rule_ids: batch.remove_rule_ids,
        })
        .collect())
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&json)
}

fn string_array(items: &[String]) -> JsValue {
    let array = js_sys::Array::new_with_length(items.len() as u32);
    for (i, item) in items.iter().enumerate() {
        array.set(i as u32, JsValue::from_str(item));
    }
    array.into()
}

// =============================================================================
// Exports
// =============================================================================

/// Compile lists and user rules from a JSON request. Returns
/// `{ rules, diagnostics }` with rules in declarative form.
#[wasm_bindgen]
pub fn compile_rule_set(request_json: &str) -> Result<JsValue, JsValue> {
    let (response, state) = compile_request(request_json).map_err(|e| JsValue::from_str(&e))?;

    for exhausted in &response.diagnostics.range_exhausted {
        web_sys::console::warn_1(&JsValue::from_str(&format!(
            "rule id range for '{}' exhausted; dropped {} rules",
            exhausted.category, exhausted.dropped
        )));
    }
    if response.diagnostics.capacity_dropped > 0 {
        web_sys::console::warn_1(&JsValue::from_str(&format!(
            "list rule ceiling reached; dropped {} rules",
            response.diagnostics.capacity_dropped
        )));
    }

    install(state);
    to_js(&response)
}

/// Batches that turn `installed` into `target`, both arrays of declarative
/// rules as JSON. Apply them in order; recompute after any failure.
#[wasm_bindgen]
pub fn plan_sync(target_json: &str, installed_json: &str, max_batch: Option<u32>) -> Result<JsValue, JsValue> {
    let max_batch = max_batch
        .map(|n| n as usize)
        .unwrap_or(BackendLimits::default().max_batch);
    let space = current().map(|s| s.id_space.clone()).unwrap_or_default();
    let batches =
        plan_batches(target_json, installed_json, max_batch, &space).map_err(|e| JsValue::from_str(&e))?;
    to_js(&batches)
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    current().is_some()
}

#[wasm_bindgen]
pub fn get_rule_set_info() -> JsValue {
    let result = js_sys::Object::new();
    if let Some(state) = current() {
        let compilation = &state.compilation;
        let _ = js_sys::Reflect::set(&result, &"initialized".into(), &JsValue::from(true));
        let _ = js_sys::Reflect::set(&result, &"rules".into(), &JsValue::from(compilation.rules.len() as u32));
        let _ = js_sys::Reflect::set(&result, &"cosmetics".into(), &JsValue::from(compilation.cosmetics.len() as u32));
        let _ = js_sys::Reflect::set(
            &result,
            &"staleLists".into(),
            &string_array(&compilation.diagnostics.stale_lists),
        );
    } else {
        let _ = js_sys::Reflect::set(&result, &"initialized".into(), &JsValue::from(false));
    }
    result.into()
}

#[wasm_bindgen]
pub fn cosmetics_for(domain: &str) -> JsValue {
    let selectors = current()
        .map(|state| state.compilation.cosmetics.cosmetics_for(domain))
        .unwrap_or_default();
    string_array(&selectors)
}

#[wasm_bindgen]
pub fn scriptlets_for(domain: &str) -> JsValue {
    let scripts = current()
        .map(|state| state.compilation.cosmetics.scriptlets_for(domain))
        .unwrap_or_default();
    string_array(&scripts)
}

/// Evaluate a request against the last compiled rule set the way the
/// backend would.
#[wasm_bindgen]
pub fn match_request(url: &str, request_type: &str, initiator: Option<String>) -> JsValue {
    let result = js_sys::Object::new();
    let Some(state) = current() else {
        let _ = js_sys::Reflect::set(&result, &"decision".into(), &"allow".into());
        return result.into();
    };

    let ctx = RequestContext {
        url,
        resource_type: ResourceType::from_request(request_type),
        initiator: initiator.as_deref(),
    };
    let matched = state.matcher.match_request(&ctx);

    let decision = match matched.decision {
        MatchDecision::Allow => "allow",
        MatchDecision::Block => "block",
    };
    let _ = js_sys::Reflect::set(&result, &"decision".into(), &decision.into());
    if let Some(id) = matched.rule_id {
        let _ = js_sys::Reflect::set(&result, &"ruleId".into(), &JsValue::from(id));
        let _ = js_sys::Reflect::set(&result, &"priority".into(), &JsValue::from(matched.priority));
    }
    result.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = r#"{
        "lists": [{
            "meta": { "id": "easylist", "displayName": "EasyList", "sourceURI": "https://lists.test/easylist.txt",
                      "category": "ads", "enabled": true },
            "text": "||ads.example.com^\n@@||ads.example.com/safe.js\nexample.com##.banner-ad",
            "fetchedAt": 5
        }],
        "customRules": [{ "id": 1, "pattern": "mine.test", "type": "block", "createdAt": 1 }],
        "enabledCategories": ["ads"]
    }"#;

    #[test]
    fn compiles_json_request() {
        let (response, state) = compile_request(REQUEST).expect("valid request");
        assert_eq!(response.rules.len(), 3);
        assert_eq!(response.diagnostics.lists_compiled, 1);
        assert_eq!(state.compilation.cosmetics.cosmetics_for("example.com"), vec![".banner-ad"]);

        let json = serde_json::to_value(&response.rules[0]).unwrap();
        assert_eq!(json["id"], 1000);
        assert_eq!(json["action"]["type"], "block");
    }

    #[test]
    fn omitted_categories_default_to_all_toggleable() {
        let request = r#"{
            "lists": [
                { "meta": { "id": "ads", "displayName": "Ads", "sourceURI": "https://lists.test/ads.txt",
                            "category": "ads", "enabled": true }, "text": "||ads.test^" },
                { "meta": { "id": "trackers", "displayName": "Trackers", "sourceURI": "https://lists.test/t.txt",
                            "category": "trackers", "enabled": true }, "text": "||tracker.test^" },
                { "meta": { "id": "miners", "displayName": "Miners", "sourceURI": "https://lists.test/m.txt",
                            "category": "cryptominers", "enabled": true }, "text": "||miner.test^" }
            ]
        }"#;
        let (response, _) = compile_request(request).expect("valid request");
        assert_eq!(response.diagnostics.lists_compiled, 3);
        assert_eq!(response.rules.len(), 3);

        let (response, _) = compile_request(r#"{ "lists": [], "enabledCategories": [] }"#).expect("valid request");
        assert_eq!(response.diagnostics.lists_compiled, 0);
    }

    #[test]
    fn budget_follows_backend_limits() {
        let request = r#"{
            "lists": [{ "meta": { "id": "ads", "displayName": "Ads", "sourceURI": "https://lists.test/ads.txt",
                                  "category": "ads", "enabled": true },
                        "text": "||a.test^\n||b.test^\n||c.test^" }],
            "customRules": [{ "id": 1, "pattern": "mine.test", "type": "block", "createdAt": 1 }],
            "config": { "max_list_rules": 2 },
            "sync": { "max_rules": 3, "max_batch": 10 }
        }"#;
        let (response, _) = compile_request(request).expect("valid request");
        assert_eq!(response.rules.len(), 3);
        assert_eq!(response.diagnostics.capacity_dropped, 1);

        let too_big = r#"{ "config": { "max_list_rules": 5 }, "sync": { "max_rules": 5, "max_batch": 10 } }"#;
        assert!(compile_request(too_big).is_err());
    }

    #[test]
    fn rejects_malformed_request() {
        assert!(compile_request("{ \"lists\": 3 }").is_err());
    }

    #[test]
    fn plans_batches_from_declarative_rules() {
        let (response, _) = compile_request(REQUEST).expect("valid request");
        let target = serde_json::to_string(&response.rules).unwrap();
        let space = IdSpace::default();

        let batches = plan_batches(&target, "[]", 2, &space).expect("valid rules");
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].add_rules.len(), 2);

        assert!(plan_batches(&target, &target, 2, &space).expect("valid rules").is_empty());
    }
}
