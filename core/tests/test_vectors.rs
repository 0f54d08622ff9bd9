//! Verify request resolution and response dispatch against the JSON test
//! vectors stored in `test-vectors/`.
//!
//! Each case describes a method config, caller args, the wire request the
//! executor must produce, a simulated reply, and the settled outcome. Calls
//! run through a real `Client` on top of `MockTransport`, so the vectors
//! cover the whole pipeline rather than one helper at a time.

use std::collections::BTreeMap;

use restmap_core::{ClientBuilder, ManifestDefinition, MockReply, MockTransport, TransportGateway, WireResponse};
use serde_json::{json, Value};

fn string_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .unwrap()
        .iter()
        .map(|(name, value)| (name.clone(), value.as_str().unwrap().to_string()))
        .collect()
}

fn simulated(case: &Value) -> WireResponse {
    let sim = &case["simulated_response"];
    WireResponse {
        status: sim["status"].as_u64().unwrap() as u16,
        headers: string_map(&sim["headers"]),
        body: sim["body"].as_str().map(str::to_string),
    }
}

#[tokio::test]
async fn call_test_vectors() {
    let raw = include_str!("../../test-vectors/calls.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let host = vectors["host"].as_str().unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();

        let definition = ManifestDefinition::from_value(json!({
            "host": host,
            "resources": { "Case": { "call": case["config"].clone() } },
            "gatewayConfigs": case.get("gateway_configs").cloned().unwrap_or_else(|| json!({})),
        }))
        .unwrap();
        let transport = MockTransport::new();
        transport.mock(None, host, MockReply::Respond(simulated(case)));
        let client = ClientBuilder::new(definition)
            .gateway(TransportGateway::shared(transport.clone()))
            .build()
            .unwrap();

        let outcome = client.call("Case", "call", case["args"].clone()).unwrap().await;

        // Verify the wire request
        let requests = transport.requests();
        assert_eq!(requests.len(), 1, "{name}: request count");
        let sent = &requests[0];
        let expected_req = &case["expected_request"];
        assert_eq!(sent.method, expected_req["method"].as_str().unwrap(), "{name}: method");
        assert_eq!(sent.url, expected_req["url"].as_str().unwrap(), "{name}: url");
        assert_eq!(sent.headers, string_map(&expected_req["headers"]), "{name}: headers");
        assert_eq!(sent.body.as_deref(), expected_req["body"].as_str(), "{name}: body");

        // Verify the settled outcome
        let expected = &case["expected_result"];
        let ok = expected["ok"].as_bool().unwrap();
        assert_eq!(outcome.is_ok(), ok, "{name}: resolved");
        let response = outcome.unwrap_or_else(|failed| failed);
        assert_eq!(u64::from(response.status()), expected["status"].as_u64().unwrap(), "{name}: status");
        assert_eq!(response.data(), expected["data"], "{name}: data");
        assert!(response.time_elapsed().is_some(), "{name}: elapsed");
    }
}
