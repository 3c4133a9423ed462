//! Named Akhet API calls.
//!
//! Each call fixes a resource, a method and a payload shape, then delegates
//! to `AkhetClient::execute`. Listings and host info go through the cache;
//! everything touching a specific instance bypasses it.

use serde_json::{Map, Value};

use crate::client::AkhetClient;
use crate::error::{AkhetError, AkhetResult};
use crate::payload::Payload;
use crate::types::{CreatedInstance, InstanceConfig, ResolutionRequest};

impl AkhetClient {
    /// Server host information.
    pub fn host_info(&self) -> AkhetResult<Value> {
        self.execute("hostinfo", "GET", &Payload::new(), false)
    }

    /// Images available locally on the server.
    pub fn list_images(&self) -> AkhetResult<Value> {
        self.execute("imageslocal", "GET", &Payload::new(), false)
    }

    /// Images the server can fetch from its registry.
    pub fn list_images_online(&self) -> AkhetResult<Value> {
        self.execute("imagesonline", "GET", &Payload::new(), false)
    }

    /// Create an instance and return its token.
    pub fn create_instance(&self, config: &InstanceConfig) -> AkhetResult<String> {
        self.post_instance(&Payload::from_serializable(config)?)
    }

    /// `create_instance` for a loosely typed option map. Unknown keys are
    /// dropped with a warning; known keys are forwarded with whatever value
    /// they hold, leaving type checks to the server.
    pub fn create_instance_from(&self, options: Map<String, Value>) -> AkhetResult<String> {
        let payload: Payload = InstanceConfig::known_options(options).into_iter().collect();
        self.post_instance(&payload)
    }

    fn post_instance(&self, payload: &Payload) -> AkhetResult<String> {
        let data = self.execute("instance", "POST", payload, true)?;
        let created: CreatedInstance = serde_json::from_value(data)
            .map_err(|e| AkhetError::InvalidResponse(format!("instance creation: {e}")))?;
        Ok(created.token)
    }

    pub fn instance_info(&self, token: &str) -> AkhetResult<Value> {
        self.execute("instance", "GET", &Payload::new().with("token", token), true)
    }

    pub fn instance_resolution(&self, token: &str) -> AkhetResult<Value> {
        self.execute(
            "instance-resolution",
            "GET",
            &Payload::new().with("token", token),
            true,
        )
    }

    pub fn set_instance_resolution(&self, token: &str, width: u32, height: u32) -> AkhetResult<Value> {
        let payload = Payload::from_serializable(&ResolutionRequest {
            token: token.to_string(),
            width,
            height,
        })?;
        self.execute("instance-resolution", "POST", &payload, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::cache::MemoryCache;
    use crate::client::tests::{client_with, FakeTransport};
    use crate::http::HttpMethod;

    fn ok(data: Value) -> String {
        json!({"version": "0.8", "data": data}).to_string()
    }

    #[test]
    fn listings_use_fixed_resources() {
        let transport = FakeTransport::replying(&[
            (200, ok(json!({"hostname": "akhet"}))),
            (200, ok(json!(["ubuntu"]))),
            (200, ok(json!(["debian"]))),
        ]);
        let client = client_with(&transport);

        assert_eq!(client.host_info().unwrap(), json!({"hostname": "akhet"}));
        assert_eq!(client.list_images().unwrap(), json!(["ubuntu"]));
        assert_eq!(client.list_images_online().unwrap(), json!(["debian"]));

        let urls: Vec<String> = transport.sent().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            [
                "http://akhet.local/0.8/hostinfo",
                "http://akhet.local/0.8/imageslocal",
                "http://akhet.local/0.8/imagesonline",
            ]
        );
    }

    #[test]
    fn create_instance_sends_only_known_set_keys() {
        let transport = FakeTransport::replying(&[(200, ok(json!({"token": "t-1", "port": 6080})))]);
        let client = client_with(&transport);

        let options = match json!({"image": "ubuntu", "bogusKey": 1}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let token = client.create_instance_from(options).unwrap();
        assert_eq!(token, "t-1");

        let sent = transport.sent();
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].url, "http://akhet.local/0.8/instance");
        assert_eq!(sent[0].body, r#"{"image":"ubuntu"}"#);
    }

    #[test]
    fn loose_create_forwards_values_unchecked() {
        let transport = FakeTransport::replying(&[(200, ok(json!({"token": "t-2"})))]);
        let client = client_with(&transport);

        let options = match json!({"image": "ubuntu", "uid": "1000", "env": ["A=B"], "shared": null}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert_eq!(client.create_instance_from(options).unwrap(), "t-2");

        let body: Value = serde_json::from_str(&transport.sent()[0].body).unwrap();
        assert_eq!(body, json!({"image": "ubuntu", "uid": "1000", "env": ["A=B"]}));
    }

    #[test]
    fn create_instance_without_token_is_invalid_response() {
        let transport = FakeTransport::replying(&[(200, ok(json!({"status": "queued"})))]);
        let client = client_with(&transport);
        let err = client.create_instance(&InstanceConfig::default()).unwrap_err();
        assert!(matches!(err, AkhetError::InvalidResponse(_)));
    }

    #[test]
    fn instance_calls_bypass_the_cache() {
        let transport = FakeTransport::replying(&[
            (200, ok(json!({"status": "running"}))),
            (200, ok(json!({"status": "stopped"}))),
            (200, ok(json!({"width": 1024, "height": 768}))),
            (200, ok(json!({"width": 1024, "height": 768}))),
        ]);
        let mut client = client_with(&transport);
        client.set_cache(MemoryCache::new(), Duration::from_secs(30));

        assert_eq!(client.instance_info("t-1").unwrap()["status"], "running");
        assert_eq!(client.instance_info("t-1").unwrap()["status"], "stopped");
        client.instance_resolution("t-1").unwrap();
        client.instance_resolution("t-1").unwrap();
        assert_eq!(transport.sent().len(), 4);
        assert_eq!(transport.sent()[0].body, r#"{"token":"t-1"}"#);
    }

    #[test]
    fn set_resolution_posts_token_and_size() {
        let transport = FakeTransport::replying(&[(200, ok(json!({"width": 1280, "height": 720})))]);
        let client = client_with(&transport);
        client.set_instance_resolution("t-1", 1280, 720).unwrap();

        let sent = transport.sent();
        let sent = &sent[0];
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.url, "http://akhet.local/0.8/instance-resolution");
        let body: Value = serde_json::from_str(&sent.body).unwrap();
        assert_eq!(body, json!({"token": "t-1", "width": 1280, "height": 720}));
    }
}
