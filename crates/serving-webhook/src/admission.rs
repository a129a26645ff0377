//! Helpers to decode the object carried by an [`AdmissionRequest`] and to build
//! [`AdmissionResponse`]s from the outcome of a mutation.
//!
//! A mutating handler typically decodes the request object with a [`Decoder`],
//! mutates its typed copy and hands both the original and the mutated object to
//! [`patch_response_from_raw`], which computes the RFC 6902 JSON patch.
use std::error::Error;

use kube::{
    Resource,
    core::{
        DynamicObject, Status,
        admission::{AdmissionRequest, AdmissionResponse},
    },
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu, ensure};

/// HTTP status code used for requests which carry an undecodable object.
pub const BAD_REQUEST: u16 = 400;

/// HTTP status code used for failures inside the webhook itself.
pub const INTERNAL_SERVER_ERROR: u16 = 500;

#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("there is no content to decode"))]
    MissingObject,

    #[snafu(display("failed to serialize the admission object"))]
    SerializeObject { source: serde_json::Error },

    #[snafu(display("failed to decode the admission object into {type_name}"))]
    DeserializeObject {
        source: serde_json::Error,
        type_name: &'static str,
    },

    #[snafu(display(
        "expected an object of type {expected_api_version}/{expected_kind}, got {api_version}/{kind}"
    ))]
    UnexpectedType {
        api_version: String,
        kind: String,
        expected_api_version: &'static str,
        expected_kind: &'static str,
    },
}

/// Decodes the object of an [`AdmissionRequest`] into a concrete type.
///
/// The decoder is stateless and cheap to copy. It operates on requests typed with
/// [`DynamicObject`], which keeps every field the API server sent, including fields
/// unknown to the target type.
#[derive(Clone, Copy, Debug, Default)]
pub struct Decoder;

impl Decoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes the request object into `T`.
    pub fn decode<T>(&self, request: &AdmissionRequest<DynamicObject>) -> Result<T, DecodeError>
    where
        T: DeserializeOwned,
    {
        let raw = self.decode_raw(request)?;
        serde_json::from_value(raw).context(DeserializeObjectSnafu {
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Returns the request object as plain JSON.
    ///
    /// This is the left-hand side when computing the patch of a mutation.
    pub fn decode_raw(&self, request: &AdmissionRequest<DynamicObject>) -> Result<Value, DecodeError> {
        let object = request.object.as_ref().context(MissingObjectSnafu)?;
        serde_json::to_value(object).context(SerializeObjectSnafu)
    }

    /// Ensures the raw object carries the given `apiVersion` and `kind`.
    ///
    /// Typed models with flattened catch-all fields accept any object, so the type has to be
    /// checked before decoding.
    pub fn check_type(
        &self,
        raw: &Value,
        expected_api_version: &'static str,
        expected_kind: &'static str,
    ) -> Result<(), DecodeError> {
        let api_version = str_field(raw, "apiVersion");
        let kind = str_field(raw, "kind");

        ensure!(
            api_version == expected_api_version && kind == expected_kind,
            UnexpectedTypeSnafu {
                api_version,
                kind,
                expected_api_version,
                expected_kind,
            }
        );

        Ok(())
    }
}

/// Builds a response which rejects the request with the given HTTP status `code`.
///
/// The message is rendered including all error sources, joined by `": "`.
pub fn errored<R>(request: &AdmissionRequest<R>, code: u16, error: &dyn Error) -> AdmissionResponse
where
    R: Resource,
{
    let message = error_chain(error);
    let reason = match code {
        BAD_REQUEST => "BadRequest",
        INTERNAL_SERVER_ERROR => "InternalError",
        _ => "Unknown",
    };

    let mut status = Status::failure(&message, reason);
    status.code = code;

    let mut response = AdmissionResponse::from(request).deny(message);
    response.result = status;
    response
}

/// Computes the JSON patch between `original` and `mutated` and returns it as an
/// allowed [`AdmissionResponse`].
///
/// If both objects are equal, the response is allowed and carries no patch at all.
pub fn patch_response_from_raw<R>(
    request: &AdmissionRequest<R>,
    original: &Value,
    mutated: &Value,
) -> AdmissionResponse
where
    R: Resource,
{
    let patch = json_patch::diff(original, mutated);
    if patch.0.is_empty() {
        return AdmissionResponse::from(request);
    }

    AdmissionResponse::from(request)
        .with_patch(patch)
        .unwrap_or_else(|err| errored(request, INTERNAL_SERVER_ERROR, &err))
}

fn str_field<'a>(raw: &'a Value, name: &str) -> &'a str {
    raw.get(name).and_then(Value::as_str).unwrap_or_default()
}

fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }

    message
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kube::core::admission::AdmissionReview;
    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Widget {
        spec: WidgetSpec,
    }

    #[derive(Debug, Deserialize)]
    struct WidgetSpec {
        replicas: u32,
    }

    fn request(object: Option<Value>) -> AdmissionRequest<DynamicObject> {
        let review: AdmissionReview<DynamicObject> = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "example.com", "version": "v1", "kind": "Widget"},
                "resource": {"group": "example.com", "version": "v1", "resource": "widgets"},
                "name": "my-widget",
                "namespace": "default",
                "operation": "CREATE",
                "userInfo": {"username": "admin"},
                "object": object,
                "oldObject": null,
                "dryRun": false
            }
        }))
        .expect("admission review fixture must deserialize");

        review
            .try_into()
            .expect("admission review fixture contains a request")
    }

    fn widget(replicas: &Value) -> Value {
        json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": "my-widget", "namespace": "default"},
            "spec": {"replicas": replicas}
        })
    }

    #[test]
    fn decodes_object() {
        let request = request(Some(widget(&json!(3))));

        let widget: Widget = Decoder::new().decode(&request).expect("widget must decode");

        assert_eq!(widget.spec.replicas, 3);
    }

    #[test]
    fn decode_raw_keeps_unknown_fields() {
        let mut object = widget(&json!(1));
        object["spec"]["somethingElse"] = json!({"nested": true});
        let request = request(Some(object.clone()));

        let raw = Decoder::new().decode_raw(&request).expect("raw object must decode");

        assert_eq!(raw, object);
    }

    #[test]
    fn missing_object_is_an_error() {
        let request = request(None);

        let err = Decoder::new()
            .decode::<Widget>(&request)
            .expect_err("request without object must not decode");

        assert!(matches!(err, DecodeError::MissingObject));
    }

    #[test]
    fn matching_type_passes_check() {
        let object = widget(&json!(1));

        Decoder::new()
            .check_type(&object, "example.com/v1", "Widget")
            .expect("widget must pass the type check");
    }

    #[rstest]
    #[case::other_kind(json!({"apiVersion": "v1", "kind": "ConfigMap"}), "v1/ConfigMap")]
    #[case::other_version(json!({"apiVersion": "example.com/v2", "kind": "Widget"}), "example.com/v2/Widget")]
    #[case::missing_type(json!({"metadata": {"name": "untyped"}}), "/")]
    fn mismatching_type_fails_check(#[case] object: Value, #[case] found: &str) {
        let err = Decoder::new()
            .check_type(&object, "example.com/v1", "Widget")
            .expect_err("foreign object must not pass the type check");

        assert!(matches!(err, DecodeError::UnexpectedType { .. }));
        assert_eq!(
            err.to_string(),
            format!("expected an object of type example.com/v1/Widget, got {found}")
        );
    }

    #[test]
    fn mismatching_object_maps_to_bad_request() {
        let request = request(Some(widget(&json!("three"))));

        let err = Decoder::new()
            .decode::<Widget>(&request)
            .expect_err("string replicas must not decode");
        let response = errored(&request, BAD_REQUEST, &err);

        assert!(!response.allowed);
        assert_eq!(response.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(response.result.code, 400);
        assert_eq!(response.result.reason, "BadRequest");
        assert!(
            response
                .result
                .message
                .starts_with("failed to decode the admission object into"),
            "unexpected message: {}",
            response.result.message
        );
        assert!(response.result.message.contains("invalid type"));
    }

    #[test]
    fn internal_errors_use_reason_internal_error() {
        let request = request(Some(widget(&json!(1))));
        let err = std::io::Error::other("boom");

        let response = errored(&request, INTERNAL_SERVER_ERROR, &err);

        assert!(!response.allowed);
        assert_eq!(response.result.code, 500);
        assert_eq!(response.result.reason, "InternalError");
        assert_eq!(response.result.message, "boom");
    }

    #[test]
    fn equal_objects_produce_no_patch() {
        let object = widget(&json!(1));
        let request = request(Some(object.clone()));

        let response = patch_response_from_raw(&request, &object, &object);

        assert!(response.allowed);
        assert_eq!(response.patch, None);
    }

    #[test]
    fn differing_objects_produce_json_patch() {
        let original = widget(&json!(1));
        let mut mutated = original.clone();
        mutated["metadata"]["labels"] = json!(BTreeMap::from([("app", "widget")]));
        let request = request(Some(original.clone()));

        let response = patch_response_from_raw(&request, &original, &mutated);

        assert!(response.allowed);
        let patch: Value = serde_json::from_slice(&response.patch.expect("patch must be set"))
            .expect("patch must be valid JSON");
        assert_eq!(
            patch,
            json!([{"op": "add", "path": "/metadata/labels", "value": {"app": "widget"}}])
        );
    }
}
