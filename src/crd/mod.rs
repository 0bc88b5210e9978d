//! # Custom Resource Definitions
//!
//! The `OsbInstance` custom resource: one record per service instance managed by the broker.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: brokernetes.io/v1
//! kind: OsbInstance
//! metadata:
//!   name: 5a6e1bd8-instance
//!   namespace: default
//!   finalizers:
//!     - brokernetes.io/osb-worker
//! spec:
//!   parameters:
//!     size: small
//! status:
//!   lastOperationType: Create
//!   conditions:
//!     - type: InProgress
//!       status: "True"
//!     - type: Ready
//!       status: "False"
//!     - type: Error
//!       status: "False"
//! ```
//!
//! Status is persisted on the main resource (there is no status subresource), so a single
//! conditional write stores spec and status together.

pub mod conditions;
pub mod status;

pub use conditions::*;
pub use status::*;

use crate::constants::{
    API_GROUP, API_VERSION, FINALIZER_NAME, INSTANCE_KIND, INSTANCE_PLURAL, INSTANCE_SINGULAR,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Desired state of a service instance
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsbInstanceSpec {
    /// Backend-specific provisioning parameters, opaque to the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    /// Output produced by the backend on a successful create or update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

/// OsbInstance custom resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsbInstance {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: OsbInstanceSpec,
    #[serde(default)]
    pub status: OsbInstanceStatus,
}

fn default_api_version() -> String {
    format!("{API_GROUP}/{API_VERSION}")
}

fn default_kind() -> String {
    INSTANCE_KIND.to_string()
}

impl Resource for OsbInstance {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(INSTANCE_KIND)
    }

    fn group(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(API_GROUP)
    }

    fn version(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(API_VERSION)
    }

    fn plural(_: &()) -> Cow<'_, str> {
        Cow::Borrowed(INSTANCE_PLURAL)
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl OsbInstance {
    pub fn new(name: &str, namespace: &str, spec: OsbInstanceSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec,
            status: OsbInstanceStatus::default(),
        }
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER_NAME)
    }

    /// Adds the controller finalizer. Returns false if it was already present.
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.finalizers_mut().push(FINALIZER_NAME.to_string());
        true
    }

    /// Removes the controller finalizer. Returns false if it was not present.
    pub fn remove_finalizer(&mut self) -> bool {
        let before = self.finalizers().len();
        self.finalizers_mut().retain(|f| f != FINALIZER_NAME);
        before != self.finalizers().len()
    }

    /// Whether the instance carries a deletion marker
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the stored parameters equal `parameters` (JSON equality, key order ignored)
    pub fn has_parameters(&self, parameters: &serde_json::Value) -> bool {
        self.spec.parameters.as_ref() == Some(parameters)
    }
}

/// CustomResourceDefinition manifest for `OsbInstance`
pub fn crd_manifest() -> serde_json::Value {
    let preserve = serde_json::json!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    });

    serde_json::json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": {
            "name": format!("{INSTANCE_PLURAL}.{API_GROUP}")
        },
        "spec": {
            "group": API_GROUP,
            "names": {
                "kind": INSTANCE_KIND,
                "plural": INSTANCE_PLURAL,
                "singular": INSTANCE_SINGULAR,
                "shortNames": ["osbi"]
            },
            "scope": "Namespaced",
            "versions": [{
                "name": API_VERSION,
                "served": true,
                "storage": true,
                "additionalPrinterColumns": [
                    {"name": "Operation", "type": "string", "jsonPath": ".status.lastOperationType"},
                    {"name": "InProgress", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"InProgress\")].status"},
                    {"name": "Ready", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"Ready\")].status"},
                    {"name": "Error", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"Error\")].status"}
                ],
                "schema": {
                    "openAPIV3Schema": {
                        "type": "object",
                        "properties": {
                            "spec": {
                                "type": "object",
                                "properties": {
                                    "parameters": preserve,
                                    "output": preserve
                                }
                            },
                            "status": preserve
                        }
                    }
                }
            }]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube_runtime::reflector::ObjectRef;

    #[test]
    fn test_finalizer_helpers() {
        let mut instance = OsbInstance::new("a", "default", OsbInstanceSpec::default());
        assert!(!instance.has_finalizer());
        assert!(instance.add_finalizer());
        assert!(!instance.add_finalizer());
        assert_eq!(instance.finalizers(), &[FINALIZER_NAME.to_string()]);
        assert!(instance.remove_finalizer());
        assert!(!instance.remove_finalizer());
    }

    #[test]
    fn test_serialization_uses_camel_case_and_type_meta() {
        let mut instance = OsbInstance::new(
            "a",
            "default",
            OsbInstanceSpec {
                parameters: Some(serde_json::json!({"k": "v"})),
                output: None,
            },
        );
        mark_in_progress(&mut instance.status, OperationType::Create);

        let value = serde_json::to_value(&instance).unwrap();
        assert_eq!(value["apiVersion"], "brokernetes.io/v1");
        assert_eq!(value["kind"], "OsbInstance");
        assert_eq!(value["spec"]["parameters"]["k"], "v");
        assert_eq!(value["status"]["lastOperationType"], "Create");
        assert_eq!(value["status"]["conditions"][0]["type"], "InProgress");
        assert_eq!(value["status"]["conditions"][0]["status"], "True");
    }

    #[test]
    fn test_object_ref_uses_namespace_and_name() {
        let instance = OsbInstance::new("a", "ns1", OsbInstanceSpec::default());
        let key = ObjectRef::from_obj(&instance);
        assert_eq!(key.name, "a");
        assert_eq!(key.namespace.as_deref(), Some("ns1"));
    }

    #[test]
    fn test_has_parameters_ignores_key_order() {
        let instance = OsbInstance::new(
            "a",
            "default",
            OsbInstanceSpec {
                parameters: Some(serde_json::json!({"b": 1, "a": 2})),
                output: None,
            },
        );
        let same: serde_json::Value = serde_json::from_str(r#"{"a":2,"b":1}"#).unwrap();
        assert!(instance.has_parameters(&same));
        assert!(!instance.has_parameters(&serde_json::json!({"a": 3})));
    }

    #[test]
    fn test_crd_manifest_names() {
        let crd = crd_manifest();
        assert_eq!(crd["metadata"]["name"], "osbinstances.brokernetes.io");
        assert_eq!(crd["spec"]["names"]["kind"], "OsbInstance");
        assert_eq!(crd["spec"]["scope"], "Namespaced");
    }
}
