//! A minimal model of the `KnativeServing` custom resource owned by the Knative operator.
//!
//! Only the fields the webhook reads or writes are typed. Everything else is kept in
//! flattened maps, so a decode followed by an encode reproduces the object the API server
//! sent and the resulting JSON patch touches nothing but the mutated path.
use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const GROUP: &str = "operator.knative.dev";
pub const VERSION: &str = "v1alpha1";
pub const API_VERSION: &str = "operator.knative.dev/v1alpha1";
pub const KIND: &str = "KnativeServing";
pub const PLURAL: &str = "knativeservings";

/// Settings of a single config group. A `null` setting is treated as unset.
pub type ConfigGroup = BTreeMap<String, Option<String>>;

/// Nested configuration of the Knative components, keyed by config group (for example
/// `network`) and then by setting name. A `null` group is treated as unset.
pub type ConfigMaps = BTreeMap<String, Option<ConfigGroup>>;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct KnativeServing {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<KnativeServingSpec>,

    /// `apiVersion`, `kind`, `status` and anything else not modelled above.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct KnativeServingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigMaps>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl KnativeServing {
    /// Returns the configured value of `key` within `group`, if any.
    pub fn config_value(&self, group: &str, key: &str) -> Option<&str> {
        self.spec
            .as_ref()?
            .config
            .as_ref()?
            .get(group)?
            .as_ref()?
            .get(key)?
            .as_deref()
    }

    /// Returns the config group, creating the spec, the config map and the group on the way
    /// if they are unset or `null`.
    pub fn config_group_mut(&mut self, group: &str) -> &mut ConfigGroup {
        self.spec
            .get_or_insert_default()
            .config
            .get_or_insert_default()
            .entry(group.to_owned())
            .or_default()
            .get_or_insert_default()
    }
}
