use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

pub const TYPE_FOLDER: &str = "Folder";
pub const TYPE_DATACENTER: &str = "Datacenter";
pub const TYPE_CLUSTER: &str = "ClusterComputeResource";
pub const TYPE_VIRTUAL_MACHINE: &str = "VirtualMachine";

/// ManagedObjectReference. Equality is by type and id only.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct MoRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl MoRef {
    pub fn new(kind: &str, value: &str) -> Self {
        MoRef {
            kind: kind.to_string(),
            value: value.to_string(),
        }
    }
}

impl Serialize for MoRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ManagedObjectReference", 3)?;
        s.serialize_field("_typeName", "ManagedObjectReference")?;
        s.serialize_field("type", &self.kind)?;
        s.serialize_field("value", &self.value)?;
        s.end()
    }
}

impl fmt::Display for MoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContent {
    pub root_folder: MoRef,
    pub property_collector: MoRef,
    pub view_manager: MoRef,
    pub session_manager: MoRef,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DynamicProperty {
    pub name: String,
    pub val: Value,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectContent {
    pub obj: MoRef,
    #[serde(default)]
    pub prop_set: Vec<DynamicProperty>,
}

impl ObjectContent {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.prop_set.iter().find(|p| p.name == name).map(|p| &p.val)
    }

    /// Primitive values arrive boxed as {"_typeName": "string", "_value": ...}
    pub fn string_property(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(|val| match val {
            Value::String(s) => Some(s.as_str()),
            Value::Object(boxed) => boxed.get("_value").and_then(Value::as_str),
            _ => None,
        })
    }

    pub fn moref_property(&self, name: &str) -> Option<MoRef> {
        self.property(name)
            .and_then(|val| serde_json::from_value(val.clone()).ok())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RetrieveResult {
    #[serde(default)]
    pub objects: Vec<ObjectContent>,
    pub token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVmGroup {
    pub name: String,
    #[serde(default)]
    pub vm: Vec<MoRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_created: Option<bool>,
    #[serde(rename = "uniqueID", skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
}

/// Entries of ClusterConfigInfoEx.group. Host groups and any other kinds are
/// kept opaque, only VM groups are ever edited.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "_typeName")]
pub enum ClusterGroupInfo {
    ClusterVmGroup(ClusterVmGroup),
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ClusterConfigInfoEx {
    #[serde(default)]
    pub group: Vec<ClusterGroupInfo>,
}

/// Body of a non-2xx response
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Fault {
    #[serde(rename = "_typeName", default)]
    pub type_name: String,
    #[serde(default)]
    pub fault_message: Vec<LocalizableMessage>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct LocalizableMessage {
    #[serde(default)]
    pub message: String,
}

impl Fault {
    pub fn message(&self) -> String {
        let messages: Vec<&str> = self
            .fault_message
            .iter()
            .map(|m| m.message.as_str())
            .filter(|m| !m.is_empty())
            .collect();
        if messages.is_empty() {
            self.type_name.clone()
        } else {
            messages.join("; ")
        }
    }
}
