//! Request body for `POST /invocations`

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// A single feature value as submitted by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Null,
    Number(f64),
    Text(String),
}

impl FeatureValue {
    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureValue::Null => "null",
            FeatureValue::Number(_) => "number",
            FeatureValue::Text(_) => "string",
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

impl<'de> Deserialize<'de> for FeatureValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FeatureValueVisitor;

        impl<'de> Visitor<'de> for FeatureValueVisitor {
            type Value = FeatureValue;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string, number, boolean or null feature value")
            }

            fn visit_unit<E: de::Error>(self) -> Result<FeatureValue, E> {
                Ok(FeatureValue::Null)
            }

            fn visit_none<E: de::Error>(self) -> Result<FeatureValue, E> {
                Ok(FeatureValue::Null)
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<FeatureValue, E> {
                Ok(FeatureValue::Number(if v { 1.0 } else { 0.0 }))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<FeatureValue, E> {
                Ok(FeatureValue::Number(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<FeatureValue, E> {
                Ok(FeatureValue::Number(v as f64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<FeatureValue, E> {
                Ok(FeatureValue::Number(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FeatureValue, E> {
                Ok(FeatureValue::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<FeatureValue, E> {
                Ok(FeatureValue::Text(v))
            }
        }

        deserializer.deserialize_any(FeatureValueVisitor)
    }
}

/// One input record. Keys keep the order they appear in the request body.
#[derive(Debug, Clone, Default)]
pub struct Instance {
    entries: Vec<(String, FeatureValue)>,
    /// Key -> position in `entries`
    index: HashMap<String, usize>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Set a feature; an existing key is overwritten in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        let name = name.into();
        let value = value.into();
        match self.index.get(&name) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
            }
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.index.get(name).map(|&pos| &self.entries[pos].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<'de> Deserialize<'de> for Instance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct InstanceVisitor;

        impl<'de> Visitor<'de> for InstanceVisitor {
            type Value = Instance;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of feature name to value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Instance, A::Error> {
                let mut instance = Instance::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, value)) = map.next_entry::<String, FeatureValue>()? {
                    instance.insert(name, value);
                }
                Ok(instance)
            }
        }

        deserializer.deserialize_map(InstanceVisitor)
    }
}

/// Body of an invocation request: `{"instances": [{feature: value, ...}, ...]}`
///
/// Only a JSON object is accepted. Other top-level keys are ignored.
#[derive(Debug, Clone, Default)]
pub struct InvocationRequest {
    /// Absent or null means no instances
    pub instances: Vec<Instance>,
}

impl<'de> Deserialize<'de> for InvocationRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RequestVisitor;

        impl<'de> Visitor<'de> for RequestVisitor {
            type Value = InvocationRequest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(r#"an object of the form {"instances": [...]}"#)
            }

            fn visit_map<A>(self, mut map: A) -> Result<InvocationRequest, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut instances: Option<Vec<Instance>> = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key == "instances" {
                        if instances.is_some() {
                            return Err(de::Error::duplicate_field("instances"));
                        }
                        let value: Option<Vec<Instance>> = map.next_value()?;
                        instances = Some(value.unwrap_or_default());
                    } else {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
                Ok(InvocationRequest {
                    instances: instances.unwrap_or_default(),
                })
            }
        }

        deserializer.deserialize_map(RequestVisitor)
    }
}
