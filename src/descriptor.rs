use std::{fmt, str::FromStr};

use serde::Deserialize;
use serde_json::Value;

use crate::DescriptorError;

/// HTTP methods used by the remote API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = DescriptorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(DescriptorError::UnsupportedMethod(value.to_owned())),
        }
    }
}

/// One logical remote operation: endpoint, method and optional payload.
///
/// GET payloads are sent as query parameters and must therefore be JSON
/// objects; every other method sends the payload as a JSON body.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawDescriptor")]
pub struct CallDescriptor {
    endpoint: String,
    method: Method,
    payload: Option<Value>,
}

impl CallDescriptor {
    /// Creates a descriptor, validating the endpoint and payload shape.
    pub fn new(
        method: Method,
        endpoint: impl Into<String>,
        payload: Option<Value>,
    ) -> Result<Self, DescriptorError> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with('/') {
            return Err(DescriptorError::InvalidEndpoint(endpoint));
        }
        // A null payload carries nothing either way.
        let payload = payload.filter(|value| !value.is_null());
        if method == Method::Get && payload.as_ref().is_some_and(|value| !value.is_object()) {
            return Err(DescriptorError::NonObjectQuery);
        }
        Ok(Self {
            endpoint,
            method,
            payload,
        })
    }

    pub fn get(endpoint: impl Into<String>) -> Result<Self, DescriptorError> {
        Self::new(Method::Get, endpoint, None)
    }

    pub fn post(endpoint: impl Into<String>, payload: Value) -> Result<Self, DescriptorError> {
        Self::new(Method::Post, endpoint, Some(payload))
    }

    pub fn patch(endpoint: impl Into<String>, payload: Value) -> Result<Self, DescriptorError> {
        Self::new(Method::Patch, endpoint, Some(payload))
    }

    pub fn delete(endpoint: impl Into<String>) -> Result<Self, DescriptorError> {
        Self::new(Method::Delete, endpoint, None)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Flattens a GET payload into query pairs.
    ///
    /// Strings are sent verbatim, other scalars as their JSON text, arrays and
    /// objects as compact JSON. Nulls are skipped.
    pub(crate) fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(Value::Object(map)) = self.payload.as_ref().filter(|_| self.method == Method::Get)
        else {
            return Vec::new();
        };
        map.iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                Some((key.clone(), text))
            })
            .collect()
    }

    /// JSON body for non-GET methods.
    pub(crate) fn body(&self) -> Option<&Value> {
        match self.method {
            Method::Get => None,
            _ => self.payload.as_ref(),
        }
    }
}

#[derive(Deserialize)]
struct RawDescriptor {
    endpoint: String,
    method: String,
    #[serde(default)]
    payload: Option<Value>,
}

impl TryFrom<RawDescriptor> for CallDescriptor {
    type Error = DescriptorError;

    fn try_from(raw: RawDescriptor) -> Result<Self, Self::Error> {
        Self::new(raw.method.parse()?, raw.endpoint, raw.payload)
    }
}
