use serde_json::Value;

use crate::core::ApiError;
use crate::paginate::Record;

/// Where a page keeps its item list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemsKey {
    /// The items live under this top-level field.
    Named(String),
    /// Guess: the first field (in document order) other than the metadata field whose
    /// value is a list of objects. Every use is logged as a warning.
    #[deprecated(note = "configure the items key explicitly with `ItemsKey::Named`")]
    Heuristic,
}

impl ItemsKey {
    pub fn named(key: impl Into<String>) -> Self {
        Self::Named(key.into())
    }

    /// Pull the item list out of a page body.
    ///
    /// # Errors
    ///
    /// `ApiError::Data` when the body is not an object, the named field is
    /// missing, or it holds something other than a list of objects.
    #[allow(deprecated)]
    pub(crate) fn extract(
        &self,
        body: &Value,
        meta_key: &str,
        endpoint: &str,
    ) -> Result<Vec<Record>, ApiError> {
        let obj = body
            .as_object()
            .ok_or_else(|| ApiError::Data(format!("{endpoint}: page body is not a JSON object")))?;

        match self {
            Self::Named(key) => match obj.get(key) {
                Some(Value::Array(arr)) => to_records(arr, key),
                Some(Value::Null) => Ok(Vec::new()),
                Some(_) => Err(ApiError::Data(format!("{endpoint}: `{key}` is not a list"))),
                None => Err(ApiError::Data(format!(
                    "{endpoint}: items key `{key}` missing from page"
                ))),
            },
            Self::Heuristic => {
                let found = obj.iter().find(|(k, v)| {
                    k.as_str() != meta_key
                        && v.as_array()
                            .is_some_and(|arr| arr.iter().all(Value::is_object))
                });
                match found {
                    Some((key, Value::Array(arr))) => {
                        tracing::warn!(
                            event = "items_key_heuristic",
                            endpoint,
                            guessed = %key,
                            "items key guessed from page shape; configure it explicitly"
                        );
                        to_records(arr, key)
                    }
                    _ => {
                        tracing::warn!(
                            event = "items_key_heuristic",
                            endpoint,
                            fields = ?obj.keys().collect::<Vec<_>>(),
                            "no list of objects found in page, yielding no items"
                        );
                        Ok(Vec::new())
                    }
                }
            }
        }
    }
}

fn to_records(arr: &[Value], key: &str) -> Result<Vec<Record>, ApiError> {
    arr.iter()
        .map(|v| match v {
            Value::Object(m) => Ok(m.clone()),
            other => Err(ApiError::Data(format!(
                "item under `{key}` is not an object: {other}"
            ))),
        })
        .collect()
}
