//! JSON exports (Notion pages, saved API responses).

use serde_json::{Map, Value};

use super::{strip_bom, RawRecord};
use crate::error::ParseError;

/// Wrapper fields searched, in order, when the document is an object and no
/// `array_field` is given.
const WRAPPER_FIELDS: [&str; 3] = ["results", "data", "items"];

/// Parses a JSON document into records.
///
/// The document may be an array of objects, an object wrapping such an
/// array (under `array_field`, or else `results`, `data` or `items`), or a
/// single object, which becomes one record. With `flatten`, nested objects
/// are folded into dotted keys (`properties.size`).
///
/// # Errors
///
/// - [`ParseError::Json`] for malformed JSON.
/// - [`ParseError::NotAnArray`] if `array_field` is missing or not an array.
/// - [`ParseError::NotAnObject`] if any element is not an object.
pub fn parse_json(
    bytes: &[u8],
    array_field: Option<&str>,
    flatten: bool,
) -> Result<Vec<RawRecord>, ParseError> {
    let document: Value = serde_json::from_slice(strip_bom(bytes))?;

    let items = match document {
        Value::Array(items) => items,
        Value::Object(mut object) => {
            if let Some(field) = array_field {
                match object.remove(field) {
                    Some(Value::Array(items)) => items,
                    _ => {
                        return Err(ParseError::NotAnArray {
                            field: field.to_owned(),
                        })
                    }
                }
            } else if let Some(field) = WRAPPER_FIELDS
                .iter()
                .find(|f| object.get(**f).is_some_and(Value::is_array))
            {
                match object.remove(*field) {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                }
            } else {
                vec![Value::Object(object)]
            }
        }
        _ => return Err(ParseError::NotAnObject { index: 0 }),
    };

    let records = records_from_values(items)?;
    tracing::debug!(records = records.len(), flatten, "parsed structured source");
    if flatten {
        Ok(records.into_iter().map(flatten_record).collect())
    } else {
        Ok(records)
    }
}

/// Converts already-decoded JSON values (for example API order payloads)
/// into records.
///
/// # Errors
///
/// Returns [`ParseError::NotAnObject`] for the first non-object element.
pub fn records_from_values(values: Vec<Value>) -> Result<Vec<RawRecord>, ParseError> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::Object(record) => Ok(record),
            _ => Err(ParseError::NotAnObject { index }),
        })
        .collect()
}

fn flatten_record(record: RawRecord) -> RawRecord {
    let mut flat = Map::new();
    flatten_into(&mut flat, None, record);
    flat
}

fn flatten_into(out: &mut RawRecord, prefix: Option<&str>, object: Map<String, Value>) {
    for (key, value) in object {
        let key = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key,
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => flatten_into(out, Some(&key), nested),
            other => {
                out.insert(key, other);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_top_level_array() {
        let records = parse_json(br#"[{"id": "a"}, {"id": "b"}]"#, None, false).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["id"], "b");
    }

    #[test]
    fn finds_wrapped_arrays() {
        let records = parse_json(br#"{"object": "list", "results": [{"id": "p1"}]}"#, None, false)
            .unwrap();
        assert_eq!(records[0]["id"], "p1");

        let records =
            parse_json(br#"{"orders": [{"orderNumber": "1"}]}"#, Some("orders"), false).unwrap();
        assert_eq!(records[0]["orderNumber"], "1");
    }

    #[test]
    fn explicit_field_must_be_an_array() {
        let err = parse_json(br#"{"orders": {"n": 1}}"#, Some("orders"), false).unwrap_err();
        assert!(matches!(err, ParseError::NotAnArray { field } if field == "orders"));
    }

    #[test]
    fn single_object_is_one_record() {
        let records = parse_json(br#"{"id": "solo", "name": "Samba OG"}"#, None, false).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "Samba OG");
    }

    #[test]
    fn flattens_nested_objects_into_dotted_keys() {
        let input = json!([{
            "id": "p1",
            "properties": { "size": { "select": { "name": "42" } }, "tags": ["a"] },
            "empty": {}
        }]);
        let records = parse_json(input.to_string().as_bytes(), None, true).unwrap();
        assert_eq!(records[0]["properties.size.select.name"], "42");
        assert_eq!(records[0]["properties.tags"], json!(["a"]));
        assert_eq!(records[0]["empty"], json!({}));
    }

    #[test]
    fn rejects_scalars_and_non_object_items() {
        assert!(matches!(
            parse_json(b"[{}, 3]", None, false),
            Err(ParseError::NotAnObject { index: 1 })
        ));
        assert!(matches!(
            parse_json(b"\"text\"", None, false),
            Err(ParseError::NotAnObject { index: 0 })
        ));
        assert!(matches!(parse_json(b"{", None, false), Err(ParseError::Json(_))));
    }
}
