//! The entity JSON shape and its metadata envelope.
//!
//! An entity is a `serde_json::Value` object with a required string `id`. Sync
//! metadata (last-modified timestamp, local-only flag) rides along under a reserved
//! `_kmd` key rather than as a typed wrapper, so the rest of the object passes through
//! untouched to and from the Entity Store and Network Gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};

pub const ID_FIELD: &str = "id";
pub const KMD_FIELD: &str = "_kmd";

/// Sync metadata carried on every entity under `_kmd`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Kmd {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lmt: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub local: bool,
}

fn is_false(b: &bool) -> bool {
    !b
}

/// Mints a client-side id for an entity created while offline. A UUID v4 avoids
/// collisions across processes sharing the same remote collection.
pub fn generate_temp_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn entity_id(entity: &Value) -> Option<&str> {
    entity.get(ID_FIELD).and_then(Value::as_str)
}

pub fn set_entity_id(entity: &mut Value, id: &str) -> Result<()> {
    entity
        .as_object_mut()
        .ok_or_else(|| Error::InvalidArgument("entity must be a JSON object".into()))?
        .insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Ok(())
}

pub fn entity_kmd(entity: &Value) -> Kmd {
    entity
        .get(KMD_FIELD)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

pub fn set_entity_kmd(entity: &mut Value, kmd: &Kmd) -> Result<()> {
    let obj = entity
        .as_object_mut()
        .ok_or_else(|| Error::InvalidArgument("entity must be a JSON object".into()))?;
    obj.insert(KMD_FIELD.to_string(), serde_json::to_value(kmd)?);
    Ok(())
}

/// Strips `id` and the `_kmd` envelope, per the push algorithm's local-create step:
/// the server mints the canonical id, so neither the temp id nor local-only metadata
/// should cross the wire.
pub fn strip_metadata(entity: &Value) -> Value {
    let mut stripped = entity.clone();
    if let Some(obj) = stripped.as_object_mut() {
        obj.remove(ID_FIELD);
        obj.remove(KMD_FIELD);
    }
    stripped
}

/// The latest `lmt` watermark across a set of cached entities, used to drive delta
/// fetch. `None` when the cache holds no entity with a recorded `lmt` (forces a
/// full fetch).
pub fn max_lmt(entities: &[Value]) -> Option<i64> {
    entities
        .iter()
        .filter_map(|e| entity_kmd(e).lmt)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kmd_round_trips_through_entity() {
        let mut entity = json!({"id": "a1"});
        let kmd = Kmd { lmt: Some(42), local: true };
        set_entity_kmd(&mut entity, &kmd).unwrap();
        assert_eq!(entity_kmd(&entity), kmd);
    }

    #[test]
    fn missing_kmd_defaults_to_not_local() {
        let entity = json!({"id": "a1"});
        assert_eq!(entity_kmd(&entity), Kmd::default());
    }

    #[test]
    fn strip_metadata_removes_id_and_kmd() {
        let mut entity = json!({"id": "a1", "name": "x"});
        set_entity_kmd(&mut entity, &Kmd { lmt: None, local: true }).unwrap();
        let stripped = strip_metadata(&entity);
        assert!(stripped.get(ID_FIELD).is_none());
        assert!(stripped.get(KMD_FIELD).is_none());
        assert_eq!(stripped.get("name").unwrap(), "x");
    }

    #[test]
    fn max_lmt_ignores_entities_without_one() {
        let a = json!({"id": "a"});
        let mut b = json!({"id": "b"});
        set_entity_kmd(&mut b, &Kmd { lmt: Some(7), local: false }).unwrap();
        assert_eq!(max_lmt(&[a, b]), Some(7));
    }

    #[test]
    fn max_lmt_empty_is_none() {
        assert_eq!(max_lmt(&[]), None);
    }
}
