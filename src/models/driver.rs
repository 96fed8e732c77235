use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::datetime_format;
use crate::filter::{Filterable, Value};

/// Row of the `driver` table
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Driver {
    pub id: i64,
    pub driver_name: String,
    pub license_plate: String,
    pub contact: String,
    pub creater: String,
    #[serde(skip_serializing)]
    pub openid: String,
    pub is_delete: bool,
    #[serde(with = "datetime_format")]
    pub create_time: NaiveDateTime,
    #[serde(with = "datetime_format")]
    pub update_time: NaiveDateTime,
}

/// Values for a row about to be inserted
#[derive(Debug, Clone)]
pub struct NewDriver {
    pub openid: String,
    pub driver_name: String,
    pub license_plate: String,
    pub contact: String,
    pub creater: String,
}

/// Client-writable driver fields as they arrive in a request body.
/// Anything else the client sends (`openid`, `is_delete`, timestamps) is dropped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverPayload {
    pub driver_name: Option<String>,
    pub license_plate: Option<String>,
    pub contact: Option<String>,
    pub creater: Option<String>,
}

impl Filterable for Driver {
    fn id(&self) -> i64 {
        self.id
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::Int(self.id)),
            "driver_name" => Some(Value::Text(self.driver_name.clone())),
            "license_plate" => Some(Value::Text(self.license_plate.clone())),
            "contact" => Some(Value::Text(self.contact.clone())),
            "creater" => Some(Value::Text(self.creater.clone())),
            "create_time" => Some(Value::DateTime(self.create_time)),
            "update_time" => Some(Value::DateTime(self.update_time)),
            _ => None,
        }
    }
}
