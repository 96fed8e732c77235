use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

use super::datetime_format;
use crate::filter::{Filterable, Value};

/// Row of the `dispatchlist` table. Written by the dispatch workflow, read-only here.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct DispatchList {
    pub id: i64,
    pub driver_name: String,
    pub dn_code: String,
    pub contact: String,
    pub creater: String,
    #[serde(skip_serializing)]
    pub openid: String,
    #[serde(with = "datetime_format")]
    pub create_time: NaiveDateTime,
    #[serde(with = "datetime_format")]
    pub update_time: NaiveDateTime,
}

impl Filterable for DispatchList {
    fn id(&self) -> i64 {
        self.id
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        match field {
            "id" => Some(Value::Int(self.id)),
            "driver_name" => Some(Value::Text(self.driver_name.clone())),
            "dn_code" => Some(Value::Text(self.dn_code.clone())),
            "contact" => Some(Value::Text(self.contact.clone())),
            "creater" => Some(Value::Text(self.creater.clone())),
            "create_time" => Some(Value::DateTime(self.create_time)),
            "update_time" => Some(Value::DateTime(self.update_time)),
            _ => None,
        }
    }
}
