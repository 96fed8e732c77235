// Action -> payload schema mapping
//
// Each request resolves its action to exactly one schema up front; resources
// that don't support an action fail with MethodNotAllowed right here.

use axum::http::Method;

use crate::error::{ApiError, FieldErrors};
use crate::models::{Driver, DriverPayload};

pub const MAX_FIELD_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Retrieve,
    Create,
    Update,
    PartialUpdate,
    Destroy,
    Export,
}

impl Action {
    /// Action a non-GET verb maps to. GET is list or retrieve depending on the route.
    pub fn for_write(method: &Method) -> Option<Self> {
        match method.as_str() {
            "POST" => Some(Action::Create),
            "PUT" => Some(Action::Update),
            "PATCH" => Some(Action::PartialUpdate),
            "DELETE" => Some(Action::Destroy),
            _ => None,
        }
    }

    /// HTTP verb the action is routed under
    pub fn method(self) -> &'static str {
        match self {
            Action::List | Action::Retrieve | Action::Export => "GET",
            Action::Create => "POST",
            Action::Update => "PUT",
            Action::PartialUpdate => "PATCH",
            Action::Destroy => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Driver,
    DispatchList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    DriverGet,
    DriverPost,
    DriverUpdate,
    DriverPartialUpdate,
    DispatchListGet,
    FileRender,
}

impl Resource {
    pub fn schema(self, action: Action) -> Result<Schema, ApiError> {
        let schema = match (self, action) {
            (Resource::Driver, Action::List | Action::Retrieve | Action::Destroy) => {
                Schema::DriverGet
            }
            (Resource::Driver, Action::Create) => Schema::DriverPost,
            (Resource::Driver, Action::Update) => Schema::DriverUpdate,
            (Resource::Driver, Action::PartialUpdate) => Schema::DriverPartialUpdate,
            (Resource::Driver, Action::Export) => Schema::FileRender,
            (Resource::DispatchList, Action::List | Action::Retrieve) => Schema::DispatchListGet,
            (Resource::DispatchList, other) => {
                return Err(ApiError::MethodNotAllowed(other.method().to_string()))
            }
        };
        Ok(schema)
    }
}

/// Writable driver fields after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverFields {
    pub driver_name: Option<String>,
    pub license_plate: Option<String>,
    pub contact: Option<String>,
    pub creater: Option<String>,
}

impl DriverFields {
    /// Copy supplied fields onto `driver`, leaving the rest untouched
    pub fn apply(self, driver: &mut Driver) {
        if let Some(v) = self.driver_name {
            driver.driver_name = v;
        }
        if let Some(v) = self.license_plate {
            driver.license_plate = v;
        }
        if let Some(v) = self.contact {
            driver.contact = v;
        }
        if let Some(v) = self.creater {
            driver.creater = v;
        }
    }
}

impl Schema {
    fn requires_all_fields(self) -> bool {
        matches!(self, Schema::DriverPost | Schema::DriverUpdate)
    }

    /// Validate a driver payload against this schema
    pub fn validate(self, payload: DriverPayload) -> Result<DriverFields, ApiError> {
        let mut errors = FieldErrors::new();
        let required = self.requires_all_fields();

        let mut check = |name: &str, value: Option<String>| -> Option<String> {
            let value = value.map(|v| v.trim().to_string());
            match &value {
                None if required => {
                    errors
                        .entry(name.to_string())
                        .or_default()
                        .push("This field is required.".to_string());
                }
                Some(v) if v.chars().count() > MAX_FIELD_LEN => {
                    errors.entry(name.to_string()).or_default().push(format!(
                        "Ensure this field has no more than {} characters.",
                        MAX_FIELD_LEN
                    ));
                }
                Some(v) if v.is_empty() && name == "driver_name" => {
                    errors
                        .entry(name.to_string())
                        .or_default()
                        .push("This field may not be blank.".to_string());
                }
                _ => {}
            }
            value
        };

        let fields = DriverFields {
            driver_name: check("driver_name", payload.driver_name),
            license_plate: check("license_plate", payload.license_plate),
            contact: check("contact", payload.contact),
            creater: check("creater", payload.creater),
        };

        if errors.is_empty() {
            Ok(fields)
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}
