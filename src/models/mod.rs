mod dispatch_list;
mod driver;

pub use dispatch_list::*;
pub use driver::*;

/// Timestamps go over the wire as `YYYY-MM-DD HH:MM:SS`
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) mod datetime_format {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    use super::DATETIME_FORMAT;

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(DATETIME_FORMAT))
    }
}
