// Streaming CSV export of the requester's drivers
//
// A spawned task drives one store cursor and pushes records into a bounded
// channel; the response body pulls from it and encodes one row at a time.
// An error mid-way ends the body with that error. Rows already sent stay sent.

use std::sync::Arc;

use axum::body::Bytes;
use chrono::{DateTime, Local};
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::auth::Requester;
use crate::db::{DriverStore, StoreError};
use crate::error::ApiError;
use crate::filter::DRIVER_FILTERS;
use crate::models::{Driver, DATETIME_FORMAT};
use crate::schema::{Action, Resource};

/// Records buffered between the store cursor and the response body
const EXPORT_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Header language, picked by the `lang` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    ZhHans,
    En,
}

impl Locale {
    pub fn from_params(params: &[(String, String)]) -> Self {
        let lang = params
            .iter()
            .find(|(k, _)| k == "lang")
            .map(|(_, v)| v.as_str());
        match lang {
            Some("zh-hans") => Locale::ZhHans,
            _ => Locale::En,
        }
    }

    /// Column labels, in the same order as [`row`]
    pub fn header(self) -> [&'static str; 6] {
        match self {
            Locale::ZhHans => ["司机名称", "车牌号", "联系方式", "创建人", "创建时间", "更新时间"],
            Locale::En => [
                "Driver Name",
                "License Plate",
                "Contact",
                "Creater",
                "Create Time",
                "Update Time",
            ],
        }
    }
}

fn row(driver: &Driver) -> [String; 6] {
    [
        driver.driver_name.clone(),
        driver.license_plate.clone(),
        driver.contact.clone(),
        driver.creater.clone(),
        driver.create_time.format(DATETIME_FORMAT).to_string(),
        driver.update_time.format(DATETIME_FORMAT).to_string(),
    ]
}

fn encode<I, T>(fields: I) -> Result<Bytes, ExportError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    let buffer = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(Bytes::from(buffer))
}

/// `driverlist_<YYYYMMDDHHMMSSffffff>.csv`
pub fn export_filename(at: DateTime<Local>) -> String {
    format!("driverlist_{}.csv", at.format("%Y%m%d%H%M%S%6f"))
}

pub type CsvStream = BoxStream<'static, Result<Bytes, ExportError>>;

pub struct CsvExport {
    pub filename: String,
    pub body: CsvStream,
}

#[derive(Clone)]
pub struct ExportService {
    store: Arc<dyn DriverStore>,
}

impl ExportService {
    pub fn new(store: Arc<dyn DriverStore>) -> Self {
        Self { store }
    }

    /// Start an export. Filters and ordering match the driver list; there is
    /// no pagination. Anonymous callers get a header-only file.
    pub fn export(
        &self,
        requester: &Requester,
        params: &[(String, String)],
    ) -> Result<CsvExport, ApiError> {
        Resource::Driver.schema(Action::Export)?;
        let criteria = DRIVER_FILTERS.parse(params)?;
        let locale = Locale::from_params(params);
        let filename = export_filename(Local::now());

        let (tx, rx) = mpsc::channel::<Result<Driver, StoreError>>(EXPORT_BUFFER);
        if let Some(query) = requester.scope(criteria) {
            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(e) = store.scan(&query, &tx).await {
                    tracing::error!("Export scan failed: {}", e);
                    let _ = tx.send(Err(e)).await;
                }
            });
        }

        let records = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|record| (record, rx))
        });
        let rows = records.map(|record| {
            let driver = record?;
            encode(row(&driver))
        });
        let body = stream::once(async move { encode(locale.header()) })
            .chain(rows)
            .boxed();

        tracing::info!("Export {} started ({:?})", filename, locale);
        Ok(CsvExport { filename, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ScopedQuery;
    use crate::db::{now, MemoryStore, RecordSink};
    use crate::models::NewDriver;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use futures_util::TryStreamExt;

    fn params(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn new_driver(owner: &str, name: &str) -> NewDriver {
        NewDriver {
            openid: owner.to_string(),
            driver_name: name.to_string(),
            license_plate: "ABC-123".to_string(),
            contact: "555-0100".to_string(),
            creater: "admin".to_string(),
        }
    }

    async fn seeded() -> ExportService {
        let store = Arc::new(MemoryStore::new());
        let mut gone = store.insert(new_driver("u1", "Gone")).await.unwrap();
        gone.is_delete = true;
        store.save(&gone).await.unwrap();

        for (owner, name) in [("u1", "Bob"), ("u1", "Alice, Jr."), ("u2", "Eve")] {
            store.insert(new_driver(owner, name)).await.unwrap();
        }
        ExportService::new(store)
    }

    /// Yields one row, then fails
    struct FailingStore;

    #[async_trait]
    impl DriverStore for FailingStore {
        async fn find(&self, _id: i64) -> Result<Option<Driver>, StoreError> {
            Ok(None)
        }

        async fn name_taken(
            &self,
            _owner: &str,
            _driver_name: &str,
            _exclude_id: Option<i64>,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn insert(&self, _new: NewDriver) -> Result<Driver, StoreError> {
            Err(StoreError::Missing(0))
        }

        async fn save(&self, driver: &Driver) -> Result<Driver, StoreError> {
            Err(StoreError::Missing(driver.id))
        }

        async fn count(&self, _query: &ScopedQuery) -> Result<i64, StoreError> {
            Ok(0)
        }

        async fn fetch(
            &self,
            _query: &ScopedQuery,
            _offset: i64,
            _limit: i64,
        ) -> Result<Vec<Driver>, StoreError> {
            Ok(Vec::new())
        }

        async fn scan(
            &self,
            query: &ScopedQuery,
            sink: &RecordSink<Driver>,
        ) -> Result<(), StoreError> {
            let timestamp = now();
            let driver = Driver {
                id: 1,
                driver_name: "Bob".to_string(),
                license_plate: "ABC-123".to_string(),
                contact: "555-0100".to_string(),
                creater: "admin".to_string(),
                openid: query.owner.clone(),
                is_delete: false,
                create_time: timestamp,
                update_time: timestamp,
            };
            let _ = sink.send(Ok(driver)).await;
            Err(StoreError::Missing(99))
        }
    }

    async fn collect(export: CsvExport) -> Vec<String> {
        let chunks: Vec<Bytes> = export.body.try_collect().await.unwrap();
        let text = String::from_utf8(chunks.concat()).unwrap();
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn lang_selects_header() {
        assert_eq!(Locale::from_params(&params(&[("lang", "zh-hans")])), Locale::ZhHans);
        assert_eq!(Locale::from_params(&params(&[("lang", "en")])), Locale::En);
        assert_eq!(Locale::from_params(&[]), Locale::En);
    }

    #[test]
    fn filename_has_fixed_width_timestamp() {
        let at = Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(export_filename(at), "driverlist_20240305070809000000.csv");
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let bytes = encode(["a, b", "c"]).unwrap();
        assert_eq!(&bytes[..], b"\"a, b\",c\r\n");
    }

    #[tokio::test]
    async fn locales_share_rows_and_differ_in_header() {
        let service = seeded().await;

        let zh = collect(
            service
                .export(&Requester::new("u1"), &params(&[("lang", "zh-hans")]))
                .unwrap(),
        )
        .await;
        let en = collect(
            service
                .export(&Requester::new("u1"), &params(&[("lang", "en")]))
                .unwrap(),
        )
        .await;

        assert_eq!(zh.len(), 3);
        assert_eq!(en.len(), 3);
        assert_ne!(zh[0], en[0]);
        assert!(zh[0].starts_with("司机名称"));
        assert_eq!(zh[1..], en[1..]);
        // default ordering is newest first
        assert!(en[1].starts_with("\"Alice, Jr.\""));
    }

    #[tokio::test]
    async fn export_applies_filters() {
        let service = seeded().await;
        let lines = collect(
            service
                .export(&Requester::new("u1"), &params(&[("driver_name", "Bob")]))
                .unwrap(),
        )
        .await;
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("Bob,"));
    }

    #[tokio::test]
    async fn soft_deleted_rows_are_not_exported() {
        let service = seeded().await;
        let lines = collect(service.export(&Requester::new("u1"), &[]).unwrap()).await;

        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| !line.starts_with("Gone,")));
    }

    #[tokio::test]
    async fn store_failure_ends_the_body_after_sent_rows() {
        let service = ExportService::new(Arc::new(FailingStore));
        let chunks: Vec<Result<Bytes, ExportError>> = service
            .export(&Requester::new("u1"), &[])
            .unwrap()
            .body
            .collect()
            .await;

        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].as_ref().unwrap().starts_with(b"Driver Name,"));
        assert!(chunks[1].as_ref().unwrap().starts_with(b"Bob,ABC-123,"));
        assert!(matches!(
            chunks[2],
            Err(ExportError::Store(StoreError::Missing(99)))
        ));
    }

    #[tokio::test]
    async fn anonymous_export_is_header_only() {
        let service = seeded().await;
        let lines = collect(service.export(&Requester::anonymous(), &[]).unwrap()).await;
        assert_eq!(lines, vec!["Driver Name,License Plate,Contact,Creater,Create Time,Update Time"]);
    }
}
