use std::path::PathBuf;
use std::sync::Arc;

use rand::Rng;
use rating_kernel_core::{
    validate_rating_request, validate_save_request, FieldError, Record, Sentiment, Validated,
};
use rating_kernel_store_fs::{DirectoryBackend, RecordStore, SlotBackend, StoreError};
use serde::Serialize;
use serde_json::{json, Value};

pub const API_CONTRACT_VERSION: &str = "api.v1";

pub const ERRORS_KEY: &str = "errors";
pub const DUPLICATE_MESSAGE: &str = "item already exists";
pub const STORAGE_FAULT_MESSAGE: &str = "storage fault";

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Assigns a sentiment label to a piece of text.
pub trait SentimentLabeller: Send + Sync {
    fn label(&self, text: &str) -> Sentiment;
}

/// Uniformly random label; the text is not inspected.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomLabeller;

impl SentimentLabeller for RandomLabeller {
    fn label(&self, _text: &str) -> Sentiment {
        let index = rand::thread_rng().gen_range(0..Sentiment::ALL.len());
        Sentiment::ALL[index]
    }
}

/// Transport-neutral outcome: an HTTP-style status code and a JSON body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn field_errors(errors: &[FieldError]) -> Self {
        Self::new(STATUS_BAD_REQUEST, json!({ ERRORS_KEY: errors }))
    }

    fn message(status: u16, message: &str) -> Self {
        Self::new(status, json!({ ERRORS_KEY: [message] }))
    }
}

/// Labelling and saving of sentiment results, independent of any HTTP framework.
#[derive(Debug)]
pub struct RatingApi<B = DirectoryBackend, L = RandomLabeller> {
    store: Arc<RecordStore<B>>,
    labeller: L,
}

impl RatingApi {
    /// Directory-backed API with the random labeller.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] when the data directory cannot be created.
    pub fn open(data_directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(RecordStore::open(data_directory)?), RandomLabeller))
    }
}

impl<B: SlotBackend, L: SentimentLabeller> RatingApi<B, L> {
    pub fn new(store: Arc<RecordStore<B>>, labeller: L) -> Self {
        Self { store, labeller }
    }

    #[must_use]
    pub fn store(&self) -> &RecordStore<B> {
        &self.store
    }

    /// Label the text of a rating request: 200 `{"sentiment": ...}` or 400 with field errors.
    #[must_use]
    pub fn rate(&self, input: &Value) -> ApiResponse {
        match validate_rating_request(input).into_result() {
            Ok(request) => {
                let sentiment = self.labeller.label(&request.text);
                ApiResponse::new(STATUS_OK, json!({ "sentiment": sentiment }))
            }
            Err(errors) => {
                tracing::warn!(received = %input, "invalid input for sentiment labelling");
                ApiResponse::field_errors(&errors)
            }
        }
    }

    /// Persist a labelling result once per distinct content.
    ///
    /// 201 `{}` when stored, 400 on invalid input, 409 when identical content already exists,
    /// 500 when the store fails.
    #[must_use]
    pub fn save_rating(&self, input: &Value) -> ApiResponse {
        let request = match validate_save_request(input) {
            Validated::Valid(request) => request,
            Validated::Invalid(errors) => {
                tracing::warn!(received = %input, "invalid input for sentiment saving");
                return ApiResponse::field_errors(&errors);
            }
        };
        self.persist(&request.to_record())
    }

    /// Persist an arbitrary flat record with the same status mapping as [`Self::save_rating`].
    /// Non-scalar fields are reported as 400 field errors before the store is touched.
    #[must_use]
    pub fn save_record(&self, input: &Value) -> ApiResponse {
        match Record::from_json(input) {
            Ok(record) => self.persist(&record),
            Err(err) => {
                tracing::warn!(received = %input, error = %err, "unrepresentable record");
                ApiResponse::field_errors(&[FieldError::from_kernel_error(&err)])
            }
        }
    }

    fn persist(&self, record: &Record) -> ApiResponse {
        match self.store.save(record) {
            Ok(_location) => ApiResponse::new(STATUS_CREATED, json!({})),
            Err(StoreError::DuplicateRecord { .. }) => {
                ApiResponse::message(STATUS_CONFLICT, DUPLICATE_MESSAGE)
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to save record");
                ApiResponse::message(STATUS_INTERNAL_ERROR, STORAGE_FAULT_MESSAGE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::{fs, io};

    use rating_kernel_core::RecordIdentity;
    use rating_kernel_store_fs::{InMemoryBackend, Location, SlotState};

    use super::*;

    struct FixedLabeller(Sentiment);

    impl SentimentLabeller for FixedLabeller {
        fn label(&self, _text: &str) -> Sentiment {
            self.0
        }
    }

    /// Claims succeed; every payload write fails.
    #[derive(Debug, Default)]
    struct FailingWrites {
        inner: InMemoryBackend,
    }

    impl SlotBackend for FailingWrites {
        fn claim_slot(&self, identity: &RecordIdentity) -> Result<bool, StoreError> {
            self.inner.claim_slot(identity)
        }

        fn write_slot(
            &self,
            identity: &RecordIdentity,
            _payload: &[u8],
        ) -> Result<Location, StoreError> {
            Err(StoreError::StorageFault {
                identity: identity.clone(),
                location: Location::Memory(identity.clone()),
                source: io::Error::other("disk quota exceeded"),
            })
        }

        fn slot_state(&self, identity: &RecordIdentity) -> Result<SlotState, StoreError> {
            self.inner.slot_state(identity)
        }

        fn read_slot(&self, identity: &RecordIdentity) -> Result<Option<Vec<u8>>, StoreError> {
            self.inner.read_slot(identity)
        }

        fn list_slots(&self) -> Result<Vec<(RecordIdentity, SlotState)>, StoreError> {
            self.inner.list_slots()
        }
    }

    fn memory_api() -> RatingApi<InMemoryBackend, FixedLabeller> {
        RatingApi::new(
            Arc::new(RecordStore::with_backend(InMemoryBackend::new())),
            FixedLabeller(Sentiment::Neutral),
        )
    }

    fn save_body(is_good_translation: bool) -> Value {
        json!({
            "text": "fff",
            "languageCode": "en",
            "sentiment": "positive",
            "isGoodTranslation": is_good_translation,
        })
    }

    fn sorted_file_names(dir: &std::path::Path) -> Vec<String> {
        let mut names = fs::read_dir(dir)
            .unwrap_or_else(|err| panic!("failed to list {}: {err}", dir.display()))
            .map(|entry| match entry {
                Ok(entry) => entry.file_name().to_string_lossy().into_owned(),
                Err(err) => panic!("failed to read dir entry: {err}"),
            })
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    // Test IDs: TAPI-001
    #[test]
    fn rate_returns_label_for_valid_request() {
        let api = memory_api();
        let input = json!({"text": "hello", "languageCode": "en", "extra": 1});
        let response = api.rate(&input);
        assert_eq!(
            response,
            ApiResponse::new(200, json!({"sentiment": "neutral"}))
        );
    }

    // Test IDs: TAPI-002
    #[test]
    fn rate_rejects_mistyped_text_with_field_error() {
        let api = memory_api();
        let response = api.rate(&json!({"text": 123, "languageCode": "en"}));
        assert_eq!(response.status, 400);

        let errors = response.body[ERRORS_KEY]
            .as_array()
            .unwrap_or_else(|| panic!("errors should be a list: {}", response.body));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["loc"], json!(["text"]));
    }

    // Test IDs: TAPI-003
    #[test]
    fn random_labeller_only_yields_known_labels() {
        let labeller = RandomLabeller;
        let seen = (0..300)
            .map(|_| labeller.label("ignored"))
            .collect::<BTreeSet<_>>();
        assert!(seen.iter().all(|label| Sentiment::ALL.contains(label)));
        // 300 uniform draws over three labels miss one with negligible probability.
        assert_eq!(seen.len(), 3);
    }

    // Test IDs: TAPI-004
    #[test]
    fn save_rating_end_to_end_on_directory_store() {
        let dir = tempfile::tempdir()
            .unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
        let api = RatingApi::open(dir.path())
            .unwrap_or_else(|err| panic!("failed to open api: {err}"));

        let created = api.save_rating(&save_body(true));
        assert_eq!(created, ApiResponse::new(201, json!({})));
        assert_eq!(
            sorted_file_names(dir.path()),
            vec!["b03979d5d5beb57d7bc1f9982a22e92d.json"]
        );

        let repeated = api.save_rating(&save_body(true));
        assert_eq!(
            repeated,
            ApiResponse::new(409, json!({"errors": ["item already exists"]}))
        );

        let flipped = api.save_rating(&save_body(false));
        assert_eq!(flipped.status, 201);
        assert_eq!(
            sorted_file_names(dir.path()),
            vec![
                "b03979d5d5beb57d7bc1f9982a22e92d.json",
                "fed96635bf5305fc9fca2c89652185e7.json",
            ]
        );
    }

    // Test IDs: TAPI-005
    #[test]
    fn save_rating_collects_every_field_error() {
        let api = memory_api();
        let response = api.save_rating(&json!({"text": "fff", "sentiment": "ecstatic"}));
        assert_eq!(response.status, 400);

        let fields = response.body[ERRORS_KEY]
            .as_array()
            .unwrap_or_else(|| panic!("errors should be a list: {}", response.body))
            .iter()
            .map(|error| error["loc"][0].as_str().unwrap_or_default().to_owned())
            .collect::<BTreeSet<_>>();
        assert_eq!(
            fields,
            ["isGoodTranslation", "languageCode", "sentiment"]
                .into_iter()
                .map(str::to_owned)
                .collect()
        );
        assert!(matches!(api.store().scan(), Ok(report) if report.written == 0));
    }

    // Test IDs: TAPI-007
    #[test]
    fn save_record_maps_unrepresentable_values_to_field_errors() {
        let api = memory_api();

        let rejected = api.save_record(&json!({"ok": 1, "nested": {"x": 1}}));
        assert_eq!(rejected.status, 400);
        assert_eq!(rejected.body[ERRORS_KEY][0]["loc"], json!(["nested"]));
        assert_eq!(rejected.body[ERRORS_KEY][0]["type"], json!("unrepresentable"));

        assert_eq!(api.save_record(&json!({"ggg": 111})).status, 201);
        assert_eq!(api.save_record(&json!({"ggg": 111})).status, 409);
        assert!(matches!(
            api.store().read_payload(&Record::new().with("ggg", 111_i64).identity()),
            Ok(Some(payload)) if payload == br#"{"ggg": 111}"#.to_vec()
        ));
    }

    // Test IDs: TAPI-006
    #[test]
    fn save_rating_rejects_non_object_input() {
        let api = memory_api();
        let response = api.save_rating(&json!(["not", "an", "object"]));
        assert_eq!(response.status, 400);
        assert_eq!(response.body[ERRORS_KEY][0]["loc"], json!([]));
    }

    // Test IDs: TAPI-008
    #[test]
    fn storage_fault_maps_to_500_then_conflict() {
        let api = RatingApi::new(
            Arc::new(RecordStore::with_backend(FailingWrites::default())),
            FixedLabeller(Sentiment::Positive),
        );

        let failed = api.save_rating(&save_body(true));
        assert_eq!(
            failed,
            ApiResponse::new(500, json!({"errors": [STORAGE_FAULT_MESSAGE]}))
        );
        assert_eq!(failed.body, json!({"errors": ["storage fault"]}));

        let retried = api.save_rating(&save_body(true));
        assert_eq!(
            retried,
            ApiResponse::new(409, json!({"errors": [DUPLICATE_MESSAGE]}))
        );

        let report = api
            .store()
            .scan()
            .unwrap_or_else(|err| panic!("scan failed: {err}"));
        assert_eq!(report.written, 0);
        assert_eq!(report.claimed.len(), 1);
    }
}
