//! The four submission forms and the single operation that stores any of them.

use crate::body::FormBody;
use crate::config::StoreErrorPolicy;
use crate::metrics_defs::{STORE_WRITE_DURATION, SUBMISSIONS};
use crate::routing::route_matches;
use recordstore::id::new_record_id;
use recordstore::{Record, RecordStore, StoreError, store_record};
use std::time::{Duration, Instant};

/// Describes one form: where it is posted, where its records go and where the
/// browser is sent afterwards.
#[derive(Debug, PartialEq, Eq)]
pub struct SubmissionForm {
    pub path: &'static str,
    pub collection: &'static str,
    /// Partition key of the collection, filled with a generated id.
    pub key_field: &'static str,
    pub fields: &'static [&'static str],
    pub redirect_to: &'static str,
    pub success_message: &'static str,
    pub failure_message: &'static str,
}

pub const EMAIL_FORM: SubmissionForm = SubmissionForm {
    path: "/submitEmail",
    collection: "Emails",
    key_field: "emailid",
    fields: &["email"],
    redirect_to: "/about",
    success_message: "Email submitted successfully.",
    failure_message: "Error submitting email.",
};

pub const QUESTION_FORM: SubmissionForm = SubmissionForm {
    path: "/submitQuestion",
    collection: "Questions",
    key_field: "questionid",
    fields: &["question"],
    redirect_to: "/nn.html",
    success_message: "Question submitted successfully.",
    failure_message: "Error submitting question.",
};

pub const ANSWER_FORM: SubmissionForm = SubmissionForm {
    path: "/submitAnswer",
    collection: "Answers",
    key_field: "answerid",
    fields: &["answer"],
    redirect_to: "/",
    success_message: "Answer submitted successfully.",
    failure_message: "Error submitting answer.",
};

pub const QUERY_FORM: SubmissionForm = SubmissionForm {
    path: "/submitQuery",
    collection: "Queries",
    key_field: "queryid",
    fields: &["name", "email", "query"],
    redirect_to: "/",
    success_message: "Query submitted successfully.",
    failure_message: "Error submitting query.",
};

pub const FORMS: &[SubmissionForm] = &[EMAIL_FORM, QUESTION_FORM, ANSWER_FORM, QUERY_FORM];

pub fn find_form(path: &str) -> Option<&'static SubmissionForm> {
    FORMS.iter().find(|form| route_matches(form.path, path))
}

impl SubmissionForm {
    /// Key field first, then the form's fields in order. Absent fields are
    /// stored empty and anything else in the body is ignored.
    pub fn build_record(&self, id: String, body: &FormBody) -> Record {
        let mut record = Record::with_capacity(self.fields.len() + 1);
        record.insert(self.key_field.to_string(), id);
        for field in self.fields {
            record.insert(
                field.to_string(),
                body.get(field).unwrap_or_default().to_string(),
            );
        }
        record
    }
}

/// Stores one submission and returns the id of the new record.
///
/// With [`StoreErrorPolicy::LogOnly`] a failed write is logged and the
/// generated id is still returned, so the caller proceeds as on success.
pub async fn submit(
    form: &SubmissionForm,
    body: &FormBody,
    store: &dyn RecordStore,
    timeout: Duration,
    policy: StoreErrorPolicy,
) -> Result<String, StoreError> {
    let id = new_record_id();
    let record = form.build_record(id.clone(), body);

    let started = Instant::now();
    let result = store_record(store, form.collection, &record, timeout).await;
    shared::histogram!(STORE_WRITE_DURATION, "collection" => form.collection)
        .record(started.elapsed().as_secs_f64());

    let outcome = match (&result, policy) {
        (Ok(()), _) => "stored",
        (Err(_), StoreErrorPolicy::LogOnly) => "ignored_failure",
        (Err(_), StoreErrorPolicy::Surface) => "failed",
    };
    shared::counter!(SUBMISSIONS, "collection" => form.collection, "outcome" => outcome)
        .increment(1);

    match (result, policy) {
        (Ok(()), _) => Ok(id),
        (Err(e), StoreErrorPolicy::LogOnly) => {
            tracing::warn!(
                collection = form.collection,
                error = %e,
                "Store failure ignored, continuing as submitted"
            );
            Ok(id)
        }
        (Err(e), StoreErrorPolicy::Surface) => Err(e),
    }
}
