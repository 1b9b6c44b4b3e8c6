//! The CRUD contract verifier.
//!
//! Drives create, read, update, delete and verify-absent against one
//! collection endpoint, strictly in order, and reports what it saw.
//! Nothing here retries a CRUD request: a timeout is a transport failure
//! and ends the run.

use reqwest::{Client, RequestBuilder};
use rust_common::{HttpConfig, PlatformError, RetryPolicy, build_http_client};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::envelope::{CollectionSummary, EnvelopeKeys, FieldLookup, lookup_field};
use crate::report::RunReport;
use crate::resource::{Mutation, ResourceSpec};
use crate::step::{Step, StepResult};
use crate::violation::{Violation, excerpt};

/// Status codes each step accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedStatuses {
    /// Create (default 200, 201)
    pub create: Vec<u16>,
    /// Read and re-read (default 200)
    pub read: Vec<u16>,
    /// Update (default 200, 204)
    pub update: Vec<u16>,
    /// Delete (default 200, 204)
    pub delete: Vec<u16>,
    /// Verify-absent (default 404)
    pub absent: Vec<u16>,
}

impl Default for AcceptedStatuses {
    fn default() -> Self {
        Self {
            create: vec![200, 201],
            read: vec![200],
            update: vec![200, 204],
            delete: vec![200, 204],
            absent: vec![404],
        }
    }
}

/// Verifier configuration, passed in at construction.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Collection URL, e.g. `http://localhost:5001/api/v1/DataSource`
    pub base_url: Url,
    /// Timeouts and user agent for every request
    pub http: HttpConfig,
    /// Pause after a mutating step before the following read
    pub settle_delay: Duration,
    /// Identifier and wrapper candidates
    pub envelope: EnvelopeKeys,
    /// Actor recorded by the `deletedBy` audit parameter on delete
    pub deleted_by: Option<String>,
    /// Accepted status sets
    pub accepted: AcceptedStatuses,
}

impl VerifierConfig {
    /// Configuration for `base_url` with default settings.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::InvalidInput` if the URL does not parse or
    /// is not an http(s) URL that can carry path segments.
    pub fn new(base_url: &str) -> Result<Self, PlatformError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PlatformError::invalid_input(format!("base URL {base_url}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(PlatformError::invalid_input(format!(
                "base URL must be http(s): {base_url}"
            )));
        }
        Ok(Self {
            base_url,
            http: HttpConfig::default(),
            settle_delay: Duration::from_millis(500),
            envelope: EnvelopeKeys::default(),
            deleted_by: Some("AutoTest".to_string()),
            accepted: AcceptedStatuses::default(),
        })
    }

    /// Set HTTP client settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Set the settle delay.
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set envelope candidates.
    #[must_use]
    pub fn with_envelope(mut self, envelope: EnvelopeKeys) -> Self {
        self.envelope = envelope;
        self
    }

    /// Set or clear the delete audit actor.
    #[must_use]
    pub fn with_deleted_by(mut self, actor: Option<String>) -> Self {
        self.deleted_by = actor.filter(|a| !a.is_empty());
        self
    }

    /// Set accepted status sets.
    #[must_use]
    pub fn with_accepted(mut self, accepted: AcceptedStatuses) -> Self {
        self.accepted = accepted;
        self
    }
}

/// A request that never produced a response. Ends the run.
#[derive(Error, Debug)]
#[error("{step}: {source}")]
pub struct TransportFailure {
    /// Step whose request failed
    pub step: Step,
    /// Underlying error
    pub source: PlatformError,
}

impl TransportFailure {
    /// The report entry for this failure.
    #[must_use]
    pub fn to_violation(&self) -> Violation {
        Violation::Transport {
            step: self.step,
            reason: self.source.to_string(),
        }
    }
}

/// Result type of a single step operation.
pub type StepAttempt<T> = Result<T, TransportFailure>;

struct Exchange {
    status: u16,
    body: String,
}

enum Fetched {
    Record { body: Value, record: Map<String, Value> },
    Rejected(Violation),
}

/// Drives the CRUD lifecycle against one collection endpoint.
#[derive(Debug, Clone)]
pub struct CrudVerifier {
    config: VerifierConfig,
    http: Client,
}

impl CrudVerifier {
    /// Build a verifier and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: VerifierConfig) -> Result<Self, PlatformError> {
        let http = build_http_client(&config.http)?;
        Ok(Self { config, http })
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run the whole lifecycle and report every step.
    ///
    /// Never fails: transport errors become a failed step followed by
    /// skipped ones, and a record left behind is reported as residue.
    pub async fn run(
        &self,
        spec: &ResourceSpec,
        round_trip_fields: &[String],
        mutation: &Mutation,
    ) -> RunReport {
        let span = info_span!(
            "crud_run",
            run_id = %Uuid::new_v4(),
            target = %self.config.base_url
        );
        self.run_steps(spec, round_trip_fields, mutation)
            .instrument(span)
            .await
    }

    async fn run_steps(
        &self,
        spec: &ResourceSpec,
        round_trip_fields: &[String],
        mutation: &Mutation,
    ) -> RunReport {
        let mut steps = Vec::with_capacity(Step::ALL.len());
        let mut created = None;

        if let Err(failure) = self
            .drive(spec, round_trip_fields, mutation, &mut steps, &mut created)
            .await
        {
            error!(step = %failure.step, error = %failure.source, "Transport failure, aborting run");
            steps.push(StepResult::failed(failure.step, None, failure.to_violation()));
        }

        let fatal = steps
            .iter()
            .flat_map(StepResult::violations)
            .find(|v| v.is_fatal())
            .cloned();
        let skip_reason = match &fatal {
            Some(Violation::Transport { step, .. }) => {
                format!("aborted after transport failure in {step}")
            }
            _ => "no identifier from CREATE".to_string(),
        };
        for step in Step::ALL.into_iter().skip(steps.len()) {
            steps.push(StepResult::skipped(step, skip_reason.clone()));
        }

        let cleaned_up = [Step::Delete, Step::VerifyAbsent]
            .iter()
            .all(|s| steps.iter().any(|r| r.step() == *s && r.success()));
        let residue = match (created, fatal) {
            (Some(identifier), _) if !cleaned_up => Some(self.residue(Some(identifier), spec)),
            (None, Some(Violation::NoIdentifierReturned { .. })) => Some(self.residue(None, spec)),
            _ => None,
        };

        let report = RunReport::new(self.config.base_url.as_str(), steps, residue);
        info!(
            passed = report.passed(),
            total = report.total(),
            "CRUD run finished"
        );
        report
    }

    async fn drive(
        &self,
        spec: &ResourceSpec,
        round_trip_fields: &[String],
        mutation: &Mutation,
        steps: &mut Vec<StepResult>,
        created: &mut Option<String>,
    ) -> StepAttempt<()> {
        let (identifier, result) = self.create(spec).await?;
        steps.push(result);
        let Some(identifier) = identifier else {
            return Ok(());
        };
        *created = Some(identifier.clone());

        self.settle().await;
        let (record, result) = self.read(&identifier, spec, round_trip_fields).await?;
        steps.push(result);

        let result = self
            .update(&identifier, record.as_ref(), spec, round_trip_fields, mutation)
            .await?;
        steps.push(result);

        steps.push(self.delete(&identifier).await?);

        self.settle().await;
        steps.push(self.verify_absent(&identifier).await?);
        Ok(())
    }

    /// POST the spec. Passes on an accepted status with an identifier.
    ///
    /// # Errors
    ///
    /// Returns `TransportFailure` if no response was received.
    #[instrument(skip_all, fields(step = "CREATE"))]
    pub async fn create(&self, spec: &ResourceSpec) -> StepAttempt<(Option<String>, StepResult)> {
        let request = self
            .http
            .post(self.config.base_url.clone())
            .json(&spec.to_payload());
        let exchange = self.send(Step::Create, request).await?;
        let status = exchange.status;

        if !self.config.accepted.create.contains(&status) {
            return Ok((
                None,
                unexpected_status(Step::Create, &self.config.accepted.create, &exchange),
            ));
        }

        let body = serde_json::from_str(&exchange.body).unwrap_or(Value::Null);
        match self.config.envelope.extract_identifier(&body) {
            Some(identifier) => {
                info!(%identifier, status, "Record created");
                let message = format!("identifier {identifier}");
                Ok((Some(identifier), StepResult::passed(Step::Create, status).with_message(message)))
            }
            None => {
                warn!(status, body = %excerpt(&exchange.body), "No identifier in create response");
                let violation = Violation::NoIdentifierReturned {
                    status,
                    probed: self.config.envelope.identifier_keys().to_vec(),
                };
                Ok((None, StepResult::failed(Step::Create, Some(status), violation)))
            }
        }
    }

    /// GET the record and check every round-trip field.
    ///
    /// Round-trip fields declared in `spec` must read back equal; fields
    /// `spec` does not declare must merely be present and non-null.
    /// All mismatches are collected.
    ///
    /// # Errors
    ///
    /// Returns `TransportFailure` if no response was received.
    #[instrument(skip(self, spec, round_trip_fields), fields(step = "READ"))]
    pub async fn read(
        &self,
        identifier: &str,
        spec: &ResourceSpec,
        round_trip_fields: &[String],
    ) -> StepAttempt<(Option<Map<String, Value>>, StepResult)> {
        let (status, body, record) = match self.fetch(Step::Read, identifier).await? {
            (status, Fetched::Record { body, record }) => (status, body, record),
            (status, Fetched::Rejected(violation)) => {
                return Ok((None, StepResult::failed(Step::Read, Some(status), violation)));
            }
        };

        let mut violations = self.identifier_drift(Step::Read, identifier, &body);
        violations.extend(round_trip_fields.iter().filter_map(|field| {
            let expected = spec.get(field);
            compare_field(Step::Read, &record, field, expected)
        }));

        debug!(violations = violations.len(), "Read checked");
        Ok((Some(record), StepResult::observed(Step::Read, Some(status), violations)))
    }

    /// PUT the full record with `mutation` applied, then re-read it.
    ///
    /// The base is the record returned by `read` (or `spec` if the read
    /// produced nothing). After an accepted status the record is read again:
    /// every mutated field must hold its new value and every other
    /// round-trip field must be unchanged.
    ///
    /// # Errors
    ///
    /// Returns `TransportFailure` if no response was received.
    #[instrument(skip(self, record, spec, round_trip_fields, mutation), fields(step = "UPDATE"))]
    pub async fn update(
        &self,
        identifier: &str,
        record: Option<&Map<String, Value>>,
        spec: &ResourceSpec,
        round_trip_fields: &[String],
        mutation: &Mutation,
    ) -> StepAttempt<StepResult> {
        let base = record.map_or_else(|| spec.fields().clone(), |r| spec.respell(r));
        let payload = Value::Object(mutation.apply_to(&base));

        let request = self.http.put(self.resource_url(identifier)).json(&payload);
        let exchange = self.send(Step::Update, request).await?;
        let status = exchange.status;
        if !self.config.accepted.update.contains(&status) {
            return Ok(unexpected_status(Step::Update, &self.config.accepted.update, &exchange));
        }

        self.settle().await;
        let reread = match self.fetch(Step::Update, identifier).await? {
            (_, Fetched::Record { record, .. }) => record,
            (_, Fetched::Rejected(violation)) => {
                return Ok(StepResult::failed(Step::Update, Some(status), violation)
                    .with_message("update accepted but record could not be re-read"));
            }
        };

        let mut violations: Vec<Violation> = mutation
            .changes()
            .iter()
            .filter_map(|(field, expected)| match lookup_field(&reread, field) {
                FieldLookup::Missing => Some(Violation::UpdateNotApplied {
                    field: field.clone(),
                    expected: expected.clone(),
                    actual: None,
                }),
                found => {
                    let actual = found.value()?;
                    if !values_match(expected, actual) {
                        Some(Violation::UpdateNotApplied {
                            field: field.clone(),
                            expected: expected.clone(),
                            actual: Some(actual.clone()),
                        })
                    } else if let FieldLookup::CaseFolded { key, .. } = found {
                        Some(Violation::FieldCaseMismatch {
                            step: Step::Update,
                            field: field.clone(),
                            actual_key: key.to_string(),
                        })
                    } else {
                        None
                    }
                }
            })
            .collect();

        violations.extend(
            round_trip_fields
                .iter()
                .filter(|field| !mutation.touches(field))
                .filter_map(|field| {
                    let before = lookup_field(&base, field).value()?;
                    compare_field(Step::Update, &reread, field, Some(before))
                })
                .filter(|v| !v.is_advisory()),
        );

        let result = StepResult::observed(Step::Update, Some(status), violations);
        if result.success() {
            info!(status, "Update applied");
        }
        Ok(result)
    }

    /// DELETE the record. Passes on an accepted status.
    ///
    /// # Errors
    ///
    /// Returns `TransportFailure` if no response was received.
    #[instrument(skip(self), fields(step = "DELETE"))]
    pub async fn delete(&self, identifier: &str) -> StepAttempt<StepResult> {
        let mut url = self.resource_url(identifier);
        if let Some(actor) = &self.config.deleted_by {
            url.query_pairs_mut().append_pair("deletedBy", actor);
        }

        let exchange = self.send(Step::Delete, self.http.delete(url)).await?;
        if self.config.accepted.delete.contains(&exchange.status) {
            info!(status = exchange.status, "Record deleted");
            Ok(StepResult::passed(Step::Delete, exchange.status))
        } else {
            Ok(unexpected_status(Step::Delete, &self.config.accepted.delete, &exchange))
        }
    }

    /// GET the record after delete. Passes only on 404.
    ///
    /// A successful read here is a soft-delete or stale-cache defect and is
    /// reported as `RecordStillPresent`.
    ///
    /// # Errors
    ///
    /// Returns `TransportFailure` if no response was received.
    #[instrument(skip(self), fields(step = "VERIFY_ABSENT"))]
    pub async fn verify_absent(&self, identifier: &str) -> StepAttempt<StepResult> {
        let request = self.http.get(self.resource_url(identifier));
        let exchange = self.send(Step::VerifyAbsent, request).await?;
        let status = exchange.status;

        if self.config.accepted.absent.contains(&status) {
            Ok(StepResult::passed(Step::VerifyAbsent, status))
        } else if (200..300).contains(&status) {
            warn!(status, "Record still readable after delete");
            Ok(StepResult::failed(
                Step::VerifyAbsent,
                Some(status),
                Violation::RecordStillPresent { status },
            ))
        } else {
            Ok(unexpected_status(Step::VerifyAbsent, &self.config.accepted.absent, &exchange))
        }
    }

    /// GET the collection root and count the records it lists.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-200 status, or a body
    /// that is not JSON.
    #[instrument(skip(self))]
    pub async fn summarize_collection(&self) -> Result<CollectionSummary, PlatformError> {
        let response = self
            .http
            .get(self.config.base_url.clone())
            .send()
            .await
            .map_err(PlatformError::from_transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(PlatformError::from_transport)?;
        if status != 200 {
            return Err(PlatformError::unavailable(format!(
                "listing returned status {status}: {}",
                excerpt(&body)
            )));
        }

        let body: Value = serde_json::from_str(&body)?;
        let summary = self.config.envelope.summarize_collection(&body);
        info!(total = summary.total, active = summary.active, "Collection listed");
        Ok(summary)
    }

    /// Wait for the service to answer on the collection root.
    ///
    /// 200 and 404 both count as "responding". Retries follow `policy`
    /// only; returns the number of attempts made.
    ///
    /// # Errors
    ///
    /// Returns the last error once the policy gives up.
    pub async fn wait_until_ready(&self, policy: &RetryPolicy) -> Result<u32, PlatformError> {
        let attempts = AtomicU32::new(0);
        policy
            .execute(|| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(attempt, "Probing service readiness");
                self.probe()
            })
            .await?;
        let attempts = attempts.load(Ordering::SeqCst);
        info!(attempts, "Service is responding");
        Ok(attempts)
    }

    async fn probe(&self) -> Result<(), PlatformError> {
        let response = self
            .http
            .get(self.config.base_url.clone())
            .send()
            .await
            .map_err(PlatformError::from_transport)?;
        match response.status().as_u16() {
            200 | 404 => Ok(()),
            status => Err(PlatformError::unavailable(format!("readiness probe got status {status}"))),
        }
    }

    async fn send(&self, step: Step, request: RequestBuilder) -> StepAttempt<Exchange> {
        let fail = |err| TransportFailure {
            step,
            source: PlatformError::from_transport(err),
        };
        let response = request.send().await.map_err(fail)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(fail)?;
        debug!(%step, status, bytes = body.len(), "Response received");
        Ok(Exchange { status, body })
    }

    /// GET one record, unwrapped to its payload object.
    async fn fetch(&self, step: Step, identifier: &str) -> StepAttempt<(u16, Fetched)> {
        let exchange = self
            .send(step, self.http.get(self.resource_url(identifier)))
            .await?;
        let status = exchange.status;

        if !self.config.accepted.read.contains(&status) {
            let violation = Violation::UnexpectedStatus {
                step,
                expected: self.config.accepted.read.clone(),
                actual: status,
                body_excerpt: excerpt(&exchange.body),
            };
            return Ok((status, Fetched::Rejected(violation)));
        }

        let rejected = |reason: String| {
            let violation = Violation::InvalidBody { step, reason };
            (status, Fetched::Rejected(violation))
        };
        let body: Value = match serde_json::from_str(&exchange.body) {
            Ok(body) => body,
            Err(e) => return Ok(rejected(format!("not JSON: {e}"))),
        };
        match self.config.envelope.unwrap_payload(&body) {
            Value::Object(record) => {
                let record = record.clone();
                Ok((status, Fetched::Record { body, record }))
            }
            other => Ok(rejected(format!("expected a JSON object, got {other}"))),
        }
    }

    /// Advisory for a record whose removal was not confirmed.
    ///
    /// Without an identifier the record can only be located by its natural
    /// key within the collection.
    fn residue(&self, identifier: Option<String>, spec: &ResourceSpec) -> Violation {
        let natural_key = spec.natural_key();
        let location = identifier
            .as_deref()
            .map_or_else(|| self.config.base_url.clone(), |id| self.resource_url(id))
            .to_string();
        warn!(
            identifier = identifier.as_deref().unwrap_or("<unknown>"),
            natural_key = natural_key.as_deref().unwrap_or("<unknown>"),
            %location,
            "Cleanup not confirmed, test record may remain"
        );
        Violation::ResidualRecord {
            identifier,
            natural_key,
            location,
        }
    }

    fn identifier_drift(&self, step: Step, identifier: &str, body: &Value) -> Vec<Violation> {
        match self.config.envelope.extract_identifier(body) {
            Some(actual) if actual != identifier => vec![Violation::IdentifierChanged {
                step,
                expected: identifier.to_string(),
                actual,
            }],
            _ => Vec::new(),
        }
    }

    fn resource_url(&self, identifier: &str) -> Url {
        let mut url = self.config.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(identifier);
        }
        url
    }

    async fn settle(&self) {
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
    }
}

fn unexpected_status(step: Step, expected: &[u16], exchange: &Exchange) -> StepResult {
    StepResult::failed(
        step,
        Some(exchange.status),
        Violation::UnexpectedStatus {
            step,
            expected: expected.to_vec(),
            actual: exchange.status,
            body_excerpt: excerpt(&exchange.body),
        },
    )
}

/// Check one field of a read record against its expectation.
fn compare_field(
    step: Step,
    record: &Map<String, Value>,
    field: &str,
    expected: Option<&Value>,
) -> Option<Violation> {
    let found = lookup_field(record, field);
    let Some(actual) = found.value() else {
        return Some(Violation::FieldMismatch {
            step,
            field: field.to_string(),
            expected: expected.cloned(),
            actual: None,
        });
    };

    let matches = expected.map_or(!actual.is_null(), |e| values_match(e, actual));
    if !matches {
        return Some(Violation::FieldMismatch {
            step,
            field: field.to_string(),
            expected: expected.cloned(),
            actual: Some(actual.clone()),
        });
    }
    match found {
        FieldLookup::CaseFolded { key, .. } => Some(Violation::FieldCaseMismatch {
            step,
            field: field.to_string(),
            actual_key: key.to_string(),
        }),
        _ => None,
    }
}

/// JSON equality where `90` and `90.0` are the same number.
fn values_match(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => a == b || a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_match(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, x)| b.get(k).is_some_and(|y| values_match(x, y)))
        }
        _ => expected == actual,
    }
}
