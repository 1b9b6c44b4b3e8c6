//! Mock DataSource service for testing.
//!
//! A stateful in-memory DataSource collection served by `wiremock`. Records
//! live behind a shared lock so the mock behaves like the real service
//! across a whole create/read/update/delete sequence. Response envelopes
//! and service defects are chosen at start-up.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use wiremock::matchers::path_regex;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Path the mock serves the collection on.
pub const COLLECTION_PATH: &str = "/api/v1/DataSource";

/// How the mock wraps its responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnvelopeStyle {
    /// `{"success": true, "data": {"id": ..., "cronExpression": ...}}`
    #[default]
    CamelWrapped,
    /// `{"IsSuccess": true, "Data": {"ID": ..., "CronExpression": ...}}`
    PascalWrapped,
    /// `{"_id": ..., "cronExpression": ...}` with no wrapper
    Bare,
}

/// Misbehaviour the mock can be told to exhibit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defects {
    /// Accept updates without storing them
    pub ignore_updates: bool,
    /// Keep deleted records readable
    pub soft_delete_visible: bool,
    /// Leave the identifier out of create responses
    pub omit_identifier: bool,
    /// Fields silently dropped on create
    pub drop_fields: Vec<String>,
    /// Field reset to `null` by every update
    pub clobber_on_update: Option<String>,
    /// Status returned by create instead of 201
    pub reject_create_status: Option<u16>,
    /// Status returned by a successful update
    pub update_status: u16,
    /// Number of collection probes answered with 503 before the service comes up
    pub unavailable_probes: u32,
}

impl Default for Defects {
    fn default() -> Self {
        Self {
            ignore_updates: false,
            soft_delete_visible: false,
            omit_identifier: false,
            drop_fields: Vec::new(),
            clobber_on_update: None,
            reject_create_status: None,
            update_status: 200,
            unavailable_probes: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredRecord {
    fields: Map<String, Value>,
    deleted_by: Option<String>,
    deleted: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    records: BTreeMap<String, StoredRecord>,
    created: usize,
    last_deleted_by: Option<String>,
    probes: u32,
}

/// In-memory DataSource service on a local port.
pub struct MockDataSourceService {
    server: MockServer,
    state: Arc<Mutex<State>>,
}

impl MockDataSourceService {
    /// Start a well-behaved service with `camelCase` envelopes.
    pub async fn start() -> Self {
        Self::start_with(EnvelopeStyle::default(), Defects::default()).await
    }

    /// Start a service with the given envelope style and defects.
    pub async fn start_with(style: EnvelopeStyle, defects: Defects) -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(State::default()));

        Mock::given(path_regex(format!("^{COLLECTION_PATH}(/[^/]*)?$")))
            .respond_with(DataSourceResponder {
                style,
                defects,
                state: Arc::clone(&state),
            })
            .mount(&server)
            .await;

        Self { server, state }
    }

    /// Base URI of the server, e.g. `http://127.0.0.1:41234`.
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Full collection URL.
    #[must_use]
    pub fn collection_url(&self) -> String {
        format!("{}{COLLECTION_PATH}", self.server.uri())
    }

    /// Number of records successfully created.
    #[must_use]
    pub fn records_created(&self) -> usize {
        self.lock().created
    }

    /// Number of records not deleted.
    #[must_use]
    pub fn live_records(&self) -> usize {
        self.lock().records.values().filter(|r| !r.deleted).count()
    }

    /// The `deletedBy` parameter of the most recent delete.
    #[must_use]
    pub fn last_deleted_by(&self) -> Option<String> {
        self.lock().last_deleted_by.clone()
    }

    /// Stored fields of one record, deleted or not.
    #[must_use]
    pub fn record(&self, id: &str) -> Option<Map<String, Value>> {
        self.lock().records.get(id).map(|r| r.fields.clone())
    }

    /// Insert a record directly, bypassing the HTTP surface.
    pub fn seed(&self, fields: Value) -> String {
        let mut state = self.lock();
        let id = state.allocate_id();
        state.records.insert(
            id.clone(),
            StoredRecord {
                fields: fields.as_object().cloned().unwrap_or_default(),
                deleted_by: None,
                deleted: false,
            },
        );
        id
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:024x}", 0x65f0_0000_0000_u64 + self.next_id)
    }
}

struct DataSourceResponder {
    style: EnvelopeStyle,
    defects: Defects,
    state: Arc<Mutex<State>>,
}

impl Respond for DataSourceResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let id = request
            .url
            .path()
            .strip_prefix(COLLECTION_PATH)
            .map(|rest| rest.trim_matches('/'))
            .filter(|rest| !rest.is_empty());
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        match (request.method.as_str(), id) {
            ("GET", None) => self.list(&mut state),
            ("POST", None) => self.create(&mut state, &request.body),
            ("GET", Some(id)) => self.get(&state, id),
            ("PUT", Some(id)) => self.update(&mut state, id, &request.body),
            ("DELETE", Some(id)) => {
                let deleted_by = request
                    .url
                    .query_pairs()
                    .find(|(key, _)| key == "deletedBy")
                    .map(|(_, value)| value.into_owned());
                self.delete(&mut state, id, deleted_by)
            }
            _ => ResponseTemplate::new(405).set_body_json(self.error("method not allowed")),
        }
    }
}

impl DataSourceResponder {
    fn list(&self, state: &mut State) -> ResponseTemplate {
        if state.probes < self.defects.unavailable_probes {
            state.probes += 1;
            return ResponseTemplate::new(503).set_body_json(self.error("starting up"));
        }

        let items: Vec<Value> = state
            .records
            .iter()
            .filter(|(_, r)| !r.deleted || self.defects.soft_delete_visible)
            .map(|(id, r)| Value::Object(self.payload(id, r)))
            .collect();
        let body = match self.style {
            EnvelopeStyle::CamelWrapped => json!({"success": true, "data": items}),
            EnvelopeStyle::PascalWrapped => json!({
                "IsSuccess": true,
                "Data": {"Items": items.clone(), "TotalCount": items.len()}
            }),
            EnvelopeStyle::Bare => Value::Array(items),
        };
        ResponseTemplate::new(200).set_body_json(body)
    }

    fn create(&self, state: &mut State, body: &[u8]) -> ResponseTemplate {
        if let Some(status) = self.defects.reject_create_status {
            return ResponseTemplate::new(status).set_body_json(self.error("validation failed"));
        }
        let Some(mut fields) = parse_object(body) else {
            return ResponseTemplate::new(400).set_body_json(self.error("body must be a JSON object"));
        };
        for field in &self.defects.drop_fields {
            fields.remove(field);
        }

        let id = state.allocate_id();
        let record = StoredRecord {
            fields,
            deleted_by: None,
            deleted: false,
        };
        let mut rendered = self.render(&id, &record);
        if self.defects.omit_identifier {
            if let Some(payload) = self.payload_mut(&mut rendered) {
                payload.retain(|key, _| !is_identifier_key(key));
            }
        }
        state.records.insert(id, record);
        state.created += 1;
        ResponseTemplate::new(201).set_body_json(rendered)
    }

    fn get(&self, state: &State, id: &str) -> ResponseTemplate {
        match state.records.get(id) {
            Some(record) if !record.deleted || self.defects.soft_delete_visible => {
                ResponseTemplate::new(200).set_body_json(self.render(id, record))
            }
            _ => self.not_found(id),
        }
    }

    fn update(&self, state: &mut State, id: &str, body: &[u8]) -> ResponseTemplate {
        let Some(incoming) = parse_object(body) else {
            return ResponseTemplate::new(400).set_body_json(self.error("body must be a JSON object"));
        };
        let Some(record) = state.records.get_mut(id).filter(|r| !r.deleted) else {
            return self.not_found(id);
        };

        if !self.defects.ignore_updates {
            record.fields = incoming
                .into_iter()
                .filter(|(key, _)| !is_identifier_key(key) && !key.eq_ignore_ascii_case("isDeleted"))
                .map(|(key, value)| (camel_case(&key), value))
                .collect();
        }
        if let Some(field) = &self.defects.clobber_on_update {
            record.fields.insert(field.clone(), Value::Null);
        }

        let status = self.defects.update_status;
        if status == 204 {
            ResponseTemplate::new(204)
        } else {
            let rendered = self.render(id, record);
            ResponseTemplate::new(status).set_body_json(rendered)
        }
    }

    fn delete(&self, state: &mut State, id: &str, deleted_by: Option<String>) -> ResponseTemplate {
        let Some(record) = state.records.get_mut(id).filter(|r| !r.deleted) else {
            return self.not_found(id);
        };
        record.deleted = true;
        record.deleted_by.clone_from(&deleted_by);
        state.last_deleted_by = deleted_by;
        if !self.defects.soft_delete_visible {
            state.records.remove(id);
        }
        ResponseTemplate::new(200).set_body_json(self.ok())
    }

    fn render(&self, id: &str, record: &StoredRecord) -> Value {
        let payload = Value::Object(self.payload(id, record));
        match self.style {
            EnvelopeStyle::CamelWrapped => json!({"success": true, "data": payload}),
            EnvelopeStyle::PascalWrapped => json!({"IsSuccess": true, "Data": payload, "Errors": []}),
            EnvelopeStyle::Bare => payload,
        }
    }

    fn payload(&self, id: &str, record: &StoredRecord) -> Map<String, Value> {
        let mut payload = Map::new();
        let (id_key, spell): (&str, fn(&str) -> String) = match self.style {
            EnvelopeStyle::CamelWrapped => ("id", str::to_owned),
            EnvelopeStyle::PascalWrapped => ("ID", pascal_case),
            EnvelopeStyle::Bare => ("_id", str::to_owned),
        };
        payload.insert(id_key.to_string(), Value::from(id));
        for (key, value) in &record.fields {
            payload.insert(spell(key), value.clone());
        }
        payload.insert(spell("isDeleted"), Value::Bool(record.deleted));
        if let Some(actor) = &record.deleted_by {
            payload.insert(spell("deletedBy"), Value::from(actor.as_str()));
        }
        payload
    }

    fn payload_mut<'a>(&self, body: &'a mut Value) -> Option<&'a mut Map<String, Value>> {
        match self.style {
            EnvelopeStyle::CamelWrapped => body.get_mut("data")?.as_object_mut(),
            EnvelopeStyle::PascalWrapped => body.get_mut("Data")?.as_object_mut(),
            EnvelopeStyle::Bare => body.as_object_mut(),
        }
    }

    fn not_found(&self, id: &str) -> ResponseTemplate {
        ResponseTemplate::new(404).set_body_json(self.error(&format!("DataSource {id} not found")))
    }

    fn ok(&self) -> Value {
        match self.style {
            EnvelopeStyle::PascalWrapped => json!({"IsSuccess": true, "Data": null, "Errors": []}),
            _ => json!({"success": true}),
        }
    }

    fn error(&self, message: &str) -> Value {
        match self.style {
            EnvelopeStyle::PascalWrapped => json!({"IsSuccess": false, "Data": null, "Errors": [message]}),
            _ => json!({"success": false, "message": message}),
        }
    }
}

fn parse_object(body: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn is_identifier_key(key: &str) -> bool {
    key.eq_ignore_ascii_case("id") || key.eq_ignore_ascii_case("_id")
}

fn pascal_case(key: &str) -> String {
    let mut chars = key.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_ascii_uppercase().to_string() + chars.as_str()
    })
}

fn camel_case(key: &str) -> String {
    let mut chars = key.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_ascii_lowercase().to_string() + chars.as_str()
    })
}
