//! Wire protocol for the HTTP database proxy
//!
//! One JSON request is POSTed per database call and one JSON response comes
//! back with HTTP 200, whatever the outcome:
//!
//! ```text
//! Request:  { "method": "<operation>", "params": [ ... ] }
//! Response: { "data": <any|null>, "error": {"name", "message"} | null,
//!             "lastInsertId": <scalar|null|false> }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{DbError, DbResult};

/// A result row, column name to value in column order
pub type Row = Map<String, Value>;

// ============================================================================
// Operations
// ============================================================================

/// The fixed set of operations both sides agree on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    SelectOne,
    Select,
    Insert,
    Update,
    Delete,
    Statement,
    AffectingStatement,
    Unprepared,
    GetDatabaseName,
}

impl Operation {
    /// Every operation in the protocol
    pub const ALL: [Operation; 9] = [
        Operation::SelectOne,
        Operation::Select,
        Operation::Insert,
        Operation::Update,
        Operation::Delete,
        Operation::Statement,
        Operation::AffectingStatement,
        Operation::Unprepared,
        Operation::GetDatabaseName,
    ];

    /// Name used in the `method` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SelectOne => "selectOne",
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Statement => "statement",
            Operation::AffectingStatement => "affectingStatement",
            Operation::Unprepared => "unprepared",
            Operation::GetDatabaseName => "getDatabaseName",
        }
    }

    /// Look up an operation by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Request sent by the client, one per call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Operation name, kept as a string so unknown names can be reported
    #[serde(default)]
    pub method: String,
    /// Positional operation arguments
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Error reported inside a response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub name: String,
    pub message: String,
}

/// Response returned by the server, one per request
///
/// `lastInsertId` is `null` when the call produced no new id and `false`
/// when the request failed before or during execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "WireResponse")]
pub struct Response {
    pub data: Option<Value>,
    pub error: Option<ErrorEnvelope>,
    #[serde(rename = "lastInsertId")]
    pub last_insert_id: Option<InsertId>,
}

impl Response {
    /// Successful response carrying `data` and the insert id it produced
    pub fn success(data: Value, last_insert_id: Option<InsertId>) -> Self {
        Self {
            data: Some(data),
            error: None,
            last_insert_id,
        }
    }

    /// Failed response carrying the error envelope of `err`
    pub fn failure(err: &DbError) -> Self {
        Self {
            data: None,
            error: Some(err.to_envelope()),
            last_insert_id: Some(InsertId::Unavailable),
        }
    }

    /// Response for a request whose bearer token did not match
    pub fn unauthorized() -> Self {
        Self::failure(&DbError::Unauthorized)
    }

    /// Split into the data payload or the remote error
    pub fn into_result(self) -> DbResult<Value> {
        match self.error {
            Some(envelope) => Err(envelope.into()),
            None => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}

/// Response as read off the wire, before shape checks
#[derive(Deserialize)]
struct WireResponse {
    #[serde(default, deserialize_with = "present")]
    data: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    error: Option<Option<ErrorEnvelope>>,
    #[serde(rename = "lastInsertId", deserialize_with = "nullable")]
    last_insert_id: Option<InsertId>,
}

impl TryFrom<WireResponse> for Response {
    type Error = String;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        if wire.data.is_none() && wire.error.is_none() {
            return Err("response has neither `data` nor `error`".to_string());
        }
        Ok(Self {
            data: wire.data.filter(|data| !data.is_null()),
            error: wire.error.flatten(),
            last_insert_id: wire.last_insert_id,
        })
    }
}

/// Keep a present key, even when its value is null
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Required key that may be null
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

// ============================================================================
// Last insert id
// ============================================================================

/// Auto-increment id as reported by a connection
///
/// Serialized as `false` when the connection has nothing to report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InsertId {
    #[default]
    Unavailable,
    Int(i64),
    Text(String),
}

impl std::fmt::Display for InsertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertId::Unavailable => f.write_str("false"),
            InsertId::Int(id) => write!(f, "{}", id),
            InsertId::Text(text) => f.write_str(text),
        }
    }
}

impl Serialize for InsertId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InsertId::Unavailable => serializer.serialize_bool(false),
            InsertId::Int(id) => serializer.serialize_i64(*id),
            InsertId::Text(text) => serializer.serialize_str(text),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInsertId {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for InsertId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawInsertId::deserialize(deserializer)? {
            RawInsertId::Bool(false) => Ok(InsertId::Unavailable),
            RawInsertId::Bool(true) => Err(serde::de::Error::custom(
                "lastInsertId must be false, an integer or a string",
            )),
            RawInsertId::Int(id) => Ok(InsertId::Int(id)),
            RawInsertId::Text(text) => Ok(InsertId::Text(text)),
        }
    }
}

// ============================================================================
// Calls
// ============================================================================

/// A fully decoded operation with its arguments
///
/// This is the single place that fixes the positional argument order, so
/// both the client encoder and the server decoder go through it.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SelectOne {
        query: String,
        bindings: Vec<Value>,
        use_read_pdo: bool,
    },
    Select {
        query: String,
        bindings: Vec<Value>,
        use_read_pdo: bool,
    },
    Insert { query: String, bindings: Vec<Value> },
    Update { query: String, bindings: Vec<Value> },
    Delete { query: String, bindings: Vec<Value> },
    Statement { query: String, bindings: Vec<Value> },
    AffectingStatement { query: String, bindings: Vec<Value> },
    Unprepared { query: String },
    GetDatabaseName,
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::SelectOne { .. } => Operation::SelectOne,
            Call::Select { .. } => Operation::Select,
            Call::Insert { .. } => Operation::Insert,
            Call::Update { .. } => Operation::Update,
            Call::Delete { .. } => Operation::Delete,
            Call::Statement { .. } => Operation::Statement,
            Call::AffectingStatement { .. } => Operation::AffectingStatement,
            Call::Unprepared { .. } => Operation::Unprepared,
            Call::GetDatabaseName => Operation::GetDatabaseName,
        }
    }

    /// Encode as a wire request
    pub fn into_request(self) -> Request {
        let method = self.operation().as_str().to_string();
        let params = match self {
            Call::SelectOne {
                query,
                bindings,
                use_read_pdo,
            }
            | Call::Select {
                query,
                bindings,
                use_read_pdo,
            } => vec![
                Value::String(query),
                Value::Array(bindings),
                Value::Bool(use_read_pdo),
            ],
            Call::Insert { query, bindings }
            | Call::Update { query, bindings }
            | Call::Delete { query, bindings }
            | Call::Statement { query, bindings }
            | Call::AffectingStatement { query, bindings } => {
                vec![Value::String(query), Value::Array(bindings)]
            }
            Call::Unprepared { query } => vec![Value::String(query)],
            Call::GetDatabaseName => Vec::new(),
        };
        Request { method, params }
    }

    /// Decode a wire request, rejecting unknown methods and bad params
    pub fn from_request(request: Request) -> DbResult<Self> {
        let operation = Operation::from_name(&request.method)
            .ok_or_else(|| DbError::UnknownOperation(request.method.clone()))?;
        Self::decode(operation, request.params)
    }

    /// Decode positional params for a known operation
    pub fn decode(operation: Operation, params: Vec<Value>) -> DbResult<Self> {
        let mut args = Params::new(operation, params);
        let call = match operation {
            Operation::SelectOne => Call::SelectOne {
                query: args.query()?,
                bindings: args.bindings()?,
                use_read_pdo: args.flag(true)?,
            },
            Operation::Select => Call::Select {
                query: args.query()?,
                bindings: args.bindings()?,
                use_read_pdo: args.flag(true)?,
            },
            Operation::Insert => Call::Insert {
                query: args.query()?,
                bindings: args.bindings()?,
            },
            Operation::Update => Call::Update {
                query: args.query()?,
                bindings: args.bindings()?,
            },
            Operation::Delete => Call::Delete {
                query: args.query()?,
                bindings: args.bindings()?,
            },
            Operation::Statement => Call::Statement {
                query: args.query()?,
                bindings: args.bindings()?,
            },
            Operation::AffectingStatement => Call::AffectingStatement {
                query: args.query()?,
                bindings: args.bindings()?,
            },
            Operation::Unprepared => Call::Unprepared {
                query: args.query()?,
            },
            Operation::GetDatabaseName => Call::GetDatabaseName,
        };
        args.finish()?;
        Ok(call)
    }
}

/// Cursor over positional params
struct Params {
    operation: Operation,
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Params {
    fn new(operation: Operation, params: Vec<Value>) -> Self {
        Self {
            operation,
            values: params.into_iter(),
            position: 0,
        }
    }

    fn next(&mut self) -> Option<Value> {
        self.position += 1;
        self.values.next()
    }

    fn invalid(&self, expected: &str) -> DbError {
        DbError::InvalidParams(format!(
            "{}: param {} must be {}",
            self.operation, self.position, expected
        ))
    }

    fn query(&mut self) -> DbResult<String> {
        match self.next() {
            Some(Value::String(query)) => Ok(query),
            _ => Err(self.invalid("a query string")),
        }
    }

    fn bindings(&mut self) -> DbResult<Vec<Value>> {
        match self.next() {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(bindings)) => Ok(bindings),
            Some(_) => Err(self.invalid("an array of bindings")),
        }
    }

    fn flag(&mut self, default: bool) -> DbResult<bool> {
        match self.next() {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(flag)) => Ok(flag),
            Some(_) => Err(self.invalid("a boolean")),
        }
    }

    fn finish(self) -> DbResult<()> {
        let extra = self.values.len();
        if extra > 0 {
            return Err(DbError::InvalidParams(format!(
                "{}: {} unexpected trailing param(s)",
                self.operation, extra
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_names() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.as_str()), Some(op));
            let json = serde_json::to_value(op).unwrap();
            assert_eq!(json, json!(op.as_str()));
        }
        assert_eq!(Operation::from_name("beginTransaction"), None);
        assert_eq!(Operation::from_name("SELECT"), None);
    }

    #[test]
    fn test_unauthorized_response_shape() {
        let value = serde_json::to_value(Response::unauthorized()).unwrap();
        assert_eq!(
            value,
            json!({
                "data": null,
                "error": {"name": "AuthorizationException", "message": "Bad authorization token"},
                "lastInsertId": false,
            })
        );
    }

    #[test]
    fn test_success_response_shape() {
        let response = Response::success(json!(true), Some(InsertId::Int(42)));
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value, json!({"data": true, "error": null, "lastInsertId": 42}));

        let value = serde_json::to_value(Response::success(json!([]), None)).unwrap();
        assert_eq!(value, json!({"data": [], "error": null, "lastInsertId": null}));
    }

    #[test]
    fn test_response_requires_protocol_keys() {
        let parse = |s: &str| serde_json::from_str::<Response>(s);

        let response = parse(r#"{"data": [1, 2], "lastInsertId": null}"#).unwrap();
        assert_eq!(response.data, Some(json!([1, 2])));
        assert!(response.error.is_none());
        assert!(response.last_insert_id.is_none());

        let response = parse(r#"{"data": null, "error": null, "lastInsertId": false}"#).unwrap();
        assert!(response.data.is_none());
        assert_eq!(response.last_insert_id, Some(InsertId::Unavailable));

        assert!(parse("{}").is_err());
        assert!(parse(r#"{"message": "Server Error"}"#).is_err());
        assert!(parse(r#"{"message": "Server Error", "lastInsertId": null}"#).is_err());
        assert!(parse(r#"{"data": 1}"#).is_err());
    }

    #[test]
    fn test_insert_id_wire_forms() {
        let parse = |s: &str| serde_json::from_str::<Option<InsertId>>(s).unwrap();
        assert_eq!(parse("false"), Some(InsertId::Unavailable));
        assert_eq!(parse("null"), None);
        assert_eq!(parse("7"), Some(InsertId::Int(7)));
        assert_eq!(parse("\"7\""), Some(InsertId::Text("7".to_string())));
        assert!(serde_json::from_str::<InsertId>("true").is_err());
    }

    #[test]
    fn test_into_result_prefers_error() {
        let response = Response {
            data: Some(json!(1)),
            error: Some(ErrorEnvelope {
                name: "QueryException".to_string(),
                message: "boom".to_string(),
            }),
            last_insert_id: None,
        };
        assert!(matches!(response.into_result(), Err(DbError::Remote { .. })));

        let empty = Response::default();
        assert_eq!(empty.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_call_encodes_positional_params() {
        let request = Call::Select {
            query: "select * from users where id = ?".to_string(),
            bindings: vec![json!(1)],
            use_read_pdo: true,
        }
        .into_request();
        assert_eq!(request.method, "select");
        assert_eq!(
            request.params,
            vec![json!("select * from users where id = ?"), json!([1]), json!(true)]
        );

        let request = Call::GetDatabaseName.into_request();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"method": "getDatabaseName", "params": []})
        );
    }

    #[test]
    fn test_decode_defaults_optional_params() {
        let call = Call::decode(Operation::SelectOne, vec![json!("select 1")]).unwrap();
        assert_eq!(
            call,
            Call::SelectOne {
                query: "select 1".to_string(),
                bindings: vec![],
                use_read_pdo: true,
            }
        );
    }

    #[test]
    fn test_decode_rejects_bad_params() {
        let err = Call::decode(Operation::Insert, vec![json!(5)]).unwrap_err();
        assert!(matches!(err, DbError::InvalidParams(_)));

        let params = vec![json!("update t"), json!("nope")];
        let err = Call::decode(Operation::Update, params).unwrap_err();
        assert!(err.to_string().contains("param 2"));

        let err = Call::decode(Operation::GetDatabaseName, vec![json!("extra")]).unwrap_err();
        assert!(matches!(err, DbError::InvalidParams(_)));
    }

    #[test]
    fn test_from_request_unknown_method() {
        let request = Request {
            method: "dropDatabase".to_string(),
            params: vec![],
        };
        let err = Call::from_request(request).unwrap_err();
        assert!(matches!(err, DbError::UnknownOperation(name) if name == "dropDatabase"));
    }

    #[test]
    fn test_request_defaults() {
        let request: Request = serde_json::from_str("{}").unwrap();
        assert_eq!(request.method, "");
        assert!(request.params.is_empty());
    }
}
