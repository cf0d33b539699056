use serde::{Deserialize, Serialize};

/// Well-known event tags produced by the machine itself or its stock
/// producers. Guests are free to queue events under any other tag.
pub mod tags {
    pub const TIMER: &str = "timer";
    pub const ALARM: &str = "alarm";
    pub const PASTE: &str = "paste";
    pub const TERMINATE: &str = "terminate";
    pub const HTTP_CHECK: &str = "http_check";
    pub const HTTP_SUCCESS: &str = "http_success";
    pub const HTTP_FAILURE: &str = "http_failure";
    pub const PERIPHERAL: &str = "peripheral";
    pub const PERIPHERAL_DETACH: &str = "peripheral_detach";
}

/// A single payload element. Plain owned data: the producer builds it, the
/// queue owns it until dequeue, the guest owns it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// One queued occurrence. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub tag: String,
    pub payload: Vec<Value>,
}

impl Event {
    pub fn new(tag: impl Into<String>, payload: Vec<Value>) -> Self {
        Self {
            tag: tag.into(),
            payload,
        }
    }

    pub fn tagged(tag: impl Into<String>) -> Self {
        Self::new(tag, Vec::new())
    }
}
