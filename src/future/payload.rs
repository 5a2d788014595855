use std::collections::BTreeMap;

/// Result data stored in a future slot.
///
/// The set of shapes is closed: every result type maps onto one of these variants
/// through [`FutureResult`]. Struct results use [`Payload::Record`].
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Void,
    Bool(bool),
    Int64(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Record(BTreeMap<String, Payload>),
}

/// Shape tag recorded for a slot at allocation time.
///
/// Records carry the name of the struct they encode so two unrelated struct
/// results can never be read as one another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    Void,
    Bool,
    Int64,
    Double,
    Text,
    Bytes,
    Record(&'static str),
}

impl Payload {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Payload::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Payload::Int64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Payload::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Bytes(value) => Some(value),
            _ => None,
        }
    }

    /// Looks up a field of a record payload.
    pub fn field(&self, name: &str) -> Option<&Payload> {
        match self {
            Payload::Record(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Builds a record payload from `(name, value)` pairs.
    pub fn record<I, K>(fields: I) -> Payload
    where
        I: IntoIterator<Item = (K, Payload)>,
        K: Into<String>,
    {
        Payload::Record(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }
}

/// A type that can be the result of a `Future<T>`.
pub trait FutureResult: Sized + Send + 'static {
    fn kind() -> PayloadKind;

    fn into_payload(self) -> Payload;

    /// Rebuilds the value, or `None` when the payload has another shape.
    fn from_payload(payload: &Payload) -> Option<Self>;
}

impl FutureResult for () {
    fn kind() -> PayloadKind {
        PayloadKind::Void
    }

    fn into_payload(self) -> Payload {
        Payload::Void
    }

    fn from_payload(payload: &Payload) -> Option<Self> {
        matches!(payload, Payload::Void).then_some(())
    }
}

impl FutureResult for bool {
    fn kind() -> PayloadKind {
        PayloadKind::Bool
    }

    fn into_payload(self) -> Payload {
        Payload::Bool(self)
    }

    fn from_payload(payload: &Payload) -> Option<Self> {
        payload.as_bool()
    }
}

impl FutureResult for i64 {
    fn kind() -> PayloadKind {
        PayloadKind::Int64
    }

    fn into_payload(self) -> Payload {
        Payload::Int64(self)
    }

    fn from_payload(payload: &Payload) -> Option<Self> {
        payload.as_i64()
    }
}

impl FutureResult for f64 {
    fn kind() -> PayloadKind {
        PayloadKind::Double
    }

    fn into_payload(self) -> Payload {
        Payload::Double(self)
    }

    fn from_payload(payload: &Payload) -> Option<Self> {
        payload.as_f64()
    }
}

impl FutureResult for String {
    fn kind() -> PayloadKind {
        PayloadKind::Text
    }

    fn into_payload(self) -> Payload {
        Payload::Text(self)
    }

    fn from_payload(payload: &Payload) -> Option<Self> {
        payload.as_str().map(str::to_owned)
    }
}

impl FutureResult for Vec<u8> {
    fn kind() -> PayloadKind {
        PayloadKind::Bytes
    }

    fn into_payload(self) -> Payload {
        Payload::Bytes(self)
    }

    fn from_payload(payload: &Payload) -> Option<Self> {
        payload.as_bytes().map(<[u8]>::to_vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_payloads_reject_other_shapes() {
        assert_eq!(i64::from_payload(&Payload::Int64(3)), Some(3));
        assert_eq!(i64::from_payload(&Payload::Text("3".into())), None);
        assert_eq!(String::from_payload(&Payload::Bool(true)), None);
        assert_eq!(<()>::from_payload(&Payload::Void), Some(()));
    }

    #[test]
    fn record_fields_are_addressable() {
        let payload = Payload::record([
            ("code", Payload::Int64(0)),
            ("message", Payload::Text("ok".into())),
        ]);
        assert_eq!(payload.field("code").and_then(Payload::as_i64), Some(0));
        assert_eq!(payload.field("message").and_then(Payload::as_str), Some("ok"));
        assert!(payload.field("missing").is_none());
    }
}
