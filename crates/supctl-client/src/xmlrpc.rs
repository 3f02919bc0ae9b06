//! XML-RPC wire codec.
//!
//! Encodes method calls and decodes typed replies for the daemon's `/RPC2`
//! endpoint. Replies whose shape is uniform are parsed into a dynamic
//! [`Value`] tree and extracted via [`FromValue`]; replies that need
//! positional interpretation go through [`crate::stream`] instead.
//!
//! The response/fault encoders exist for the daemon side of the protocol and
//! are used by the mock daemon in `supctl-test-utils`.

use std::io::BufRead;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Codec-level failures. Converted into
/// [`ClientError`](crate::error::ClientError) at the client boundary.
#[derive(Debug, thiserror::Error)]
pub enum XmlRpcError {
    #[error("malformed XML: {0}")]
    Malformed(#[from] quick_xml::Error),

    #[error("truncated reply document: {0}")]
    Truncated(&'static str),

    #[error("unexpected reply shape: {0}")]
    Shape(String),

    /// The daemon answered with an explicit `<fault>` element.
    #[error("server fault {code}: {message}")]
    Fault { code: i64, message: String },
}

/// A dynamically-typed XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

// ── Encoding ────────────────────────────────────────────────────────────

/// Encode a method call document.
///
/// A call with no arguments still carries a well-formed empty `<params>`
/// block; the daemon rejects calls where it is missing entirely.
pub fn encode_call(method: &str, params: &[Value]) -> Vec<u8> {
    let mut out = String::with_capacity(128);
    out.push_str(r#"<?xml version="1.0"?>"#);
    out.push_str("<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out.into_bytes()
}

/// Encode a successful method response carrying one value.
pub fn encode_response(result: &Value) -> Vec<u8> {
    let mut out = String::with_capacity(128);
    out.push_str(r#"<?xml version="1.0"?>"#);
    out.push_str("<methodResponse><params><param>");
    write_value(&mut out, result);
    out.push_str("</param></params></methodResponse>");
    out.into_bytes()
}

/// Encode a fault response.
pub fn encode_fault(code: i64, message: &str) -> Vec<u8> {
    let fault = Value::Struct(vec![
        ("faultCode".to_string(), Value::Int(code)),
        ("faultString".to_string(), Value::String(message.to_string())),
    ]);
    let mut out = String::with_capacity(128);
    out.push_str(r#"<?xml version="1.0"?>"#);
    out.push_str("<methodResponse><fault>");
    write_value(&mut out, &fault);
    out.push_str("</fault></methodResponse>");
    out.into_bytes()
}

fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => {
            out.push_str("<int>");
            out.push_str(&i.to_string());
            out.push_str("</int>");
        }
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push_str(if *b { "1" } else { "0" });
            out.push_str("</boolean>");
        }
        Value::Double(d) => {
            out.push_str("<double>");
            out.push_str(&d.to_string());
            out.push_str("</double>");
        }
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name));
                out.push_str("</name>");
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

// ── Event plumbing ──────────────────────────────────────────────────────

/// One structural step of a document, with all borrows resolved so callers
/// can keep reading while holding it.
pub(crate) enum XmlNode {
    Open(String),
    Close(String),
    Empty(String),
    Text(String),
    Eof,
    Other,
}

pub(crate) fn next_node<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
) -> Result<XmlNode, XmlRpcError> {
    buf.clear();
    let node = match reader.read_event_into(buf)? {
        Event::Start(e) => XmlNode::Open(String::from_utf8_lossy(e.name().as_ref()).into_owned()),
        Event::End(e) => XmlNode::Close(String::from_utf8_lossy(e.name().as_ref()).into_owned()),
        Event::Empty(e) => XmlNode::Empty(String::from_utf8_lossy(e.name().as_ref()).into_owned()),
        Event::Text(t) => {
            let text = t.unescape().map_err(quick_xml::Error::from)?;
            XmlNode::Text(text.into_owned())
        }
        Event::CData(c) => XmlNode::Text(String::from_utf8_lossy(&c.into_inner()).into_owned()),
        Event::Eof => XmlNode::Eof,
        _ => XmlNode::Other,
    };
    Ok(node)
}

// ── Decoding ────────────────────────────────────────────────────────────

/// Decode a method response into its single [`Value`].
///
/// A `<fault>` reply becomes [`XmlRpcError::Fault`].
pub fn decode_reply(bytes: &[u8]) -> Result<Value, XmlRpcError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut in_fault = false;
    loop {
        match next_node(&mut reader, &mut buf)? {
            XmlNode::Open(name) => match name.as_str() {
                "methodResponse" | "params" | "param" => {}
                "fault" => in_fault = true,
                "value" => {
                    let value = read_value(&mut reader, &mut buf)?;
                    if in_fault {
                        return Err(fault_from_value(value));
                    }
                    return Ok(value);
                }
                other => {
                    return Err(XmlRpcError::Shape(format!("unexpected element <{other}>")));
                }
            },
            XmlNode::Eof => return Err(XmlRpcError::Truncated("reply ended before any value")),
            _ => {}
        }
    }
}

fn fault_from_value(value: Value) -> XmlRpcError {
    let mut code = 0;
    let mut message = String::new();
    if let Value::Struct(members) = value {
        for (name, member) in members {
            match (name.as_str(), member) {
                ("faultCode", Value::Int(c)) => code = c,
                ("faultString", Value::String(s)) => message = s,
                _ => {}
            }
        }
    }
    XmlRpcError::Fault { code, message }
}

/// Read one `<value>` whose opening tag has already been consumed.
fn read_value<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Value, XmlRpcError> {
    let mut text = String::new();
    let mut typed: Option<Value> = None;
    loop {
        match next_node(reader, buf)? {
            XmlNode::Open(name) => match name.as_str() {
                "array" => typed = Some(read_array(reader, buf)?),
                "struct" => typed = Some(read_struct(reader, buf)?),
                "string" => typed = Some(Value::String(read_scalar_text(reader, buf, "string")?)),
                "int" | "i4" | "i8" => {
                    let raw = read_scalar_text(reader, buf, &name)?;
                    let parsed = raw.trim().parse().map_err(|_| {
                        XmlRpcError::Shape(format!("invalid integer `{}`", raw.trim()))
                    })?;
                    typed = Some(Value::Int(parsed));
                }
                "boolean" => {
                    let raw = read_scalar_text(reader, buf, "boolean")?;
                    typed = Some(Value::Bool(raw.trim() == "1"));
                }
                "double" => {
                    let raw = read_scalar_text(reader, buf, "double")?;
                    let parsed = raw.trim().parse().map_err(|_| {
                        XmlRpcError::Shape(format!("invalid double `{}`", raw.trim()))
                    })?;
                    typed = Some(Value::Double(parsed));
                }
                other => {
                    return Err(XmlRpcError::Shape(format!("unsupported value type <{other}>")));
                }
            },
            XmlNode::Empty(name) => match name.as_str() {
                "string" | "nil" => typed = Some(Value::String(String::new())),
                "array" => typed = Some(Value::Array(Vec::new())),
                "struct" => typed = Some(Value::Struct(Vec::new())),
                other => {
                    return Err(XmlRpcError::Shape(format!("unsupported value type <{other}/>")));
                }
            },
            XmlNode::Text(t) => text.push_str(&t),
            // An untagged <value>text</value> defaults to string.
            XmlNode::Close(name) if name == "value" => {
                return Ok(typed.unwrap_or_else(|| Value::String(text.trim().to_string())));
            }
            XmlNode::Close(_) | XmlNode::Other => {}
            XmlNode::Eof => return Err(XmlRpcError::Truncated("value not closed")),
        }
    }
}

fn read_array<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Value, XmlRpcError> {
    let mut items = Vec::new();
    loop {
        match next_node(reader, buf)? {
            XmlNode::Open(name) => match name.as_str() {
                "data" => {}
                "value" => items.push(read_value(reader, buf)?),
                other => {
                    return Err(XmlRpcError::Shape(format!("unexpected <{other}> in array")));
                }
            },
            XmlNode::Empty(name) => match name.as_str() {
                "data" => {}
                "value" => items.push(Value::String(String::new())),
                other => {
                    return Err(XmlRpcError::Shape(format!("unexpected <{other}/> in array")));
                }
            },
            XmlNode::Close(name) if name == "array" => return Ok(Value::Array(items)),
            XmlNode::Close(_) | XmlNode::Text(_) | XmlNode::Other => {}
            XmlNode::Eof => return Err(XmlRpcError::Truncated("array not closed")),
        }
    }
}

fn read_struct<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> Result<Value, XmlRpcError> {
    let mut members = Vec::new();
    let mut pending_name: Option<String> = None;
    loop {
        match next_node(reader, buf)? {
            XmlNode::Open(name) => match name.as_str() {
                "member" => pending_name = None,
                "name" => pending_name = Some(read_scalar_text(reader, buf, "name")?),
                "value" => {
                    let value = read_value(reader, buf)?;
                    members.push((pending_name.take().unwrap_or_default(), value));
                }
                other => {
                    return Err(XmlRpcError::Shape(format!("unexpected <{other}> in struct")));
                }
            },
            XmlNode::Empty(name) if name == "value" => {
                members.push((pending_name.take().unwrap_or_default(), Value::String(String::new())));
            }
            XmlNode::Close(name) if name == "struct" => return Ok(Value::Struct(members)),
            XmlNode::Empty(_) | XmlNode::Close(_) | XmlNode::Text(_) | XmlNode::Other => {}
            XmlNode::Eof => return Err(XmlRpcError::Truncated("struct not closed")),
        }
    }
}

/// Read the text content of a scalar element up to its closing tag.
fn read_scalar_text<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    tag: &str,
) -> Result<String, XmlRpcError> {
    let mut text = String::new();
    loop {
        match next_node(reader, buf)? {
            XmlNode::Text(t) => text.push_str(&t),
            XmlNode::Close(name) if name == tag => return Ok(text),
            XmlNode::Other => {}
            XmlNode::Eof => return Err(XmlRpcError::Truncated("scalar not closed")),
            _ => {
                return Err(XmlRpcError::Shape(format!("unexpected content inside <{tag}>")));
            }
        }
    }
}

// ── Typed extraction ────────────────────────────────────────────────────

/// Extraction of a statically-typed reply from a decoded [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, XmlRpcError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(XmlRpcError::Shape(format!("expected string, got {other:?}"))),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(XmlRpcError::Shape(format!("expected boolean, got {other:?}"))),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(XmlRpcError::Shape(format!("expected integer, got {other:?}"))),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        match value {
            Value::Double(d) => Ok(d),
            Value::Int(i) => Ok(i as f64),
            other => Err(XmlRpcError::Shape(format!("expected double, got {other:?}"))),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, XmlRpcError> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(XmlRpcError::Shape(format!("expected array, got {other:?}"))),
        }
    }
}
