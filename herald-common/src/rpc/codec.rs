// XML-RPC-restricted-to-int/string codec.
//
// Grounded on `pyboard/xmlrpc.py`: a minimal XML-RPC subset restricted to
// `<int>`/`<string>` values, method names of the form
// `service_<id>.<member>`, and a blocking proxy correlated by
// `replies-to`.

use crate::errors::HeraldError;

/// An RPC value: either of the two primitive types the wire format
/// supports. Anything else is rejected as `UnsupportedType` before it
/// reaches the codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl Value {
    fn to_xml(&self) -> String {
        match self {
            Value::Int(n) => format!("<value><int>{n}</int></value>"),
            Value::Str(s) => format!("<value><string>{}</string></value>", escape(s)),
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&")
}

#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method_name: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct MethodResponse {
    pub params: Vec<Value>,
}

impl MethodCall {
    /// `service_<id>.<member>`, splitting on the first `.`.
    pub fn service_id(&self) -> Option<&str> {
        self.method_name.strip_prefix("service_").and_then(|rest| rest.split('.').next())
    }

    /// The member name, re-joined from everything after the first `.`.
    pub fn member(&self) -> Option<&str> {
        self.method_name.splitn(2, '.').nth(1)
    }

    pub fn encode(&self) -> String {
        let params: String = self.params.iter().map(|v| format!("<param>{}</param>", v.to_xml())).collect();
        format!(
            "<methodCall><methodName>{}</methodName><params>{params}</params></methodCall>",
            escape(&self.method_name)
        )
    }

    pub fn decode(xml: &str) -> Result<Self, HeraldError> {
        let method_name = extract_tag(xml, "methodName")
            .ok_or_else(|| HeraldError::MalformedFrame("missing methodName".to_string()))?;
        let params = decode_params(xml)?;
        Ok(Self {
            method_name: unescape(&method_name),
            params,
        })
    }
}

impl MethodResponse {
    pub fn encode(&self) -> String {
        let params: String = self.params.iter().map(|v| format!("<param>{}</param>", v.to_xml())).collect();
        format!("<methodResponse><params>{params}</params></methodResponse>")
    }

    pub fn decode(xml: &str) -> Result<Self, HeraldError> {
        Ok(Self {
            params: decode_params(xml)?,
        })
    }
}

fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].to_string())
}

fn decode_params(xml: &str) -> Result<Vec<Value>, HeraldError> {
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<value>") {
        let after = &rest[start + "<value>".len()..];
        let end = after
            .find("</value>")
            .ok_or_else(|| HeraldError::MalformedFrame("unterminated <value>".to_string()))?;
        let inner = &after[..end];
        values.push(decode_value(inner)?);
        rest = &after[end + "</value>".len()..];
    }
    Ok(values)
}

fn decode_value(inner: &str) -> Result<Value, HeraldError> {
    if let Some(n) = extract_tag(inner, "int") {
        return n
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| HeraldError::MalformedFrame(format!("invalid <int>: {n}")));
    }
    if let Some(s) = extract_tag(inner, "string") {
        return Ok(Value::Str(unescape(&s)));
    }
    Err(HeraldError::UnsupportedType(inner.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_call_roundtrips_through_xml() {
        let call = MethodCall {
            method_name: "service_7.on".to_string(),
            params: vec![Value::Int(1), Value::Str("go".to_string())],
        };
        let decoded = MethodCall::decode(&call.encode()).unwrap();
        assert_eq!(decoded.method_name, "service_7.on");
        assert_eq!(decoded.params, vec![Value::Int(1), Value::Str("go".to_string())]);
        assert_eq!(decoded.service_id(), Some("7"));
        assert_eq!(decoded.member(), Some("on"));
    }

    #[test]
    fn member_with_embedded_dot_is_rejoined() {
        let call = MethodCall {
            method_name: "service_1.sub.method".to_string(),
            params: vec![],
        };
        assert_eq!(call.service_id(), Some("1"));
        assert_eq!(call.member(), Some("sub.method"));
    }

    #[test]
    fn empty_params_methodresponse_roundtrips() {
        let response = MethodResponse { params: vec![] };
        let decoded = MethodResponse::decode(&response.encode()).unwrap();
        assert!(decoded.params.is_empty());
    }

    #[test]
    fn unsupported_value_type_is_rejected() {
        let xml = "<methodResponse><params><param><value><double>1.0</double></value></param></params></methodResponse>";
        let err = MethodResponse::decode(xml).unwrap_err();
        assert!(matches!(err, HeraldError::UnsupportedType(_)));
    }
}
