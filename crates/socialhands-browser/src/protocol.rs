//! CDP wire messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// CDP request message.
#[derive(Debug, Serialize)]
pub struct CdpRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// CDP response or event message.
#[derive(Debug, Deserialize)]
pub struct CdpResponse {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<CdpErrorResponse>,
    pub method: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// CDP error in response.
#[derive(Debug, Deserialize)]
pub struct CdpErrorResponse {
    pub code: i64,
    pub message: String,
}

/// Page info from the `/json` endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub page_type: String,
    pub title: String,
    pub url: String,
}

/// Browser version info.
///
/// Chrome returns PascalCase field names for this endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser")]
    pub browser: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_omits_empty_fields() {
        let request = CdpRequest {
            id: 7,
            method: "Page.enable".to_string(),
            params: None,
            session_id: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"id": 7, "method": "Page.enable"})
        );
    }

    #[test]
    fn test_request_with_session() {
        let request = CdpRequest {
            id: 1,
            method: "Runtime.evaluate".to_string(),
            params: Some(json!({"expression": "1"})),
            session_id: Some("S1".to_string()),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["sessionId"], "S1");
        assert_eq!(value["params"]["expression"], "1");
    }

    #[test]
    fn test_parse_error_response() {
        let resp: CdpResponse = serde_json::from_str(
            r#"{"id":3,"error":{"code":-32601,"message":"'Foo.bar' wasn't found"}}"#,
        )
        .unwrap();
        assert_eq!(resp.id, Some(3));
        assert_eq!(resp.error.unwrap().code, -32601);
    }

    #[test]
    fn test_parse_event() {
        let resp: CdpResponse = serde_json::from_str(
            r#"{"method":"Page.loadEventFired","params":{"timestamp":1.0},"sessionId":"S1"}"#,
        )
        .unwrap();
        assert!(resp.id.is_none());
        assert_eq!(resp.method.as_deref(), Some("Page.loadEventFired"));
    }

    #[test]
    fn test_parse_browser_version() {
        let version: BrowserVersion = serde_json::from_str(
            r#"{
                "Browser": "Chrome/120.0.6099.109",
                "Protocol-Version": "1.3",
                "User-Agent": "Mozilla/5.0",
                "webSocketDebuggerUrl": "ws://localhost:9222/devtools/browser/abc"
            }"#,
        )
        .unwrap();
        assert_eq!(version.browser, "Chrome/120.0.6099.109");
        assert!(version.web_socket_debugger_url.starts_with("ws://"));
    }

    #[test]
    fn test_parse_page_info() {
        let page: PageInfo = serde_json::from_str(
            r#"{"id":"T1","type":"page","title":"Home","url":"https://x.com/home","webSocketDebuggerUrl":"ws://x"}"#,
        )
        .unwrap();
        assert_eq!(page.id, "T1");
        assert_eq!(page.page_type, "page");
    }
}
