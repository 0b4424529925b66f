use serde::Serialize;
use serde_json::Value;

/// Response envelope carried in the body of every data endpoint.
///
/// `status_code` mirrors the outcome of the lookup itself and may differ
/// from the HTTP status of the response carrying it.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub status_code: u16,
    pub message: String,
    pub data: Value,
    pub errors: Value,
}

impl ApiResponse {
    pub fn new(status_code: u16, message: impl Into<String>, data: Value) -> Self {
        Self {
            status_code,
            message: message.into(),
            data,
            errors: serde_json::json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_serializes_all_four_keys() {
        let response = ApiResponse::new(200, "Fetched chat history", json!([]));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["status_code"], 200);
        assert_eq!(value["message"], "Fetched chat history");
        assert_eq!(value["data"], json!([]));
        assert_eq!(value["errors"], json!({}));
    }

    #[test]
    fn test_envelope_status_code_is_independent_of_payload() {
        let response = ApiResponse::new(404, "No records found", json!({}));
        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["status_code"], 404);
        assert_eq!(value["data"], json!({}));
    }
}
