use actix_multipart::form::tempfile::TempFileConfig;
use actix_multipart::form::MultipartFormConfig;
use actix_web::HttpResponse;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: serde_json::Value,
}

fn bad_request(error: &str, fields: serde_json::Map<String, serde_json::Value>) -> actix_web::Error {
    let error_response = ErrorResponse {
        error: error.to_string(),
        fields: serde_json::Value::Object(fields),
    };
    actix_web::error::InternalError::from_response(
        "",
        HttpResponse::BadRequest().json(error_response)
    ).into()
}

/// Creates a configured JsonConfig with standardized error handling for the entire project
pub fn json_config() -> actix_web_validator::JsonConfig {
    actix_web_validator::JsonConfig::default()
        .error_handler(|err, _req| {
            let mut fields = serde_json::Map::new();

            match err {
                actix_web_validator::Error::Validate(validation_errors) => {
                    for (field, errors) in validation_errors.field_errors() {
                        let messages: Vec<String> = errors
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map(|m| m.to_string())
                                    .unwrap_or_else(|| format!("Validation error in field: {}", field))
                            })
                            .collect();
                        fields.insert(
                            field.to_string(),
                            serde_json::json!({"errors": messages})
                        );
                    }
                    bad_request("Validation failed", fields)
                }
                actix_web_validator::Error::Deserialize(de_err) => {
                    let message = body_error_message(&de_err.to_string()).unwrap_or("Invalid JSON format");
                    fields.insert("message".to_string(), serde_json::json!(message));
                    bad_request("Request validation failed", fields)
                }
                other => {
                    let detail = other.to_string();
                    let message = body_error_message(&detail).map(str::to_string).unwrap_or(detail);
                    fields.insert("message".to_string(), serde_json::json!(message));
                    bad_request("Request validation failed", fields)
                }
            }
        })
}

/// Client-facing wording for a JSON body that failed to deserialize
fn body_error_message(detail: &str) -> Option<&'static str> {
    if detail.contains("EOF while parsing") {
        Some("Request body is empty. Expected JSON payload")
    } else if detail.contains("invalid type") {
        Some("Invalid field type. Check the expected type of each field")
    } else if detail.contains("expected") || detail.contains("key must be a string") {
        Some("Invalid JSON format")
    } else {
        None
    }
}

/// Upload limits and error shape for every multipart endpoint
pub fn multipart_config(total_limit: usize) -> MultipartFormConfig {
    MultipartFormConfig::default()
        .total_limit(total_limit)
        .error_handler(|err, _req| {
            let mut fields = serde_json::Map::new();
            fields.insert("message".to_string(), serde_json::json!(err.to_string()));
            bad_request("Invalid upload", fields)
        })
}

/// Spool uploads inside the work directory so moving them into a workspace
/// stays on one filesystem.
pub fn tempfile_config(work_dir: &Path) -> TempFileConfig {
    TempFileConfig::default().directory(work_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use serde::Deserialize;
    use validator::Validate;

    #[derive(Deserialize, Validate)]
    struct Batch {
        #[validate(length(min = 1, message = "name must not be empty"))]
        name: String,
        #[allow(dead_code)]
        count: u32,
    }

    async fn accept(_body: actix_web_validator::Json<Batch>) -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    async fn post_json(payload: &'static str) -> (StatusCode, serde_json::Value) {
        let app = test::init_service(
            App::new()
                .app_data(json_config())
                .route("/batch", web::post().to(accept)),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/batch")
            .insert_header(("content-type", "application/json"))
            .set_payload(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status();
        (status, test::read_body_json(resp).await)
    }

    #[actix_web::test]
    async fn wrong_field_type_gets_generic_message() {
        let (status, body) = post_json(r#"{"name": "nightly", "count": "three"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Request validation failed");
        assert_eq!(
            body["fields"]["message"],
            "Invalid field type. Check the expected type of each field"
        );
    }

    #[actix_web::test]
    async fn field_rules_are_reported_per_field() {
        let (status, body) = post_json(r#"{"name": "", "count": 3}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["fields"]["name"]["errors"][0], "name must not be empty");
    }

    #[test]
    fn body_error_wording() {
        assert_eq!(
            body_error_message("EOF while parsing a value at line 1 column 0"),
            Some("Request body is empty. Expected JSON payload")
        );
        assert_eq!(
            body_error_message("invalid type: integer `5`, expected a string at line 1 column 9"),
            Some("Invalid field type. Check the expected type of each field")
        );
        assert_eq!(body_error_message("Content type error"), None);
    }
}
