use speculate2::speculate;

speculate! {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use pmboard::api::validate::*;
    use pmboard::api::{ApiError, Envelope};
    use pmboard::models::*;
    use serde_json::json;

    describe "text fields" {
        it "trims and accepts text within the limit" {
            assert_eq!(required_text("name", "  Website ", NAME_MAX).unwrap(), "Website");
        }

        it "rejects text over the limit with the field name" {
            let long = "x".repeat(NAME_MAX + 1);
            match required_text("name", &long, NAME_MAX) {
                Err(ApiError::Validation { field, .. }) => assert_eq!(field, Some("name")),
                other => panic!("expected validation error, got {:?}", other),
            }
        }

        it "clears a nullable field with an empty string" {
            assert_eq!(patch_text(Some(Some("  ".into()))), Some(None));
            assert_eq!(patch_text(None), None);
        }
    }

    describe "urls" {
        it "only accepts http and https" {
            assert!(optional_url("pr_url", Some("ftp://example.com/x".into())).is_err());
            assert_eq!(
                optional_url("pr_url", Some("http://example.com/pr/1".into())).unwrap(),
                Some("http://example.com/pr/1".to_string())
            );
        }

        it "treats an explicit empty patch as clearing" {
            assert_eq!(patch_url("branch_url", Some(Some(String::new()))).unwrap(), Some(None));
        }
    }

    describe "enums" {
        it "keeps board routes strict" {
            assert!(enum_value("status", "in progress", FeatureStatus::from_str).is_err());
            assert_eq!(
                enum_value("status", "IN_PROGRESS", FeatureStatus::from_str).unwrap(),
                FeatureStatus::InProgress
            );
        }

        it "relaxes agent input" {
            assert_eq!(
                enum_value("status", "In-Review", FeatureStatus::parse_lenient).unwrap(),
                FeatureStatus::InReview
            );
            assert_eq!(
                enum_value("status", "done", SubtaskStatus::parse_lenient).unwrap(),
                SubtaskStatus::Done
            );
            assert!(optional_enum("priority", Some("critical"), Priority::parse_lenient).is_err());
        }
    }

    describe "responses" {
        it "wraps lists with a count" {
            let body = serde_json::to_value(&Envelope::list(vec![1, 2, 3]).0).unwrap();
            assert_eq!(body, json!({ "ok": true, "data": [1, 2, 3], "count": 3 }));
        }

        it "omits the count for single values" {
            let body = serde_json::to_value(&Envelope::data("x").0).unwrap();
            assert_eq!(body, json!({ "ok": true, "data": "x" }));
        }

        it "maps errors to status codes" {
            assert_eq!(ApiError::NotFound("feature").into_response().status(), StatusCode::NOT_FOUND);
            assert_eq!(
                ApiError::invalid("title", "title is required").into_response().status(),
                StatusCode::BAD_REQUEST
            );
            assert_eq!(
                ApiError::Internal(anyhow::anyhow!("disk full")).into_response().status(),
                StatusCode::INTERNAL_SERVER_ERROR
            );
        }
    }
}
